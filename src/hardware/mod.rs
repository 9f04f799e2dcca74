//! Hardware capability traits and instrument drivers.
//!
//! Devices implement small, focused capability traits instead of one
//! monolithic instrument interface. The acquisition core only depends on the
//! [`capabilities::ScanInstrument`] contract; concrete drivers (the Keithley
//! 27xx SCPI driver, the mock scanner) live beside it and are selected at
//! connect time.

pub mod capabilities;
pub mod keithley;
pub mod mock;
pub mod scpi;

pub use capabilities::{ModuleLayout, ScanInstrument};
pub use keithley::KeithleyScanner;
pub use mock::MockScanner;
pub use scpi::{ScpiTransport, TcpScpiTransport};
