//! Atomic hardware capabilities.
//!
//! This module defines the capability contract a temperature scanner must
//! satisfy for the acquisition core. Drivers for different bus types or
//! device variants implement the same trait; no inheritance hierarchy is
//! needed, and the core never sees wire protocol details.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Takes `&self`; drivers use interior mutability for connection state so
//!   a single `Arc<dyn ScanInstrument>` can be shared between the acquisition
//!   loop and user-initiated actions.

use anyhow::Result;
use async_trait::async_trait;

use crate::core::{BANK_CHANNELS, MODULE_CHANNELS};

/// Installed-module layout of a connected scanner.
///
/// A scanner chassis carries up to two 40-channel plug-in modules. The layout
/// determines how many raw values one scan produces and where the block lands
/// within the selected channel bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleLayout {
    /// Both module slots populated: 80 readings per scan.
    DualModule,
    /// Only the first slot populated: 40 readings at the start of the bank.
    FirstOnly,
    /// Only the second slot populated: 40 readings in the upper half of the
    /// bank.
    SecondOnly,
}

impl ModuleLayout {
    /// Number of raw values one scan of this layout produces.
    pub fn active_channels(&self) -> usize {
        match self {
            ModuleLayout::DualModule => BANK_CHANNELS,
            ModuleLayout::FirstOnly | ModuleLayout::SecondOnly => MODULE_CHANNELS,
        }
    }

    /// Offset of the raw block within the selected bank.
    pub fn start_within_bank(&self) -> usize {
        match self {
            ModuleLayout::DualModule | ModuleLayout::FirstOnly => 0,
            ModuleLayout::SecondOnly => MODULE_CHANNELS,
        }
    }

    /// Map an installed-options response (`*OPT?`) to a layout.
    ///
    /// Returns `None` for option strings the driver does not recognize.
    pub fn from_option_string(options: &str) -> Option<Self> {
        match options.trim() {
            "7708,7708" => Some(ModuleLayout::DualModule),
            "7708,NONE" => Some(ModuleLayout::FirstOnly),
            "NONE,7708" => Some(ModuleLayout::SecondOnly),
            _ => None,
        }
    }
}

/// Capability: multichannel scan readout.
///
/// Devices that scan a set of measurement channels and return one value per
/// active channel (multichannel thermocouple scanners, switch/measure units).
///
/// # Contract
/// - `connect` establishes and verifies the session; it must be called before
///   any other method succeeds.
/// - `read_raw` performs one full scan and returns active channels only, in
///   channel order. `None` entries mark open or overflowed inputs. A failed
///   read must leave the driver in a state where the next read may be
///   attempted (transient failures are the caller's retry decision).
/// - A failed write/query that indicates connection loss marks the session
///   invalid; subsequent calls fail fast until `connect` succeeds again.
/// - `disconnect` is best-effort and idempotent.
#[async_trait]
pub trait ScanInstrument: Send + Sync {
    /// Establish the session and verify the device identity.
    async fn connect(&self) -> Result<()>;

    /// Perform one scan and return one reading per active channel.
    async fn read_raw(&self) -> Result<Vec<Option<f64>>>;

    /// Push the device-specific scan configuration (function, transducer,
    /// trigger and sample setup). Called once when a run starts.
    async fn configure_scan(&self) -> Result<()>;

    /// Tear down the session. Best-effort; never fails the caller.
    async fn disconnect(&self);

    /// Device identification string (`*IDN?` equivalent).
    async fn identify(&self) -> Result<String>;

    /// Installed-module layout, discovered during `connect`.
    async fn module_layout(&self) -> ModuleLayout;

    /// Whether the session is currently believed valid.
    async fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_geometry() {
        assert_eq!(ModuleLayout::DualModule.active_channels(), 80);
        assert_eq!(ModuleLayout::FirstOnly.active_channels(), 40);
        assert_eq!(ModuleLayout::SecondOnly.active_channels(), 40);
        assert_eq!(ModuleLayout::DualModule.start_within_bank(), 0);
        assert_eq!(ModuleLayout::FirstOnly.start_within_bank(), 0);
        assert_eq!(ModuleLayout::SecondOnly.start_within_bank(), 40);
    }

    #[test]
    fn layout_from_option_string() {
        assert_eq!(
            ModuleLayout::from_option_string("7708,7708"),
            Some(ModuleLayout::DualModule)
        );
        assert_eq!(
            ModuleLayout::from_option_string("7708,NONE"),
            Some(ModuleLayout::FirstOnly)
        );
        assert_eq!(
            ModuleLayout::from_option_string("NONE,7708"),
            Some(ModuleLayout::SecondOnly)
        );
        assert_eq!(ModuleLayout::from_option_string("NONE,NONE"), None);
    }
}
