//! Custom error types for the application.
//!
//! This module defines the primary error type, `ScanError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures the scanner
//! pipeline can produce, from configuration and I/O issues to instrument
//! faults and rejected user input.
//!
//! ## Error Hierarchy
//!
//! `ScanError` consolidates the error sources the design distinguishes:
//!
//! - **`Config`**: wraps errors from the `figment` loader, typically file
//!   parsing or format issues in the configuration files.
//! - **`Configuration`**: semantic errors in the configuration, such as values
//!   that parse but are logically invalid (a zero queue capacity, an unknown
//!   log level). These are caught during the validation step.
//! - **`Io`**: wraps standard `std::io::Error`, covering file and socket I/O.
//! - **`Instrument`**: errors originating from instrument drivers, anything
//!   from a communication failure to a rejected SCPI command.
//! - **`InvalidInput`**: malformed user input (channel text, time ranges,
//!   ambient channel numbers) rejected at the boundary. These never reach the
//!   history store.
//! - **`NoData`**: a report was requested for a window/channel set with no
//!   recorded readings. This aborts report generation; nothing is written.
//!
//! By using `#[from]`, `ScanError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the application with
//! the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ScanError>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Configuration file could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by an instrument driver.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// An operation required a live instrument connection.
    #[error("Instrument is not connected")]
    NotConnected,

    /// User input rejected at the boundary.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Report precondition failure: nothing recorded for the request.
    #[error("No data found for the selected channels and time range")]
    NoData,

    /// A run is already active; stop it before starting another.
    #[error("An acquisition run is already active")]
    RunActive,

    /// The operation requires a run to have been started.
    #[error("No acquisition run has been started")]
    NoRun,

    /// Report rendering failed in an external renderer.
    #[error("Report rendering failed: {0}")]
    Render(String),

    /// Spreadsheet export failed.
    #[error("Spreadsheet export failed: {0}")]
    Export(String),

    /// Serializing or deserializing persisted state failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Functionality compiled out via cargo features.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<anyhow::Error> for ScanError {
    fn from(value: anyhow::Error) -> Self {
        ScanError::Instrument(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_driver_error_to_instrument_variant() {
        let err: ScanError = anyhow::anyhow!("scan list rejected").into();
        match err {
            ScanError::Instrument(msg) => assert_eq!(msg, "scan list rejected"),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn no_data_message_is_descriptive() {
        let msg = ScanError::NoData.to_string();
        assert!(msg.contains("channels"));
        assert!(msg.contains("time range"));
    }
}
