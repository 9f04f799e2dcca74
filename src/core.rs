//! Core data types and traits for the scanner pipeline.

use crate::error::ScanError;
use crate::report::{PlotGroup, ReportMetadata, TableRow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Total channel capacity of the fixed channel layout.
///
/// Two 80-channel banks; which bank a connected instrument writes into is
/// selected at connect time.
pub const TOTAL_CHANNELS: usize = 160;

/// Channels per bank (one instrument fills at most one bank per connection).
pub const BANK_CHANNELS: usize = 80;

/// Channels per plug-in hardware module (two modules per bank).
pub const MODULE_CHANNELS: usize = 40;

/// A single timestamped reading across the full channel layout.
///
/// Produced once per acquisition tick. Slots outside the connected
/// instrument's placement window are `None`, as are open/overflowed
/// thermocouple inputs inside it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock read time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// One slot per channel, `TOTAL_CHANNELS` long. `None` marks missing.
    pub values: Vec<Option<f64>>,
}

impl Sample {
    /// Create a sample with every channel missing.
    pub fn empty(timestamp: f64) -> Self {
        Self {
            timestamp,
            values: vec![None; TOTAL_CHANNELS],
        }
    }
}

/// Per-channel user-editable configuration.
///
/// Lives for the app session and is edited live during a run. The threshold
/// is kept as entered text; it is interpreted when a report row is built, so
/// a half-typed value never aborts acquisition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Free-text measurement location label.
    pub location: String,
    /// Pass/fail threshold in degrees C, raw text. Empty means no limit.
    pub threshold: String,
}

/// Trait for the external PDF report renderer.
///
/// The core hands over fully assembled structured data; layout, styling and
/// typography are the renderer's concern.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Render the report document from metadata, pass/fail rows and plot
    /// groupings.
    async fn render_report(
        &mut self,
        metadata: &ReportMetadata,
        rows: &[TableRow],
        plots: &[PlotGroup],
    ) -> Result<(), ScanError>;
}

/// Trait for the companion spreadsheet writer.
#[async_trait]
pub trait SpreadsheetRenderer: Send + Sync {
    /// Write a header row followed by data rows.
    async fn render_spreadsheet(
        &mut self,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), ScanError>;
}

/// Wall-clock time as seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
