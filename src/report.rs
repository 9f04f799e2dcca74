//! Report assembly: plot groupings, pass/fail rows and spreadsheet layout.
//!
//! This module turns a window slice plus user-entered metadata into the
//! structured data the external renderers consume. It decides nothing about
//! visual layout; it only orders, formats and judges.

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{ChannelConfig, ReportRenderer, SpreadsheetRenderer};
use crate::data::slice::SliceResult;
use crate::error::{AppResult, ScanError};

/// User-entered report header fields plus run-derived values.
///
/// Everything is kept as display text; the assembler fills the run-derived
/// fields (times, ambient temperatures) and passes user fields through.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Test name.
    pub test_name: String,
    /// Test type.
    pub test_type: String,
    /// Sample number.
    pub sample_number: String,
    /// Model number.
    pub model_number: String,
    /// Lab request number.
    pub lab_request: String,
    /// Operator name.
    pub tester: String,
    /// Equipment identification.
    pub equipment: String,
    /// Wall-clock start of the reported window.
    pub start_time: String,
    /// Wall-clock end of the reported window.
    pub stop_time: String,
    /// Observed phenomena and result notes.
    pub phenomena: String,
    /// Free-form notes.
    pub notes: String,
    /// One-based ambient channel number, or "N/A".
    pub ambient_channel: String,
    /// Ambient temperature at run start, or "N/A".
    pub ambient_start_temp: String,
    /// Ambient temperature at run end, or "N/A".
    pub ambient_end_temp: String,
}

/// Pass/fail judgement of one channel against its threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassStatus {
    /// Maximum stayed at or below the threshold.
    Pass,
    /// Maximum exceeded the threshold.
    Fail,
    /// No usable threshold configured.
    NotApplicable,
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassStatus::Pass => write!(f, "P"),
            PassStatus::Fail => write!(f, "F"),
            PassStatus::NotApplicable => write!(f, "N/A"),
        }
    }
}

/// Judge a slice maximum against the configured threshold text.
///
/// An empty or unparseable threshold yields `NotApplicable` regardless of the
/// maximum; a fail requires strictly exceeding the threshold.
pub fn pass_status(threshold: &str, slice_max: f64) -> PassStatus {
    let threshold = threshold.trim();
    if threshold.is_empty() {
        return PassStatus::NotApplicable;
    }
    match threshold.parse::<f64>() {
        Ok(limit) if slice_max > limit => PassStatus::Fail,
        Ok(_) => PassStatus::Pass,
        Err(_) => PassStatus::NotApplicable,
    }
}

/// One row of the report's pass/fail table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableRow {
    /// Position in the table, starting at 1.
    pub seq: usize,
    /// Measurement location label from the channel configuration.
    pub location: String,
    /// One-based channel number.
    pub channel: usize,
    /// Maximum within the reported window, formatted to two decimals.
    pub max_temp: String,
    /// Threshold text as configured.
    pub threshold: String,
    /// Judgement against the threshold.
    pub status: PassStatus,
}

/// One plot grouping handed to the renderer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotGroup {
    /// Display title, e.g. `Channels: 1 to 8`.
    pub title: String,
    /// Zero-based channels plotted in this group.
    pub channels: Vec<usize>,
}

/// Fully assembled report data, ready for the renderers.
#[derive(Clone, Debug)]
pub struct ReportBundle {
    /// Header metadata.
    pub metadata: ReportMetadata,
    /// Ordered pass/fail table rows.
    pub rows: Vec<TableRow>,
    /// Plot groupings in render order.
    pub plots: Vec<PlotGroup>,
    /// Spreadsheet header row.
    pub sheet_headers: Vec<String>,
    /// Spreadsheet data rows.
    pub sheet_rows: Vec<Vec<String>>,
}

/// Partition channels into display groups.
///
/// `group_size` of `None` or `0` puts every channel in one group. Titles use
/// one-based channel numbers.
pub fn plot_groups(channels: &[usize], group_size: Option<usize>) -> Vec<PlotGroup> {
    if channels.is_empty() {
        return Vec::new();
    }
    let group_size = match group_size {
        Some(n) if n > 0 => n,
        _ => channels.len(),
    };

    channels
        .chunks(group_size)
        .map(|group| {
            let title = if group.len() == 1 {
                format!("Channel: {}", group[0] + 1)
            } else {
                format!("Channels: {} to {}", group[0] + 1, group[group.len() - 1] + 1)
            };
            PlotGroup {
                title,
                channels: group.to_vec(),
            }
        })
        .collect()
}

/// Build the pass/fail table from a slice and the channel configuration.
///
/// Rows follow ascending channel order; only channels with data in the slice
/// appear.
pub fn table_rows(slice: &SliceResult, configs: &[ChannelConfig]) -> Vec<TableRow> {
    slice
        .history
        .keys()
        .enumerate()
        .map(|(i, &ch)| {
            let config = configs.get(ch).cloned().unwrap_or_default();
            let max = slice
                .max_in_slice
                .get(&ch)
                .copied()
                .unwrap_or(f64::NEG_INFINITY);
            TableRow {
                seq: i + 1,
                location: config.location,
                channel: ch + 1,
                max_temp: format!("{max:.2}"),
                threshold: config.threshold.clone(),
                status: pass_status(&config.threshold, max),
            }
        })
        .collect()
}

/// Format a Unix timestamp as local wall-clock text.
pub fn format_wall_clock(timestamp: f64) -> String {
    let secs = timestamp.floor() as i64;
    let nanos = ((timestamp - secs as f64) * 1e9) as u32;
    match Local.timestamp_opt(secs, nanos) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        chrono::LocalResult::None => "N/A".to_string(),
    }
}

/// Build the spreadsheet header and data rows from a slice.
///
/// One row per timestamp of the first valid channel's slice; other channels
/// are aligned by exact timestamp and leave blank cells where they have no
/// reading. Elapsed seconds are relative to the resolved slice start.
pub fn spreadsheet_rows(slice: &SliceResult) -> (Vec<String>, Vec<Vec<String>>) {
    let valid_channels: Vec<usize> = slice.history.keys().copied().collect();
    if valid_channels.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut headers = vec!["Date".to_string(), "Time (s)".to_string()];
    headers.extend(valid_channels.iter().map(|ch| format!("Channel {}", ch + 1)));

    // The first valid channel's timestamps define the rows.
    let reference_rows = &slice.history[&valid_channels[0]];
    let mut row_index: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(reference_rows.len());
    for &(ts, _) in reference_rows {
        let mut row = vec![
            format_wall_clock(ts),
            format!("{:.2}", ts - slice.start_timestamp),
        ];
        row.extend(std::iter::repeat(String::new()).take(valid_channels.len()));
        row_index.entry(ts.to_bits()).or_insert(rows.len());
        rows.push(row);
    }

    for (col, &ch) in valid_channels.iter().enumerate() {
        for &(ts, value) in &slice.history[&ch] {
            if let Some(&idx) = row_index.get(&ts.to_bits()) {
                rows[idx][col + 2] = format!("{value:.4}");
            }
        }
    }

    (headers, rows)
}

/// Assemble the full report bundle.
///
/// Fails with [`ScanError::NoData`] when the slice holds nothing for any
/// requested channel; a report is never partially written.
pub fn assemble(
    slice: &SliceResult,
    configs: &[ChannelConfig],
    metadata: ReportMetadata,
    group_size: Option<usize>,
) -> AppResult<ReportBundle> {
    if slice.history.is_empty() {
        return Err(ScanError::NoData);
    }

    let valid_channels: Vec<usize> = slice.history.keys().copied().collect();
    let rows = table_rows(slice, configs);
    let plots = plot_groups(&valid_channels, group_size);
    let (sheet_headers, sheet_rows) = spreadsheet_rows(slice);

    Ok(ReportBundle {
        metadata,
        rows,
        plots,
        sheet_headers,
        sheet_rows,
    })
}

/// Hand an assembled bundle to the external renderers.
///
/// The report document and the companion spreadsheet are produced together;
/// the first failure aborts.
pub async fn render(
    bundle: &ReportBundle,
    report: &mut dyn ReportRenderer,
    spreadsheet: &mut dyn SpreadsheetRenderer,
) -> AppResult<()> {
    report
        .render_report(&bundle.metadata, &bundle.rows, &bundle.plots)
        .await?;
    spreadsheet
        .render_spreadsheet(&bundle.sheet_headers, &bundle.sheet_rows)
        .await?;
    Ok(())
}
