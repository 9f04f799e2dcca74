//! Per-channel time-series history and running maxima.
//!
//! The store is mutated only by the queue-draining consumer tick, so it needs
//! no interior locking. Entries are append-only for the duration of a run;
//! the only structural mutation is the explicit opt-in downsample after a run
//! ends, and the wholesale reset when a new run starts.

use tracing::{debug, info};

use crate::core::{Sample, TOTAL_CHANNELS};

/// Append-only per-channel history plus the run-wide running maximum.
pub struct HistoryStore {
    /// One `(timestamp, value)` sequence per channel, insertion-ordered.
    series: Vec<Vec<(f64, f64)>>,
    /// Running maximum per channel, `NEG_INFINITY` until the first reading.
    max_temps: Vec<f64>,
    ambient_channel: Option<usize>,
    ambient_start: Option<f64>,
    ambient_end: Option<f64>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// Create an empty store covering the full channel layout.
    pub fn new() -> Self {
        Self {
            series: vec![Vec::new(); TOTAL_CHANNELS],
            max_temps: vec![f64::NEG_INFINITY; TOTAL_CHANNELS],
            ambient_channel: None,
            ambient_start: None,
            ambient_end: None,
        }
    }

    /// Clear everything for a new run and install the run's ambient channel.
    pub fn reset(&mut self, ambient_channel: Option<usize>) {
        for channel in &mut self.series {
            channel.clear();
        }
        self.max_temps.fill(f64::NEG_INFINITY);
        self.ambient_channel = ambient_channel;
        self.ambient_start = None;
        self.ambient_end = None;
        debug!(?ambient_channel, "history cleared for new run");
    }

    /// Fold one drained sample into the store.
    ///
    /// Missing values never contribute to history, maxima or ambient
    /// tracking. The ambient start temperature is sticky (first valid reading
    /// of the run); the end temperature always follows the latest one.
    pub fn ingest(&mut self, sample: &Sample) {
        for (i, value) in sample.values.iter().enumerate().take(TOTAL_CHANNELS) {
            let Some(value) = *value else { continue };
            self.series[i].push((sample.timestamp, value));
            if value > self.max_temps[i] {
                self.max_temps[i] = value;
            }
            if self.ambient_channel == Some(i) {
                if self.ambient_start.is_none() {
                    self.ambient_start = Some(value);
                }
                self.ambient_end = Some(value);
            }
        }
    }

    /// Recorded sequence for one channel.
    pub fn channel(&self, channel: usize) -> &[(f64, f64)] {
        &self.series[channel]
    }

    /// Running maximum for one channel (`NEG_INFINITY` before any reading).
    pub fn max_temp(&self, channel: usize) -> f64 {
        self.max_temps[channel]
    }

    /// Running maxima for the full layout.
    pub fn maxima(&self) -> &[f64] {
        &self.max_temps
    }

    /// First valid ambient reading of the run, if one arrived.
    pub fn ambient_start(&self) -> Option<f64> {
        self.ambient_start
    }

    /// Latest valid ambient reading of the run.
    pub fn ambient_end(&self) -> Option<f64> {
        self.ambient_end
    }

    /// Whether any channel recorded anything this run.
    pub fn has_data(&self) -> bool {
        self.series.iter().any(|s| !s.is_empty())
    }

    /// First of `requested` with recorded data, else any channel with data.
    ///
    /// This channel's timestamps become the master axis for window slicing.
    pub fn reference_channel(&self, requested: &[usize]) -> Option<usize> {
        requested
            .iter()
            .copied()
            .find(|&ch| ch < TOTAL_CHANNELS && !self.series[ch].is_empty())
            .or_else(|| self.series.iter().position(|s| !s.is_empty()))
    }

    /// Longest per-channel sequence length, the figure the downsample
    /// decision is based on.
    pub fn longest_series(&self) -> usize {
        self.series.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Keep every second recorded point on every channel.
    ///
    /// Running maxima are unaffected; they were tracked incrementally as the
    /// samples arrived.
    pub fn downsample(&mut self) {
        for channel in &mut self.series {
            if channel.is_empty() {
                continue;
            }
            *channel = channel.iter().copied().step_by(2).collect();
        }
        info!(longest = self.longest_series(), "history downsampled (kept every 2nd point)");
    }
}
