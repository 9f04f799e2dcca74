//! Session management: the controller owning the instrument connection, the
//! acquisition run lifecycle and the consumer side of the pipeline.
//!
//! One controller exists per app session. It is the only owner of the
//! instrument handle, the sample queue, the history store and the channel
//! configuration; the acquisition loop communicates with it exclusively
//! through the queue. History and configuration are touched only on the
//! controller's own (cooperative) task, so none of them need locks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::acquisition::{spawn_acquisition, SampleQueue};
use crate::channels;
use crate::config::Config;
use crate::core::{
    unix_now, ChannelConfig, ReportRenderer, SpreadsheetRenderer, BANK_CHANNELS, TOTAL_CHANNELS,
};
use crate::data::history::HistoryStore;
use crate::data::slice::{slice_window, SliceResult};
use crate::error::{AppResult, ScanError};
use crate::hardware::{ModuleLayout, ScanInstrument};
use crate::report::{self, format_wall_clock, ReportBundle, ReportMetadata};
use crate::validation::is_valid_channel_index;

/// Which half of the channel layout a connected instrument writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankSelect {
    /// Channels 1-80.
    Lower,
    /// Channels 81-160.
    Upper,
}

impl BankSelect {
    /// Zero-based offset of the bank within the channel layout.
    pub fn offset(&self) -> usize {
        match self {
            BankSelect::Lower => 0,
            BankSelect::Upper => BANK_CHANNELS,
        }
    }
}

impl fmt::Display for BankSelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankSelect::Lower => write!(f, "1-80"),
            BankSelect::Upper => write!(f, "81-160"),
        }
    }
}

impl FromStr for BankSelect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1-80" => Ok(BankSelect::Lower),
            "81-160" => Ok(BankSelect::Upper),
            other => Err(format!("unknown bank '{other}', expected 1-80 or 81-160")),
        }
    }
}

/// One acquisition run from start to stop.
#[derive(Debug, Clone)]
pub struct RunSession {
    /// Wall-clock start, seconds since the Unix epoch.
    pub start_timestamp: f64,
    /// Wall-clock stop; `None` while the run is active.
    pub stop_timestamp: Option<f64>,
    /// Bank offset the run was started with.
    pub channel_offset: usize,
    /// Zero-based ambient reference channel, if configured.
    pub ambient_channel: Option<usize>,
}

/// Offered after a run that recorded more points than the configured
/// threshold; applying it keeps every second point.
#[derive(Debug, Clone, Copy)]
pub struct DownsampleAdvice {
    /// Longest per-channel point count recorded this run.
    pub points: usize,
}

/// Everything a report request needs besides the renderers.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    /// Channel-selection text, e.g. `"1,3,(5,7)"`.
    pub channels_text: String,
    /// Window start offset in seconds from run start; `None` = run start.
    pub start_offset: Option<f64>,
    /// Window end offset in seconds; `None` = last recorded sample.
    pub end_offset: Option<f64>,
    /// Channels per plot group; `None` falls back to the configuration.
    pub group_size: Option<usize>,
    /// User-entered header fields. Run-derived fields are filled in by the
    /// controller.
    pub metadata: ReportMetadata,
}

/// The operator-entered channel setup that is worth keeping between app
/// sessions: one location/threshold pair per channel.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelSetup {
    /// Per-channel configuration, indexed by zero-based channel.
    pub channel_configs: Vec<ChannelConfig>,
}

/// Save a channel setup to a JSON file.
pub fn save_channel_setup(configs: &[ChannelConfig], path: &Path) -> AppResult<()> {
    let setup = ChannelSetup {
        channel_configs: configs.to_vec(),
    };
    let json = serde_json::to_string_pretty(&setup)
        .map_err(|e| ScanError::Serialization(e.to_string()))?;
    fs::write(path, json)?;
    Ok(())
}

/// Load a channel setup from a JSON file.
///
/// A setup saved against a shorter layout is padded with defaults; a longer
/// one is truncated.
pub fn load_channel_setup(path: &Path) -> AppResult<Vec<ChannelConfig>> {
    let json = fs::read_to_string(path)?;
    let setup: ChannelSetup =
        serde_json::from_str(&json).map_err(|e| ScanError::Serialization(e.to_string()))?;
    let mut configs = setup.channel_configs;
    configs.resize_with(TOTAL_CHANNELS, ChannelConfig::default);
    Ok(configs)
}

/// Top-level session controller.
pub struct SessionController {
    config: Config,
    instrument: Option<Arc<dyn ScanInstrument>>,
    bank_offset: usize,
    layout: ModuleLayout,
    queue: SampleQueue,
    history: HistoryStore,
    channel_configs: Vec<ChannelConfig>,
    run: Option<RunSession>,
    cancel_tx: Option<watch::Sender<bool>>,
    loop_handle: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Create a controller with no instrument connected.
    pub fn new(config: Config) -> Self {
        let queue = SampleQueue::bounded(config.acquisition.queue_capacity);
        Self {
            config,
            instrument: None,
            bank_offset: 0,
            layout: ModuleLayout::DualModule,
            queue,
            history: HistoryStore::new(),
            channel_configs: vec![ChannelConfig::default(); TOTAL_CHANNELS],
            run: None,
            cancel_tx: None,
            loop_handle: None,
        }
    }

    /// Connect an instrument and bind it to a channel bank.
    ///
    /// Returns the device identification string.
    pub async fn connect(
        &mut self,
        instrument: Arc<dyn ScanInstrument>,
        bank: BankSelect,
    ) -> AppResult<String> {
        instrument.connect().await?;
        let idn = instrument.identify().await?;
        self.layout = instrument.module_layout().await;
        self.bank_offset = bank.offset();
        self.instrument = Some(instrument);
        info!(idn = %idn, bank = %bank, layout = ?self.layout, "instrument bound to session");
        Ok(idn)
    }

    /// Disconnect the instrument.
    ///
    /// Safe to call mid-run: the loop's in-flight read fails, is logged, and
    /// the loop exits on its next cancellation check.
    pub async fn disconnect(&mut self) {
        if let Some(cancel) = self.cancel_tx.as_ref() {
            cancel.send(true).ok();
        }
        if let Some(instrument) = self.instrument.take() {
            instrument.disconnect().await;
        }
    }

    /// Whether an acquisition run is currently active.
    pub fn is_running(&self) -> bool {
        self.cancel_tx.is_some()
    }

    /// Update one channel's location label.
    pub fn set_location(&mut self, channel: usize, location: &str) -> AppResult<()> {
        is_valid_channel_index(channel).map_err(|e| ScanError::InvalidInput(e.to_string()))?;
        self.channel_configs[channel].location = location.to_string();
        Ok(())
    }

    /// Update one channel's threshold text.
    pub fn set_threshold(&mut self, channel: usize, threshold: &str) -> AppResult<()> {
        is_valid_channel_index(channel).map_err(|e| ScanError::InvalidInput(e.to_string()))?;
        self.channel_configs[channel].threshold = threshold.to_string();
        Ok(())
    }

    /// Per-channel configuration, indexed by zero-based channel.
    pub fn channel_configs(&self) -> &[ChannelConfig] {
        &self.channel_configs
    }

    /// Replace the channel setup with one loaded from a JSON file.
    pub fn load_channel_setup_from(&mut self, path: &Path) -> AppResult<()> {
        self.channel_configs = load_channel_setup(path)?;
        info!(path = %path.display(), "channel setup loaded");
        Ok(())
    }

    /// Persist the channel setup to a JSON file.
    pub fn save_channel_setup_to(&self, path: &Path) -> AppResult<()> {
        save_channel_setup(&self.channel_configs, path)
    }

    /// Recorded history of the current (or last) run.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// The current (or last) run, if one was started.
    pub fn run(&self) -> Option<&RunSession> {
        self.run.as_ref()
    }

    /// Samples dropped by the producer since the current queue was created.
    pub fn dropped_samples(&self) -> u64 {
        self.queue.dropped()
    }

    /// Start a new acquisition run.
    ///
    /// Clears all history and maxima, configures the instrument's scan and
    /// spawns the producer loop. Exactly one run may be active at a time.
    pub async fn start_run(&mut self, ambient_channel: Option<usize>) -> AppResult<()> {
        if self.is_running() {
            return Err(ScanError::RunActive);
        }
        let instrument = self
            .instrument
            .as_ref()
            .ok_or(ScanError::NotConnected)?
            .clone();
        if !instrument.is_connected().await {
            return Err(ScanError::NotConnected);
        }

        self.history.reset(ambient_channel);
        // Fresh queue so a previous run's stragglers cannot leak in.
        self.queue = SampleQueue::bounded(self.config.acquisition.queue_capacity);

        instrument.configure_scan().await?;

        let start_timestamp = unix_now();
        self.run = Some(RunSession {
            start_timestamp,
            stop_timestamp: None,
            channel_offset: self.bank_offset,
            ambient_channel,
        });

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = spawn_acquisition(
            instrument,
            self.queue.producer(),
            self.bank_offset,
            self.layout,
            self.config.acquisition.poll_interval,
            cancel_rx,
        );
        self.cancel_tx = Some(cancel_tx);
        self.loop_handle = Some(handle);
        info!(start_timestamp, ?ambient_channel, "acquisition run started");
        Ok(())
    }

    /// Drain the sample queue into history. Called on the consumer tick.
    ///
    /// Returns the number of samples folded in.
    pub fn drain_tick(&mut self) -> usize {
        let samples = self.queue.drain_all();
        for sample in &samples {
            self.history.ingest(sample);
        }
        samples.len()
    }

    /// Stop the active run.
    ///
    /// Signals the producer, waits for it to finish its current read, drains
    /// whatever is still queued, and reports whether the run is large enough
    /// that downsampling is worth offering.
    pub async fn stop_run(&mut self) -> AppResult<Option<DownsampleAdvice>> {
        let cancel_tx = self.cancel_tx.take().ok_or(ScanError::NoRun)?;
        cancel_tx.send(true).ok();
        if let Some(handle) = self.loop_handle.take() {
            if handle.await.is_err() {
                warn!("acquisition loop ended abnormally");
            }
        }
        self.drain_tick();

        if let Some(run) = self.run.as_mut() {
            run.stop_timestamp = Some(unix_now());
        }

        let points = self.history.longest_series();
        info!(points, dropped = self.queue.dropped(), "acquisition run stopped");
        if points > self.config.acquisition.downsample_threshold {
            Ok(Some(DownsampleAdvice { points }))
        } else {
            Ok(None)
        }
    }

    /// Apply the optional post-run compaction (keep every second point).
    pub fn apply_downsample(&mut self) {
        self.history.downsample();
    }

    /// Slice the recorded history to a window, if a run exists.
    pub fn slice(
        &self,
        channels: &[usize],
        start_offset: Option<f64>,
        end_offset: Option<f64>,
    ) -> Option<SliceResult> {
        let run = self.run.as_ref()?;
        slice_window(
            &self.history,
            run.start_timestamp,
            channels,
            start_offset,
            end_offset,
        )
    }

    /// Assemble and render a report for the requested channels and window.
    ///
    /// Precondition failures (no channels, no data) abort before anything is
    /// written. Returns the assembled bundle for the caller's own display.
    pub async fn generate_report(
        &self,
        request: ReportRequest,
        report_renderer: &mut dyn ReportRenderer,
        spreadsheet_renderer: &mut dyn SpreadsheetRenderer,
    ) -> AppResult<ReportBundle> {
        let requested = channels::parse(&request.channels_text);
        if requested.is_empty() {
            return Err(ScanError::InvalidInput(
                "No channels specified for the report".to_string(),
            ));
        }
        let run = self.run.as_ref().ok_or(ScanError::NoRun)?;

        let slice = self
            .slice(&requested, request.start_offset, request.end_offset)
            .ok_or(ScanError::NoData)?;

        let mut metadata = request.metadata;
        metadata.start_time = format_wall_clock(slice.start_timestamp);
        let stop_ts = request
            .end_offset
            .map(|offset| run.start_timestamp + offset)
            .or(run.stop_timestamp)
            .unwrap_or_else(unix_now);
        metadata.stop_time = format_wall_clock(stop_ts);
        metadata.ambient_channel = run
            .ambient_channel
            .map(|ch| (ch + 1).to_string())
            .unwrap_or_else(|| "N/A".to_string());
        metadata.ambient_start_temp = self
            .history
            .ambient_start()
            .map(|t| format!("{t:.2}"))
            .unwrap_or_else(|| "N/A".to_string());
        metadata.ambient_end_temp = self
            .history
            .ambient_end()
            .map(|t| format!("{t:.2}"))
            .unwrap_or_else(|| "N/A".to_string());

        let group_size = request
            .group_size
            .or(self.config.report.channels_per_graph);
        let bundle = report::assemble(&slice, &self.channel_configs, metadata, group_size)?;
        report::render(&bundle, report_renderer, spreadsheet_renderer).await?;
        Ok(bundle)
    }
}
