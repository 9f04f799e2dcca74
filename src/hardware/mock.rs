//! Mock hardware implementation.
//!
//! Provides a simulated temperature scanner for testing without physical
//! hardware, and for the `--mock` CLI path. Readings follow a deterministic
//! drift-plus-noise model so tests can pin exact values by fixing the base
//! temperatures.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

use crate::hardware::capabilities::{ModuleLayout, ScanInstrument};

/// Simulated multichannel thermocouple scanner.
///
/// Each channel reads its base temperature plus a small deterministic noise
/// term; a handful of "drifting" channels additionally climb a fixed amount
/// per scan, which gives live displays and running maxima something to do.
pub struct MockScanner {
    layout: ModuleLayout,
    base_temps: Vec<f64>,
    drifting: Vec<usize>,
    open_channels: Vec<usize>,
    drift_per_scan: f64,
    /// Every n-th read fails, simulating transient bus errors. 0 disables.
    fail_every: u64,
    scan_count: AtomicU64,
    connected: AtomicBool,
    idn: RwLock<String>,
}

impl MockScanner {
    /// Create a scanner with randomized ambient-ish base temperatures and
    /// five drifting channels, mirroring a bench warming up.
    pub fn new(layout: ModuleLayout) -> Self {
        let mut rng = rand::thread_rng();
        let active = layout.active_channels();
        let base_temps: Vec<f64> = (0..active).map(|_| rng.gen_range(20.0..25.0)).collect();
        let mut indices: Vec<usize> = (0..active).collect();
        indices.shuffle(&mut rng);
        indices.truncate(5);

        Self {
            layout,
            base_temps,
            drifting: indices,
            open_channels: Vec::new(),
            drift_per_scan: 0.25,
            fail_every: 0,
            scan_count: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            idn: RwLock::new(String::new()),
        }
    }

    /// Create a fully deterministic scanner from explicit base temperatures.
    ///
    /// `base_temps.len()` must equal `layout.active_channels()`.
    pub fn with_base_temps(layout: ModuleLayout, base_temps: Vec<f64>) -> Self {
        debug_assert_eq!(base_temps.len(), layout.active_channels());
        Self {
            layout,
            base_temps,
            drifting: Vec::new(),
            open_channels: Vec::new(),
            drift_per_scan: 0.0,
            fail_every: 0,
            scan_count: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            idn: RwLock::new(String::new()),
        }
    }

    /// Mark channels (indices into the active block) as open inputs that
    /// always read as missing.
    pub fn with_open_channels(mut self, open: Vec<usize>) -> Self {
        self.open_channels = open;
        self
    }

    /// Make channels drift upward by `per_scan` degrees every read.
    pub fn with_drift(mut self, drifting: Vec<usize>, per_scan: f64) -> Self {
        self.drifting = drifting;
        self.drift_per_scan = per_scan;
        self
    }

    /// Fail every n-th read with a simulated bus error.
    pub fn with_failures_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    /// Number of successful and failed scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scan_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanInstrument for MockScanner {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        *self.idn.write().await =
            "KEITHLEY INSTRUMENTS INC.,MODEL 2701,SIM000,A09/A02".to_string();
        info!("mock scanner connected");
        Ok(())
    }

    async fn read_raw(&self) -> Result<Vec<Option<f64>>> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("mock scanner is not connected");
        }
        let scan = self.scan_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && scan % self.fail_every == 0 {
            bail!("simulated bus error on scan {scan}");
        }

        let readings = (0..self.base_temps.len())
            .map(|i| {
                if self.open_channels.contains(&i) {
                    return None;
                }
                let drift = if self.drifting.contains(&i) {
                    scan as f64 * self.drift_per_scan
                } else {
                    0.0
                };
                // Deterministic noise keeps the mock reproducible.
                let noise = ((scan as f64) * 37.0 + i as f64).sin() * 0.05;
                Some(self.base_temps[i] + drift + noise)
            })
            .collect();
        Ok(readings)
    }

    async fn configure_scan(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("mock scanner is not connected");
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        info!("mock scanner disconnected");
    }

    async fn identify(&self) -> Result<String> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("mock scanner is not connected");
        }
        Ok(self.idn.read().await.clone())
    }

    async fn module_layout(&self) -> ModuleLayout {
        self.layout
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
