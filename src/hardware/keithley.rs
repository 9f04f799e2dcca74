//! Keithley 2700/2701 multichannel scanner driver.
//!
//! Speaks the 27xx SCPI vocabulary over any [`ScpiTransport`]. The driver
//! verifies the device identity at connect time, discovers the installed
//! 7708 module layout from `*OPT?`, and wraps each scan in the
//! scan-enable/disable pair the instrument requires.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::hardware::capabilities::{ModuleLayout, ScanInstrument};
use crate::hardware::scpi::ScpiTransport;

/// Raw readings at or above this magnitude are the instrument's overflow
/// sentinel for an open thermocouple input.
const OVERFLOW_SENTINEL: f64 = 1_000_000.0;

/// Scanner configuration knobs taken from the application configuration.
#[derive(Debug, Clone)]
pub struct KeithleyOptions {
    /// Thermocouple type applied to every scanned channel.
    pub thermocouple_type: String,
    /// Integration time in power-line cycles.
    pub nplc: f64,
}

impl Default for KeithleyOptions {
    fn default() -> Self {
        Self {
            thermocouple_type: "K".to_string(),
            nplc: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct ScannerState {
    connected: bool,
    layout: ModuleLayout,
    scan_list: String,
    sample_count: usize,
    idn: String,
}

impl Default for ScannerState {
    fn default() -> Self {
        Self {
            connected: false,
            layout: ModuleLayout::DualModule,
            scan_list: "(@101:140,201:240)".to_string(),
            sample_count: 80,
            idn: String::new(),
        }
    }
}

/// Driver for a Keithley 27xx switch/measure unit in temperature-scan mode.
pub struct KeithleyScanner<T: ScpiTransport> {
    transport: T,
    options: KeithleyOptions,
    state: RwLock<ScannerState>,
}

impl<T: ScpiTransport> KeithleyScanner<T> {
    /// Wrap a transport. No traffic happens until `connect`.
    pub fn new(transport: T, options: KeithleyOptions) -> Self {
        Self {
            transport,
            options,
            state: RwLock::new(ScannerState::default()),
        }
    }

    async fn ensure_connected(&self) -> Result<()> {
        if !self.state.read().await.connected {
            bail!("instrument is not connected");
        }
        Ok(())
    }

    /// Mark the session invalid after a failed write/query. The loss is
    /// surfaced to the user on the next explicit action.
    async fn mark_disconnected(&self) {
        let mut state = self.state.write().await;
        if state.connected {
            warn!("marking instrument connection invalid after I/O failure");
            state.connected = false;
        }
    }

    fn apply_layout(state: &mut ScannerState, layout: ModuleLayout) {
        state.layout = layout;
        match layout {
            ModuleLayout::DualModule => {
                state.scan_list = "(@101:140,201:240)".to_string();
                state.sample_count = 80;
            }
            ModuleLayout::FirstOnly => {
                state.scan_list = "(@101:140)".to_string();
                state.sample_count = 40;
            }
            ModuleLayout::SecondOnly => {
                state.scan_list = "(@201:240)".to_string();
                state.sample_count = 40;
            }
        }
    }

    fn parse_readings(response: &str) -> Result<Vec<Option<f64>>> {
        let mut readings = Vec::new();
        for field in response.split(',') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let value: f64 = field
                .parse()
                .with_context(|| format!("unparseable reading '{field}'"))?;
            if value < OVERFLOW_SENTINEL {
                readings.push(Some(value));
            } else {
                readings.push(None);
            }
        }
        Ok(readings)
    }
}

#[async_trait]
impl<T: ScpiTransport> ScanInstrument for KeithleyScanner<T> {
    async fn connect(&self) -> Result<()> {
        let idn = self
            .transport
            .query("*IDN?")
            .await
            .context("identity query failed")?;
        let upper = idn.to_uppercase();
        if !(upper.contains("KEITHLEY") || upper.contains("2701") || upper.contains("2700")) {
            bail!("unexpected instrument identity: '{idn}'");
        }

        let options = self
            .transport
            .query("*OPT?")
            .await
            .context("installed-options query failed")?;
        let mut state = self.state.write().await;
        match ModuleLayout::from_option_string(&options) {
            Some(layout) => Self::apply_layout(&mut state, layout),
            None => {
                // Unrecognized option string: keep the dual-module default so
                // a mislabeled chassis still scans.
                warn!(options = %options, "unrecognized module options; assuming dual module");
                Self::apply_layout(&mut state, ModuleLayout::DualModule);
            }
        }
        state.idn = idn.clone();
        state.connected = true;
        info!(idn = %idn, scan_list = %state.scan_list, "instrument connected");
        Ok(())
    }

    async fn configure_scan(&self) -> Result<()> {
        self.ensure_connected().await?;
        let (scan_list, sample_count) = {
            let state = self.state.read().await;
            (state.scan_list.clone(), state.sample_count)
        };
        let tc = &self.options.thermocouple_type;
        let nplc = self.options.nplc;

        let setup = [
            "*CLS".to_string(),
            format!("SENS:FUNC 'TEMP', {scan_list}"),
            format!("SENS:TEMP:NPLC {nplc}, {scan_list}"),
            "UNIT:TEMP C".to_string(),
            format!("SENS:TEMP:TRAN TC, {scan_list}"),
            format!("SENS:TEMP:TC:TYPE {tc}, {scan_list}"),
            format!("SENS:TEMP:TC:RJUN:RSEL INT, {scan_list}"),
            "TRAC:CLE".to_string(),
            "INIT:CONT OFF".to_string(),
            "TRIG:SOUR IMM".to_string(),
            "TRIG:COUN 1".to_string(),
            format!("SAMP:COUN {sample_count}"),
            format!("ROUT:SCAN {scan_list}"),
            "ROUT:SCAN:TSO IMM".to_string(),
            "FORM:ELEM READ".to_string(),
        ];
        for command in &setup {
            if let Err(e) = self.transport.command(command).await {
                self.mark_disconnected().await;
                return Err(e.context(format!("scan setup command '{command}' failed")));
            }
        }
        info!(scan_list = %scan_list, tc_type = %tc, nplc, "temperature scan configured");
        Ok(())
    }

    async fn read_raw(&self) -> Result<Vec<Option<f64>>> {
        self.ensure_connected().await?;

        if let Err(e) = self.transport.command("ROUT:SCAN:LSEL INT").await {
            self.mark_disconnected().await;
            return Err(e.context("failed to enable scan"));
        }
        let response = match self.transport.query("READ?").await {
            Ok(response) => response,
            Err(e) => {
                self.mark_disconnected().await;
                return Err(e.context("scan read failed"));
            }
        };
        // Scan stays latched between reads otherwise.
        if let Err(e) = self.transport.command("ROUT:SCAN:LSEL NONE").await {
            self.mark_disconnected().await;
            return Err(e.context("failed to disable scan"));
        }

        let readings = Self::parse_readings(&response)?;
        let expected = self.state.read().await.sample_count;
        if readings.len() != expected {
            bail!(
                "scan returned {} readings, expected {}",
                readings.len(),
                expected
            );
        }
        Ok(readings)
    }

    async fn disconnect(&self) {
        // Best effort: the instrument may already be gone.
        self.transport.command("ROUT:SCAN:LSEL NONE").await.ok();
        let mut state = self.state.write().await;
        state.connected = false;
        state.idn.clear();
        info!("instrument disconnected");
    }

    async fn identify(&self) -> Result<String> {
        self.ensure_connected().await?;
        match self.transport.query("*IDN?").await {
            Ok(idn) => Ok(idn),
            Err(e) => {
                self.mark_disconnected().await;
                Err(e.context("identity query failed"))
            }
        }
    }

    async fn module_layout(&self) -> ModuleLayout {
        self.state.read().await.layout
    }

    async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }
}
