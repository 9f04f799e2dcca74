//! CLI entry point for thermoscan.
//!
//! Provides a headless acquisition session: connect to a scanner (real or
//! mock), poll it for a fixed duration while draining the sample queue on the
//! consumer tick, then print the pass/fail summary and write the companion
//! spreadsheet.
//!
//! # Usage
//!
//! Run a mock session:
//! ```bash
//! thermoscan run --mock --duration-secs 10 --channels "1,(2,10)"
//! ```
//!
//! Check a channel-selection string:
//! ```bash
//! thermoscan parse-channels "1,3,(5,7)"
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use thermoscan::channels;
use thermoscan::config::Config;
use thermoscan::core::ReportRenderer;
use thermoscan::data::storage::CsvSpreadsheet;
use thermoscan::error::ScanError;
use thermoscan::hardware::keithley::KeithleyOptions;
use thermoscan::hardware::{
    KeithleyScanner, MockScanner, ModuleLayout, ScanInstrument, TcpScpiTransport,
};
use thermoscan::report::{PlotGroup, ReportMetadata, TableRow};
use thermoscan::session::{BankSelect, ReportRequest, SessionController};
use thermoscan::tracing_setup;
use thermoscan::validation::parse_ambient_channel;

#[derive(Parser)]
#[command(name = "thermoscan")]
#[command(about = "Multichannel thermocouple scanner acquisition", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a headless acquisition session
    Run {
        /// Use the simulated scanner instead of real hardware
        #[arg(long)]
        mock: bool,

        /// Channel bank the instrument writes into
        #[arg(long, default_value = "1-80")]
        bank: BankSelect,

        /// Acquisition duration in seconds
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,

        /// Channels to summarize and report, e.g. "1,3,(5,7)"
        #[arg(long, default_value = "(1,10)")]
        channels: String,

        /// Ambient reference channel (one-based), empty to disable
        #[arg(long, default_value = "")]
        ambient: String,

        /// Apply downsampling without asking when the run is large
        #[arg(long)]
        downsample: bool,

        /// Spreadsheet output path (defaults into the configured output dir)
        #[arg(long)]
        export: Option<PathBuf>,

        /// Channel setup JSON (locations and thresholds) to apply
        #[arg(long)]
        channel_setup: Option<PathBuf>,
    },

    /// Parse a channel-selection string and print the canonical form
    ParseChannels {
        /// Selection text, e.g. "1,3,(5,7)"
        text: String,
    },
}

/// Report renderer printing the assembled report to stdout.
///
/// The PDF document itself is produced by an external renderer; this one
/// exists so headless sessions still surface the full table.
struct ConsoleReport;

#[async_trait]
impl ReportRenderer for ConsoleReport {
    async fn render_report(
        &mut self,
        metadata: &ReportMetadata,
        rows: &[TableRow],
        plots: &[PlotGroup],
    ) -> Result<(), ScanError> {
        println!();
        println!("Test name:       {}", metadata.test_name);
        println!("Window:          {} .. {}", metadata.start_time, metadata.stop_time);
        println!(
            "Ambient:         ch {} ({} -> {})",
            metadata.ambient_channel, metadata.ambient_start_temp, metadata.ambient_end_temp
        );
        println!();
        println!("{:>4}  {:<20} {:>7} {:>10} {:>10}  {}", "#", "Location", "Channel", "Max", "Limit", "Status");
        for row in rows {
            println!(
                "{:>4}  {:<20} {:>7} {:>10} {:>10}  {}",
                row.seq, row.location, row.channel, row.max_temp, row.threshold, row.status
            );
        }
        println!();
        for plot in plots {
            println!("Plot group: {} ({} channels)", plot.title, plot.channels.len());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    config
        .validate()
        .map_err(ScanError::Configuration)
        .context("invalid configuration")?;
    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run {
            mock,
            bank,
            duration_secs,
            channels,
            ambient,
            downsample,
            export,
            channel_setup,
        } => {
            run_session(
                config,
                mock,
                bank,
                duration_secs,
                channels,
                ambient,
                downsample,
                export,
                channel_setup,
            )
            .await
        }
        Commands::ParseChannels { text } => {
            let parsed = channels::parse(&text);
            println!("zero-based: {:?}", parsed);
            println!("canonical:  {}", channels::render(&parsed));
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    config: Config,
    mock: bool,
    bank: BankSelect,
    duration_secs: u64,
    channels_text: String,
    ambient: String,
    downsample: bool,
    export: Option<PathBuf>,
    channel_setup: Option<PathBuf>,
) -> Result<()> {
    println!("🌡️  thermoscan — multichannel temperature acquisition");

    let instrument: Arc<dyn ScanInstrument> = if mock {
        println!("🔧 Using simulated scanner");
        Arc::new(MockScanner::new(ModuleLayout::DualModule))
    } else {
        let transport = TcpScpiTransport::connect(
            &config.instrument.address,
            config.instrument.port,
            config.instrument.read_timeout,
        )
        .await?;
        let options = KeithleyOptions {
            thermocouple_type: config.instrument.thermocouple_type.clone(),
            nplc: config.instrument.nplc,
        };
        Arc::new(KeithleyScanner::new(transport, options))
    };

    let drain_interval = config.acquisition.drain_interval;
    let output_dir = config.report.output_dir.clone();
    let mut controller = SessionController::new(config);

    if let Some(path) = channel_setup.as_deref() {
        controller
            .load_channel_setup_from(path)
            .with_context(|| format!("failed to load channel setup {}", path.display()))?;
    }

    let idn = controller.connect(instrument, bank).await?;
    println!("🔌 Connected: {idn}");

    let ambient_channel = parse_ambient_channel(&ambient);
    controller.start_run(ambient_channel).await?;
    println!("▶️  Acquiring for {duration_secs}s (Ctrl+C stops early)");

    let shutdown = tokio::time::sleep(Duration::from_secs(duration_secs));
    tokio::pin!(shutdown);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut drain = tokio::time::interval(drain_interval);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = &mut interrupt => {
                info!("interrupted; stopping acquisition");
                break;
            }
            _ = drain.tick() => {
                controller.drain_tick();
            }
        }
    }

    if let Some(advice) = controller.stop_run().await? {
        if downsample {
            controller.apply_downsample();
        } else {
            warn!(
                points = advice.points,
                "run recorded many points; rerun with --downsample to compact"
            );
        }
    }
    let dropped = controller.dropped_samples();
    if dropped > 0 {
        warn!(dropped, "samples were dropped on queue overflow");
    }

    let export_path = export.unwrap_or_else(|| {
        output_dir.join(format!(
            "scan_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    });

    let request = ReportRequest {
        channels_text,
        metadata: ReportMetadata {
            test_name: "Headless acquisition".to_string(),
            equipment: idn,
            ..ReportMetadata::default()
        },
        ..ReportRequest::default()
    };
    let mut console = ConsoleReport;
    let mut spreadsheet = CsvSpreadsheet::new(export_path.clone());
    match controller
        .generate_report(request, &mut console, &mut spreadsheet)
        .await
    {
        Ok(_) => println!("💾 Data saved to {}", export_path.display()),
        Err(ScanError::NoData) => {
            println!("⚠️  No data recorded for the requested channels; nothing written");
        }
        Err(e) => return Err(e.into()),
    }

    controller.disconnect().await;
    println!("👋 Session closed");
    Ok(())
}
