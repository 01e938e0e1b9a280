//! `nina` - run, validate and estimate sequence files against simulated equipment

mod config;
mod logging;
mod template;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use config::{sanitize_time_scale, CliConfig};
use nina_sequencer::simulator::SimulatedEquipment;
use nina_sequencer::{
    duration_from_secs, EstimationMode, ExecutorEvent, ExecutorState, RunSummary,
    SequenceExecutor, SequenceFile, SequenceItem,
};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - imaging sequencer");

#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a sequence file to completion; Ctrl-C stops it
    Run {
        file: PathBuf,
        /// Override the simulator time scale (0 completes actions instantly)
        #[arg(long)]
        time_scale: Option<f64>,
        /// Print executor events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Check a sequence file against the simulated equipment
    Validate { file: PathBuf },
    /// Print the estimated runtime of a sequence file
    Estimate {
        file: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Write a starter sequence file
    Template {
        /// Destination; printed to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Standard,
    Rotate,
}

impl From<ModeArg> for EstimationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Standard => EstimationMode::Standard,
            ModeArg::Rotate => EstimationMode::Rotate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = CliConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging, cli.verbose);
    if let Some(path) = &config_path {
        info!("Loaded configuration from {}", path.display());
    }

    match cli.command {
        Command::Run {
            file,
            time_scale,
            json,
        } => run(&config, &file, time_scale, json).await,
        Command::Validate { file } => validate(&config, &file),
        Command::Estimate { file, mode } => {
            let mode = mode
                .map(EstimationMode::from)
                .unwrap_or(config.sequencer.estimation_mode);
            estimate(&file, mode)
        }
        Command::Template { output } => write_template(output.as_deref()),
    }
}

fn build_executor(
    config: &CliConfig,
    time_scale: Option<f64>,
) -> (SimulatedEquipment, SequenceExecutor) {
    let mut options = config.simulator_options();
    if let Some(scale) = time_scale {
        options.time_scale = sanitize_time_scale(scale);
    }
    let observer = options.observer;
    let sim = SimulatedEquipment::new(options);
    let mut executor = SequenceExecutor::new(sim.equipment());
    executor.set_observer(observer);
    (sim, executor)
}

async fn run(config: &CliConfig, file: &Path, time_scale: Option<f64>, json: bool) -> Result<()> {
    let (_sim, mut executor) = build_executor(config, time_scale);
    executor
        .load_file(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    for issue in executor.validate() {
        warn!("{}", issue);
    }
    info!(
        "Estimated runtime: {}",
        format_duration(executor.estimated_remaining(config.sequencer.estimation_mode))
    );

    let mut events = executor.subscribe();
    let cancel = executor.cancellation();
    executor.start()?;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    let summary = {
        let wait = executor.wait();
        tokio::pin!(wait);
        loop {
            tokio::select! {
                result = &mut wait => break result?,
                event = events.recv() => match event {
                    Ok(event) => report_event(&event, json),
                    Err(RecvError::Lagged(skipped)) => warn!("Dropped {} executor events", skipped),
                    Err(RecvError::Closed) => {}
                },
                _ = &mut ctrl_c, if !stopping => {
                    warn!("Interrupted, stopping sequence");
                    stopping = true;
                    cancel.cancel();
                }
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        report_event(&event, json);
    }

    print_summary(&summary);
    match executor.state() {
        ExecutorState::Failed => bail!("Sequence aborted"),
        _ => Ok(()),
    }
}

fn report_event(event: &ExecutorEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Cannot serialize event: {}", e),
        }
        return;
    }
    match event {
        ExecutorEvent::ItemStarted { name, .. } => info!("Started {}", name),
        ExecutorEvent::ItemCompleted { name, status, .. } => info!("{} {}", name, status),
        ExecutorEvent::TriggerFired {
            trigger_name,
            before,
            ..
        } => match before {
            Some(before) => info!("Trigger {} fired before {}", trigger_name, before),
            None => info!("Trigger {} fired", trigger_name),
        },
        ExecutorEvent::SequenceFailed { error } => warn!("Sequence failed: {}", error),
        _ => {}
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} finished, {} failed, {} skipped, {} pending",
        summary.finished, summary.failed, summary.skipped, summary.pending
    );
    println!(
        "{} light frames, {} integration, {} elapsed",
        summary.exposures_completed,
        format_duration(duration_from_secs(summary.integration_secs)),
        format_duration(summary.elapsed)
    );
    if summary.cancelled {
        println!("Stopped by user");
    }
}

fn validate(config: &CliConfig, file: &Path) -> Result<()> {
    let (_sim, mut executor) = build_executor(config, None);
    executor
        .load_file(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    let issues = executor.validate();
    if issues.is_empty() {
        println!("{}: no issues", file.display());
        return Ok(());
    }
    for issue in &issues {
        println!("{}", issue);
    }
    bail!("{} issue(s) found", issues.len())
}

fn estimate(file: &Path, mode: EstimationMode) -> Result<()> {
    let root = SequenceFile::load(file)
        .and_then(|sequence| sequence.build_container())
        .with_context(|| format!("Failed to load {}", file.display()))?;
    println!(
        "{}: {} ({:?})",
        root.name(),
        format_duration(root.calculate_estimated_runtime(mode)),
        mode
    );
    Ok(())
}

fn write_template(output: Option<&Path>) -> Result<()> {
    let file = SequenceFile::from_item(&template::sample_sequence());
    match output {
        Some(path) => {
            file.save(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", file.to_json()?),
    }
    Ok(())
}

/// `1h 02m 03s` style formatting
fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
