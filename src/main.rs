//! Command-line front end: generate an action table from TOML descriptions
//! and dump it for inspection or cross-language replay comparison.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

use sim_sequencer::devices::DeviceFile;
use sim_sequencer::{PlanDescription, PlannerSettings, SequencePlanner};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Output format for the table dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DumpFormat {
    /// Tab-separated `time target payload` lines.
    Text,
    /// Pretty-printed JSON entry array.
    Json,
}

/// Generate a structured-illumination action table from TOML descriptions.
#[derive(Debug, Parser)]
#[command(name = "sim_sequencer", version, about)]
struct Args {
    /// Optional planner settings file (TOML); env vars prefixed SIM_SEQ_
    /// override it.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Device profile file (TOML).
    #[arg(long)]
    devices: PathBuf,

    /// Plan description file (TOML).
    #[arg(long)]
    plan: PathBuf,

    /// Dump format.
    #[arg(long, value_enum, default_value = "text")]
    format: DumpFormat,

    /// Write the dump to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let settings = PlannerSettings::new(args.settings.as_deref())?;

    let device_text = fs::read_to_string(&args.devices)
        .with_context(|| format!("reading device file {}", args.devices.display()))?;
    let registry = DeviceFile::from_toml_str(&device_text)?.into_registry();

    let plan_text = fs::read_to_string(&args.plan)
        .with_context(|| format!("reading plan file {}", args.plan.display()))?;
    let description = PlanDescription::from_toml_str(&plan_text)?;
    let plan = description.resolve(&registry)?;

    let planned = SequencePlanner::new(settings).generate(plan)?;
    tracing::info!(
        entries = planned.table.len(),
        end_ms = %planned.table.end_time(),
        "table generated"
    );
    for (camera, count) in &planned.image_counts {
        tracing::info!(camera = %camera, images = count, "scheduled images");
    }

    let dump = match args.format {
        DumpFormat::Text => {
            let mut buf = Vec::new();
            planned.table.write_text(&mut buf)?;
            String::from_utf8(buf).context("table dump is not valid UTF-8")?
        }
        DumpFormat::Json => planned.table.to_json()?,
    };

    match args.output {
        Some(path) => fs::write(&path, dump)
            .with_context(|| format!("writing dump to {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(dump.as_bytes())?;
        }
    }
    Ok(())
}
