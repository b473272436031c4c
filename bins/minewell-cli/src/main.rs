//! minewell — command-line front-end for the Minewell product simulator.
//!
//! Loads product and curve JSON, runs the bear/base/bull simulation and
//! writes the results as JSON. Also exposes the curve generators, the
//! hosting blend, ops calibration and per-unit economics.

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use minewell_core::scenario::Scenario;
use tracing::{debug, info};

use settings::Settings;

/// Minewell product simulator.
#[derive(Parser, Debug)]
#[command(name = "minewell", version, about = "Mining-backed structured product simulator")]
struct Cli {
    /// Settings file (default: ./minewell.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a product against its scenario curves.
    Simulate(SimulateArgs),
    /// Generate scenario curves from price and network recipes.
    Curves(CurvesArgs),
    /// Blend miners spread across hosting sites into one effective site.
    Allocate(AllocateArgs),
    /// Fit uptime and production factors to observed operations.
    Calibrate(CalibrateArgs),
    /// Monthly cash flow and break-even of a single miner.
    UnitEconomics(UnitEconomicsArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Product JSON (`"mode": "buckets"` or `"collateral"`)
    #[arg(short, long)]
    product: PathBuf,

    /// Scenario curves JSON
    #[arg(short, long)]
    curves: PathBuf,

    /// Run only this scenario
    #[arg(short, long)]
    scenario: Option<Scenario>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CurvesArgs {
    /// Per-scenario price and network recipe JSON
    #[arg(short, long)]
    spec: PathBuf,

    /// Derive bear and bull from the base recipe by this band (percent)
    #[arg(long)]
    band: Option<f64>,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AllocateArgs {
    /// Site allocation list JSON
    #[arg(short, long)]
    sites: PathBuf,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Fleet JSON
    #[arg(short, long)]
    fleet: PathBuf,

    /// Observed monthly operations JSON
    #[arg(long)]
    history: PathBuf,

    /// Scenario curves JSON
    #[arg(short, long)]
    curves: PathBuf,

    #[arg(short, long, default_value_t = Scenario::Base)]
    scenario: Scenario,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct UnitEconomicsArgs {
    /// Fleet JSON; only its miner and hosting site are used
    #[arg(short, long)]
    fleet: PathBuf,

    /// Scenario curves JSON
    #[arg(short, long)]
    curves: PathBuf,

    #[arg(short, long, default_value_t = Scenario::Base)]
    scenario: Scenario,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?.with_overrides(cli.log_level, cli.log_format, cli.pretty);

    init_logging(&settings.log_level, &settings.log_format);
    info!("Minewell v{}", env!("CARGO_PKG_VERSION"));
    debug!(?settings, "settings loaded");

    let pretty = settings.output_pretty;
    match cli.command {
        Commands::Simulate(args) => {
            let result = commands::run_simulate(&args.product, &args.curves, args.scenario)?;
            commands::write_json(&result, args.output.as_deref(), pretty)
        }
        Commands::Curves(args) => {
            let set = commands::run_curves(&args.spec, args.band)?;
            commands::write_json(&set, args.output.as_deref(), pretty)
        }
        Commands::Allocate(args) => {
            let blend = commands::run_allocate(&args.sites)?;
            commands::write_json(&blend, args.output.as_deref(), pretty)
        }
        Commands::Calibrate(args) => {
            let report = commands::run_calibrate(&args.fleet, &args.history, &args.curves, args.scenario)?;
            commands::write_json(&report, args.output.as_deref(), pretty)
        }
        Commands::UnitEconomics(args) => {
            let economics = commands::run_unit_economics(&args.fleet, &args.curves, args.scenario)?;
            commands::write_json(&economics, args.output.as_deref(), pretty)
        }
    }
}

/// Crates whose events follow the configured level; everything else is
/// held at `warn`.
const LOG_TARGETS: [&str; 3] = ["minewell", "minewell_core", "minewell_engine"];

/// Default filter directives when `RUST_LOG` is unset.
fn default_directives(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .fold(String::from("warn"), |acc, target| format!("{acc},{target}={level}"))
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the minewell crates log at `level`.
/// `format = "json"` selects structured output. Logs go to stderr so JSON
/// results on stdout stay clean.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
