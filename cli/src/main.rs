//! `tanknav` CLI: scenario runs, replays, beacon table checks.

mod beacon_csv;
mod frames;
mod runner;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nav_core::{EstimatorChoice, FilterConfig};
use runner::{run_log, PoseTrace, RunReport};
use sim::replay::{load_replay, save_replay};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "tanknav", about = "Tank vehicle pose estimator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EstimatorKind {
    /// Range-only extended Kalman filter
    Ekf,
    /// Particle filter
    Particle,
}

impl From<EstimatorKind> for EstimatorChoice {
    fn from(kind: EstimatorKind) -> Self {
        match kind {
            EstimatorKind::Ekf => EstimatorChoice::Ekf,
            EstimatorKind::Particle => EstimatorChoice::Particle,
        }
    }
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Estimator variant (overrides the config file)
    #[arg(long, value_enum)]
    estimator: Option<EstimatorKind>,
    /// JSON filter configuration; omitted fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output metrics to a JSON file
    #[arg(long)]
    output: Option<PathBuf>,
    /// Write the published ENU pose of every detection cycle to a JSON file
    #[arg(long)]
    trace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a named scenario, run the estimator and report metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        filter: FilterArgs,
        /// Also save the full replay log
        #[arg(long)]
        save_replay: Option<PathBuf>,
    },
    /// Run the estimator over a previously recorded replay log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Validate a beacon table CSV (id,x,y,z).
    CheckBeacons {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            filter,
            save_replay: save_path,
        } => run_scenario(scenario, seed, &filter, save_path.as_deref()),
        Commands::Replay { input, filter } => run_replay(&input, &filter),
        Commands::CheckBeacons { path } => check_beacons(&path),
    }
}

fn load_config(args: &FilterArgs) -> Result<FilterConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loading filter config");
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => FilterConfig::default(),
    };
    if let Some(kind) = args.estimator {
        config.estimator = kind.into();
    }
    config.validate().context("invalid filter configuration")?;
    Ok(config)
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    args: &FilterArgs,
    replay_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(args)?;
    let scenario = Scenario::build(kind, seed);
    println!(
        "Running scenario '{}' (seed={}, duration={:.0}s, estimator={:?})...",
        scenario.name, seed, scenario.duration, config.estimator
    );

    let log = scenario.record()?;
    let (report, trace) = run_log(&log, config)?;
    print_report(&report);

    // Save replay if requested
    if let Some(rpath) = replay_path {
        save_replay(&log, rpath)?;
        println!("Replay saved to {}", rpath.display());
    }

    write_outputs(args, &report, &trace)
}

fn run_replay(input: &Path, args: &FilterArgs) -> Result<()> {
    let config = load_config(args)?;
    let log = load_replay(input)?;
    println!(
        "Replaying '{}' ({} detection cycles)...",
        log.scenario_name,
        log.detection_batches()
    );

    let (report, trace) = run_log(&log, config)?;
    print_report(&report);
    write_outputs(args, &report, &trace)
}

fn check_beacons(path: &Path) -> Result<()> {
    let map = beacon_csv::load_beacon_csv(path)?;
    println!("{}: {} beacons", path.display(), map.len());
    for beacon in map.iter() {
        let p = frames::ned_to_enu(&beacon.position);
        println!(
            "  {:>4}  ned=({:6.3}, {:6.3}, {:6.3})  enu=({:6.3}, {:6.3}, {:6.3})",
            beacon.id, beacon.position.x, beacon.position.y, beacon.position.z, p.x, p.y, p.z
        );
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let m = &report.metrics;
    println!(
        "Done: {} cycles ({} dropout, {} dropped detections), elapsed={:.2}s, {:.0} µs/cycle",
        m.cycles, m.dropout_cycles, m.dropped_detections, report.elapsed_s, report.mean_cycle_us
    );
    println!(
        "Position RMSE {:.3} m (max {:.3} m), yaw RMSE {:.2}°",
        m.rmse_position,
        m.max_position_error,
        m.rmse_yaw.to_degrees()
    );
    if let Some(pose) = &report.final_pose {
        println!(
            "Final pose (ENU): ({:.3}, {:.3}, {:.3}) yaw {:.1}°",
            pose.position[0],
            pose.position[1],
            pose.position[2],
            pose.yaw.to_degrees()
        );
    }
    if let Some(ess) = report.final_ess {
        println!("Final effective sample size {ess:.1}");
    }
}

fn write_outputs(args: &FilterArgs, report: &RunReport, trace: &PoseTrace) -> Result<()> {
    if let Some(opath) = &args.output {
        std::fs::write(opath, serde_json::to_string_pretty(report)?)
            .with_context(|| format!("writing {}", opath.display()))?;
        println!("Metrics saved to {}", opath.display());
    }
    if let Some(tpath) = &args.trace {
        std::fs::write(tpath, serde_json::to_string(trace)?)
            .with_context(|| format!("writing {}", tpath.display()))?;
        println!("Pose trace saved to {}", tpath.display());
    }
    Ok(())
}
