//! Run an rbmd JSON run script.
//!
//! Usage:
//!   rbmd <script.json> [--check]

use anyhow::{Context, Result};
use clap::Parser;
use rbmd::RunScript;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "rbmd")]
#[command(about = "Rigid-body molecular dynamics run-script runner")]
#[command(version)]
struct Args {
    /// Run script (JSON)
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Validate the script and configuration without integrating
    #[arg(long)]
    check: bool,

    /// Log neighbor list rebuilds and other details
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let script = RunScript::load(&args.script)
        .with_context(|| format!("Failed to load run script {}", args.script.display()))?;

    if args.check {
        let sim = script.check().context("Invalid run setup")?;
        log::info!(
            "{}: {} particles, {} bodies, {} phases, {} steps",
            args.script.display(),
            sim.particles().len(),
            sim.bodies().len(),
            script.phases.len(),
            script.total_steps()
        );
        return Ok(());
    }

    let start = Instant::now();
    let summary = script.execute().context("Run failed")?;

    for e in &summary.output_errors {
        log::warn!("output error during run: {e}");
    }
    log::info!(
        "completed {} of {} steps in {:.2?}{}",
        summary.steps_completed,
        script.total_steps(),
        start.elapsed(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}
