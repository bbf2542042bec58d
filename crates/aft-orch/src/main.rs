//! `aftd`: runs AFT scenarios against an in-memory engine.

use aft_orch::audit::{init_logging, init_logging_pretty, AuditCategory, AuditOutcome, AuditRecord};
use aft_orch::scenario::Scenario;
use aft_orch::{audit_log, AftConfig, Harness};
use anyhow::Context;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

/// AFT resolution and failover engine
#[derive(Parser, Debug)]
#[command(name = "aftd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); defaults apply when missing
    #[arg(short = 'c', long, default_value = "/etc/aft/aftd.toml")]
    config: PathBuf,

    /// Scenario file (JSON) to run
    #[arg(short = 's', long)]
    scenario: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

async fn run(args: &Args) -> anyhow::Result<bool> {
    let config = AftConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("loading {}", args.scenario.display()))?;
    let harness = Harness::new(config)?;

    let report = scenario.run(&harness).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(report.failed_operations() == 0)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.pretty {
        init_logging_pretty(&args.log_level);
    } else {
        init_logging(&args.log_level);
    }

    info!("Starting aftd, scenario {}", args.scenario.display());
    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "aftd", "start")
        .with_outcome(AuditOutcome::Success)
        .with_object_id(args.scenario.display().to_string()));

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("aftd: some operations failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("aftd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
