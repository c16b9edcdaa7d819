mod app;
mod cli;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use app::Orchestrator;
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _telemetry_guards = telemetry::init_telemetry(&args)?;

    info!(query = %args.query, "starting policy evolution run");

    let orchestrator = match Orchestrator::build(args).await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            error!(error = %err, "failed to build orchestrator");
            std::process::exit(1);
        }
    };

    match orchestrator.run().await {
        Ok(report) => {
            let rendered = serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string());
            println!("{rendered}");
            info!(trace_id = %report.trace_id, proposals = report.rankings.len(), "run complete");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "run failed");
            std::process::exit(1);
        }
    }
}
