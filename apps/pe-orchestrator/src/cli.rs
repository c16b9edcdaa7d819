use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use pe_core::PolicyType;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pe-orchestrator",
    about = "Policy Evolution Engine",
    version,
    long_about = "Drives one policy evolution run: assembles context, generates proposals, \
                  runs pairwise tournaments, and evolves the survivors across generations."
)]
pub struct Args {
    /// The policy question to evolve proposals for
    pub query: String,

    /// Policy type this run produces (research, analysis, evolution, integrated)
    #[arg(long, env = "POLICY_TYPE", default_value = "integrated")]
    pub policy_type: CliPolicyType,

    /// Path to a layered configuration file (optional)
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Jurisdiction identifier, e.g. a city or county name
    #[arg(long, env = "OPENAI_AGENTS_JURISDICTION")]
    pub jurisdiction: Option<String>,

    /// Maximum number of generations to run (overrides config)
    #[arg(long, env = "OPENAI_AGENTS_MAX_GENERATIONS")]
    pub max_generations: Option<u32>,

    /// Worker Gateway endpoint (overrides config)
    #[arg(long, env = "OPENAI_AGENTS_WORKER_ENDPOINT")]
    pub worker_endpoint: Option<String>,

    /// Search Gateway primary endpoint (overrides config)
    #[arg(long, env = "OPENAI_AGENTS_SEARCH_ENDPOINT")]
    pub search_endpoint: Option<String>,

    /// Directory the Trace Store writes its file sink into (overrides config)
    #[arg(long, env = "OPENAI_AGENTS_TRACE_DIR")]
    pub trace_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "OPENAI_AGENTS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable JSON log format
    #[arg(long, env = "OPENAI_AGENTS_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable OpenTelemetry span export
    #[arg(long, env = "OPENAI_AGENTS_ENABLE_OTEL")]
    pub enable_otel: bool,

    /// OpenTelemetry collector endpoint
    #[arg(long, env = "OPENAI_AGENTS_OTEL_ENDPOINT", default_value = "http://localhost:4317")]
    pub otel_endpoint: String,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[value(rename_all = "snake_case")]
pub enum CliPolicyType {
    Research,
    Analysis,
    Evolution,
    Integrated,
}

impl From<CliPolicyType> for PolicyType {
    fn from(value: CliPolicyType) -> Self {
        match value {
            CliPolicyType::Research => PolicyType::Research,
            CliPolicyType::Analysis => PolicyType::Analysis,
            CliPolicyType::Evolution => PolicyType::Evolution,
            CliPolicyType::Integrated => PolicyType::Integrated,
        }
    }
}

impl Args {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.query.trim().is_empty() {
            anyhow::bail!("policy query must not be empty");
        }
        if let Some(path) = &self.config {
            if !path.exists() {
                anyhow::bail!("configuration file not found: {path:?}");
            }
        }
        Ok(())
    }
}
