use config::{Config, ConfigError, Environment, File};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All recognized tunables from spec §6/§6.1. Every field has a default so an
/// empty file + no environment overrides still produces a usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_generations")]
    pub max_generations: u32,
    #[serde(default = "default_rounds_per_gen")]
    pub rounds_per_gen: u32,
    pub pairs_per_round: Option<u32>,
    #[serde(default = "default_initial_proposals")]
    pub initial_proposals: u32,
    #[serde(default = "default_top_m_evolve")]
    pub top_m_evolve: u32,
    #[serde(default = "default_k_factor")]
    pub k_factor: f64,
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,

    pub worker_endpoint: Option<String>,
    pub worker_model: Option<String>,
    pub search_endpoint: Option<String>,
    #[serde(default)]
    pub worker_api_key: Option<Secret<String>>,

    #[serde(default = "default_trace_dir")]
    pub trace_dir: String,
    pub db_dsn: Option<Secret<String>>,
    #[serde(default)]
    pub disable_tracing: bool,

    #[serde(default = "default_soft_timeout_secs")]
    pub soft_timeout_secs: u64,
    #[serde(default = "default_hard_timeout_secs")]
    pub hard_timeout_secs: u64,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_factor")]
    pub retry_factor: f64,
    #[serde(default = "default_retry_cap_secs")]
    pub retry_cap_secs: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_convergence_epsilon")]
    pub convergence_epsilon: f64,
    #[serde(default = "default_inconclusive_warn_threshold")]
    pub inconclusive_warn_threshold: f64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    pub otel_endpoint: Option<String>,
    #[serde(default)]
    pub enable_otel: bool,
}

/// Source order: optional file, then `OPENAI_AGENTS_`-prefixed environment
/// variables, matching the three-tier precedence this workspace's other
/// services already establish (file < env < CLI, with CLI applied by the
/// caller after `load`).
impl EngineConfig {
    pub fn load(file_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("max_generations", default_max_generations() as i64)?
            .set_default("rounds_per_gen", default_rounds_per_gen() as i64)?
            .set_default("initial_proposals", default_initial_proposals() as i64)?
            .set_default("top_m_evolve", default_top_m_evolve() as i64)?
            .set_default("k_factor", default_k_factor())?
            .set_default("max_inflight", default_max_inflight() as i64)?
            .set_default("trace_dir", default_trace_dir())?
            .set_default("disable_tracing", false)?
            .set_default("soft_timeout_secs", default_soft_timeout_secs() as i64)?
            .set_default("hard_timeout_secs", default_hard_timeout_secs() as i64)?
            .set_default("retry_base_delay_ms", default_retry_base_delay_ms() as i64)?
            .set_default("retry_factor", default_retry_factor())?
            .set_default("retry_cap_secs", default_retry_cap_secs() as i64)?
            .set_default("retry_max_attempts", default_retry_max_attempts() as i64)?
            .set_default("convergence_epsilon", default_convergence_epsilon())?
            .set_default(
                "inconclusive_warn_threshold",
                default_inconclusive_warn_threshold(),
            )?
            .set_default("log_level", default_log_level())?
            .set_default("json_logs", false)?
            .set_default("enable_otel", false)?;

        if let Some(path) = file_path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("OPENAI_AGENTS")
                .separator("_")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn with_max_generations(mut self, n: u32) -> Self {
        self.max_generations = n;
        self
    }

    pub fn with_worker_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.worker_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_trace_dir(mut self, dir: impl Into<String>) -> Self {
        self.trace_dir = dir.into();
        self
    }

    pub fn with_disable_tracing(mut self, disable: bool) -> Self {
        self.disable_tracing = disable;
        self
    }

    /// Pairs-per-round, auto-sized to the active proposal count when the
    /// operator leaves it unset (§6: "default auto-sized").
    pub fn pairs_per_round_for(&self, active_proposals: usize) -> u32 {
        self.pairs_per_round.unwrap_or_else(|| {
            let auto = active_proposals.saturating_sub(1).clamp(3, 5);
            auto as u32
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::load(None).expect("default config must build from defaults alone")
    }
}

fn default_max_generations() -> u32 {
    3
}
fn default_rounds_per_gen() -> u32 {
    5
}
fn default_initial_proposals() -> u32 {
    3
}
fn default_top_m_evolve() -> u32 {
    2
}
fn default_k_factor() -> f64 {
    32.0
}
fn default_max_inflight() -> usize {
    4
}
fn default_trace_dir() -> String {
    "traces".to_string()
}
fn default_soft_timeout_secs() -> u64 {
    60
}
fn default_hard_timeout_secs() -> u64 {
    120
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_retry_factor() -> f64 {
    2.0
}
fn default_retry_cap_secs() -> u64 {
    30
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_convergence_epsilon() -> f64 {
    20.0
}
fn default_inconclusive_warn_threshold() -> f64 {
    0.2
}
fn default_log_level() -> String {
    "info".to_string()
}
