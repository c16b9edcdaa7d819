use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::FutureExt;
use futures::stream::StreamExt;
use pe_core::{field, ComparisonRecord, EngineConfig, JurisdictionContext, Proposal, SpanType};
use pe_context::ContextAssembler;
use pe_evolver::Evolver;
use pe_gateway::{HttpSearchGateway, HttpWorkerGateway, SearchGateway, WorkerGateway};
use pe_generator::Generator;
use pe_repository::ProposalRepository;
use pe_tournament::{RoundState, TournamentScheduler};
use pe_trace::{PgPoolConfig, SharedTraceStore, TraceStore};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::json;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::Args;

/// What the engine hands the external report renderer once a run ends
/// (spec §6: "the engine emits a structured object ... the external
/// renderer owns formatting").
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub trace_id: Uuid,
    pub top_proposals: Vec<Proposal>,
    pub rankings: Vec<Proposal>,
    pub comparison_records: Vec<ComparisonRecord>,
    pub context_bundle_id: Uuid,
    pub localization_deficit_flag: bool,
    pub converged: bool,
}

/// Wires every internal component for one run and drives the generation
/// loop end to end.
pub struct Orchestrator {
    args: Args,
    config: EngineConfig,
    trace: SharedTraceStore,
    repository: ProposalRepository,
    context: Arc<ContextAssembler>,
    generator: Generator,
    scheduler: TournamentScheduler,
    evolver: Evolver,
}

impl Orchestrator {
    /// Validates CLI args, loads configuration, and constructs every
    /// component the run needs. No Worker/Search calls happen here.
    pub async fn build(args: Args) -> Result<Self> {
        args.validate().context("invalid command line arguments")?;

        let mut config = EngineConfig::load(args.config.as_deref()).context("failed to load configuration")?;

        if let Some(max_generations) = args.max_generations {
            config = config.with_max_generations(max_generations);
        }
        if let Some(endpoint) = &args.worker_endpoint {
            config = config.with_worker_endpoint(endpoint.clone());
        }
        if let Some(dir) = &args.trace_dir {
            config = config.with_trace_dir(dir.clone());
        }
        if let Some(endpoint) = &args.search_endpoint {
            config.search_endpoint = Some(endpoint.clone());
        }

        let worker_endpoint = config
            .worker_endpoint
            .clone()
            .context("worker_endpoint must be set (config file, OPENAI_AGENTS_WORKER_ENDPOINT, or --worker-endpoint)")?;
        let worker: Arc<dyn WorkerGateway> = Arc::new(HttpWorkerGateway::new(worker_endpoint));

        let search_endpoint = config
            .search_endpoint
            .clone()
            .context("search_endpoint must be set (config file, OPENAI_AGENTS_SEARCH_ENDPOINT, or --search-endpoint)")?;
        let search: Arc<dyn SearchGateway> = Arc::new(HttpSearchGateway::new(search_endpoint, None));

        let db_pool = match (&config.db_dsn, config.disable_tracing) {
            (_, true) => None,
            (Some(dsn), false) => {
                let pool_config = PgPoolConfig::new(dsn.expose_secret().clone());
                match pe_trace::create_pool(&pool_config).await {
                    Ok(pool) => Some(pool),
                    Err(err) => {
                        warn!(error = %err, "failed to connect relational sink, continuing with file sink only");
                        None
                    }
                }
            }
            (None, false) => None,
        };
        let trace: SharedTraceStore = Arc::new(TraceStore::new(config.trace_dir.clone(), db_pool));

        let repository = ProposalRepository::new();
        let context = Arc::new(ContextAssembler::new(search, trace.clone()));
        let generator = Generator::new(worker.clone(), repository.clone(), trace.clone(), context.clone());
        let scheduler = TournamentScheduler::with_max_inflight(
            worker.clone(),
            repository.clone(),
            trace.clone(),
            config.max_inflight,
        );
        let evolver = Evolver::new(worker, repository.clone(), trace.clone());

        Ok(Self {
            args,
            config,
            trace,
            repository,
            context,
            generator,
            scheduler,
            evolver,
        })
    }

    /// Runs the engine to completion, or until SIGINT/SIGTERM is received.
    pub async fn run(self) -> Result<RunReport> {
        let mut signals = Signals::new(&[SIGTERM, SIGINT]).context("failed to install signal handlers")?;
        let signals_handle = signals.handle();

        let signal_task = tokio::spawn(async move {
            if let Some(signal) = signals.next().await {
                match signal {
                    SIGTERM => info!("received SIGTERM, finishing at the next suspension point"),
                    SIGINT => info!("received SIGINT (Ctrl-C), finishing at the next suspension point"),
                    _ => warn!(signal, "received unexpected signal"),
                }
            }
        });

        let report = tokio::select! {
            result = self.run_engine() => result?,
            _ = signal_task.fuse() => {
                anyhow::bail!("run cancelled by signal before completion");
            }
        };

        signals_handle.close();
        Ok(report)
    }

    async fn run_engine(&self) -> Result<RunReport> {
        let trace_id = self
            .trace
            .start_trace(self.args.query.clone(), self.args.policy_type.into())
            .await
            .context("failed to start trace")?;
        let root = self
            .trace
            .open_span(trace_id, None, SpanType::Root, "orchestrator")
            .await
            .context("failed to open root span")?;

        let mut jurisdiction = JurisdictionContext::new();
        if let Some(name) = &self.args.jurisdiction {
            jurisdiction.set(field::JURISDICTION, name.clone());
        }

        let bundle_id = self
            .context
            .assemble(trace_id, root, &self.args.query, jurisdiction, 10)
            .await
            .context("failed to assemble context bundle")?;

        let outcome = self
            .generator
            .generate(trace_id, root, bundle_id, self.config.initial_proposals as usize, Utc::now())
            .await
            .context("failed to generate initial proposals")?;

        let mut comparison_records = Vec::new();
        let mut consecutive_aborted_rounds = 0u32;
        let mut consecutive_converged_generations = 0u32;
        let mut run_index = 0u32;
        let mut converged = false;

        'generations: for generation in 0..self.config.max_generations {
            for _ in 0..self.config.rounds_per_gen {
                let active = self.repository.all_active().await;
                if active.len() < 2 {
                    break 'generations;
                }
                let ids: Vec<Uuid> = active.iter().map(|p| p.id).collect();
                let budget_pairs = self.config.pairs_per_round_for(active.len()) as usize;

                let round_outcome = self
                    .scheduler
                    .run_round(trace_id, root, run_index, &ids, budget_pairs, self.config.k_factor)
                    .await
                    .context("tournament round failed")?;
                run_index += 1;

                match round_outcome.state {
                    RoundState::Aborted => {
                        consecutive_aborted_rounds += 1;
                        if consecutive_aborted_rounds >= 2 {
                            warn!(generation, "two consecutive rounds aborted, ending run with current ranking");
                            comparison_records.extend(round_outcome.records);
                            break 'generations;
                        }
                    }
                    _ => consecutive_aborted_rounds = 0,
                }
                comparison_records.extend(round_outcome.records);
            }

            let top = self.repository.top(self.config.top_m_evolve as usize).await;
            if top.len() >= 2 {
                let gap = top.first().map(|p| p.elo).unwrap_or(0.0) - top.last().map(|p| p.elo).unwrap_or(0.0);
                if gap < self.config.convergence_epsilon {
                    consecutive_converged_generations += 1;
                } else {
                    consecutive_converged_generations = 0;
                }
                if consecutive_converged_generations >= 2 {
                    info!(generation, "Elo gap converged for two consecutive generations, stopping early");
                    converged = true;
                    break;
                }
            }

            if generation + 1 < self.config.max_generations {
                let top_ids: Vec<Uuid> = top.iter().map(|p| p.id).collect();
                self.evolver
                    .evolve(trace_id, root, &top_ids, Utc::now())
                    .await
                    .context("evolution step failed")?;
            }
        }

        let rankings = self.repository.top(usize::MAX).await;
        let top_proposals = rankings.iter().take(self.config.top_m_evolve as usize).cloned().collect();

        if outcome.localization_deficit {
            self.trace
                .set_span_metadata(
                    root,
                    "directive",
                    json!("mention the jurisdiction explicitly in the final report"),
                )
                .await
                .context("failed to record localization directive")?;
        }

        self.trace.close_span(
            root,
            pe_trace::SpanCloseFields {
                output_text: Some(format!("run produced {} proposals across {} rounds", rankings.len(), run_index)),
                model: None,
                tokens_used: None,
            },
        )
        .await
        .context("failed to close root span")?;
        self.trace.end_trace(trace_id).await.context("failed to end trace")?;

        Ok(RunReport {
            trace_id,
            top_proposals,
            rankings,
            comparison_records,
            context_bundle_id: bundle_id,
            localization_deficit_flag: outcome.localization_deficit,
            converged,
        })
    }
}
