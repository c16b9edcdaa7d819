use anyhow::{Context, Result};
use opentelemetry::{global, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{self, RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::cli::Args;

/// Guards that must be kept alive for the duration of the program.
pub struct TelemetryGuards {
    _tracer_provider: Option<TracerProvider>,
}

/// Sets up the global `tracing` subscriber: an `EnvFilter`, JSON or pretty
/// formatting depending on `args.json_logs`, and an optional OpenTelemetry
/// export layer when `args.enable_otel` is set.
pub fn init_telemetry(args: &Args) -> Result<TelemetryGuards> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("failed to build log filter")?;

    let subscriber = Registry::default().with(env_filter);

    let subscriber = if args.json_logs {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .boxed()
    } else {
        subscriber
            .with(fmt::layer().pretty().with_target(true).with_line_number(true).with_file(true))
            .boxed()
    };

    let tracer_provider = if args.enable_otel { Some(init_opentelemetry(args)?) } else { None };

    if let Some(ref provider) = tracer_provider {
        let tracer = provider.tracer("pe-orchestrator");
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        subscriber.with(telemetry_layer).init();
    } else {
        subscriber.init();
    }

    Ok(TelemetryGuards {
        _tracer_provider: tracer_provider,
    })
}

fn init_opentelemetry(args: &Args) -> Result<TracerProvider> {
    let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(&args.otel_endpoint);

    let tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            trace::config()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    opentelemetry::KeyValue::new("service.name", "pe-orchestrator"),
                    opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .install_batch(runtime::Tokio)
        .context("failed to install OpenTelemetry tracer")?;

    global::set_tracer_provider(tracer_provider.clone());

    Ok(tracer_provider)
}

impl Drop for TelemetryGuards {
    fn drop(&mut self) {
        if self._tracer_provider.is_some() {
            global::shutdown_tracer_provider();
        }
    }
}

pub fn get_log_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
