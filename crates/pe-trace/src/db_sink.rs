use pe_core::{Span, Trace};
use sqlx::PgPool;
use tracing::warn;

/// Upserts the trace header into the relational sink. Best-effort: spec §4.3
/// says "writes to the relational sink are best-effort; failures are logged
/// but do not abort the run" — callers log the returned error and move on,
/// they never propagate it as a run failure.
pub async fn upsert_trace(pool: &PgPool, trace: &Trace) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO traces (trace_id, policy_query, policy_type, created_at, agent_count, total_duration_ms, external_trace_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (trace_id) DO UPDATE SET
            agent_count = EXCLUDED.agent_count,
            total_duration_ms = EXCLUDED.total_duration_ms,
            metadata = EXCLUDED.metadata
        "#,
    )
    .bind(trace.trace_id)
    .bind(&trace.policy_query)
    .bind(trace.policy_type.to_string())
    .bind(trace.created_at)
    .bind(trace.agent_count as i32)
    .bind(trace.total_duration_ms)
    .bind(&trace.external_trace_id)
    .bind(serde_json::to_value(&trace.metadata).unwrap_or_default())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn upsert_span(pool: &PgPool, span: &Span) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO spans (span_id, trace_id, parent_span_id, span_type, agent_name, started_at, ended_at, duration_ms, input_text, output_text, model, tokens_used, metadata, forced, dropped)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (span_id) DO UPDATE SET
            ended_at = EXCLUDED.ended_at,
            duration_ms = EXCLUDED.duration_ms,
            output_text = EXCLUDED.output_text,
            model = EXCLUDED.model,
            tokens_used = EXCLUDED.tokens_used,
            metadata = EXCLUDED.metadata,
            forced = EXCLUDED.forced,
            dropped = EXCLUDED.dropped
        "#,
    )
    .bind(span.span_id)
    .bind(span.trace_id)
    .bind(span.parent_span_id)
    .bind(span.span_type.to_string())
    .bind(&span.agent_name)
    .bind(span.started_at)
    .bind(span.ended_at)
    .bind(span.duration_ms)
    .bind(&span.input_text)
    .bind(&span.output_text)
    .bind(&span.model)
    .bind(span.tokens_used.map(|t| serde_json::to_value(t).unwrap_or_default()))
    .bind(serde_json::to_value(&span.metadata).unwrap_or_default())
    .bind(span.forced)
    .bind(span.dropped)
    .execute(pool)
    .await?;

    Ok(())
}

/// Runs `write` and demotes any failure to a warning log, per the
/// best-effort relational sink contract.
pub async fn best_effort<F, Fut>(operation: &str, write: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), sqlx::Error>>,
{
    if let Err(err) = write().await {
        warn!(operation, error = %err, "relational trace sink write failed, continuing with file sink only");
    }
}
