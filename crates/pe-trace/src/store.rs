use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use pe_core::{EngineError, EngineResult, PolicyType, Span, SpanType, Trace, TokenUsage};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::{db_sink, file_sink};

/// Fields a caller supplies when closing a span. Everything is optional —
/// a warning span, for instance, closes with no model/token data at all.
#[derive(Debug, Clone, Default)]
pub struct SpanCloseFields {
    pub output_text: Option<String>,
    pub model: Option<String>,
    pub tokens_used: Option<TokenUsage>,
}

struct TraceState {
    trace: Trace,
    spans: HashMap<Uuid, Span>,
    /// Currently-open spans, oldest first — the LIFO stack `close_span`
    /// enforces against (spec §5: "Spans are closed in LIFO order per
    /// trace").
    open_stack: Vec<Uuid>,
}

/// Trace Store (C3): append-only hierarchical span recorder. Owns every
/// `Span`/`Trace` produced during a run; every other component refers to a
/// span only by the ID it gets back from `open_span`.
pub struct TraceStore {
    trace_dir: PathBuf,
    db_pool: Option<PgPool>,
    traces: RwLock<HashMap<Uuid, TraceState>>,
    /// span_id -> trace_id, so `close_span` can take just a span_id as the
    /// spec's operation signature does (§4.3).
    span_index: RwLock<HashMap<Uuid, Uuid>>,
}

impl TraceStore {
    pub fn new(trace_dir: impl Into<PathBuf>, db_pool: Option<PgPool>) -> Self {
        Self {
            trace_dir: trace_dir.into(),
            db_pool,
            traces: RwLock::new(HashMap::new()),
            span_index: RwLock::new(HashMap::new()),
        }
    }

    pub async fn start_trace(&self, policy_query: impl Into<String>, policy_type: PolicyType) -> EngineResult<Uuid> {
        let trace = Trace::new(policy_query, policy_type, Utc::now());
        let trace_id = trace.trace_id;

        file_sink::write_header(&self.trace_dir, &trace).await?;
        if let Some(pool) = &self.db_pool {
            db_sink::best_effort("upsert_trace", || db_sink::upsert_trace(pool, &trace)).await;
        }

        self.traces.write().await.insert(
            trace_id,
            TraceState {
                trace,
                spans: HashMap::new(),
                open_stack: Vec::new(),
            },
        );

        Ok(trace_id)
    }

    /// Resumes a trace after a process restart, reloading its NDJSON file if
    /// one exists with this `trace_id` (spec §4.3). Spans that were still
    /// open when the file was last written are rejoined to the open stack,
    /// oldest first, so later `close_span` calls keep enforcing LIFO order.
    /// Returns `Ok(false)` when no file matches — the caller should fall
    /// back to `start_trace` for a fresh one instead.
    pub async fn resume_trace(&self, trace_id: Uuid) -> EngineResult<bool> {
        if self.traces.read().await.contains_key(&trace_id) {
            return Ok(true);
        }

        let Some((trace, records)) = file_sink::read_trace_file(&self.trace_dir, trace_id).await? else {
            return Ok(false);
        };

        // Each span is appended once on open and again on close; a span_id
        // with two records keeps only the later (closed) one.
        let mut spans: HashMap<Uuid, Span> = HashMap::new();
        for span in records {
            spans.insert(span.span_id, span);
        }

        let mut open_stack: Vec<Uuid> = spans.values().filter(|s| s.is_open()).map(|s| s.span_id).collect();
        open_stack.sort_by_key(|id| spans.get(id).map(|s| s.started_at));

        {
            let mut span_index = self.span_index.write().await;
            for span_id in spans.keys() {
                span_index.insert(*span_id, trace_id);
            }
        }

        self.traces.write().await.insert(trace_id, TraceState { trace, spans, open_stack });

        Ok(true)
    }

    pub async fn open_span(
        &self,
        trace_id: Uuid,
        parent_span_id: Option<Uuid>,
        span_type: SpanType,
        agent_name: impl Into<String>,
    ) -> EngineResult<Uuid> {
        let mut traces = self.traces.write().await;
        let state = traces
            .get_mut(&trace_id)
            .ok_or_else(|| EngineError::SpanParentInvalid(format!("no such trace: {trace_id}")))?;

        if let Some(parent_id) = parent_span_id {
            let parent_open = state
                .spans
                .get(&parent_id)
                .map(|s| s.is_open())
                .unwrap_or(false);
            if !parent_open {
                return Err(EngineError::SpanParentInvalid(format!(
                    "parent span {parent_id} is not open on trace {trace_id}"
                )));
            }
        }

        let span = Span::open(trace_id, parent_span_id, span_type, agent_name, Utc::now());
        let span_id = span.span_id;
        let span_for_file = span.clone();
        state.open_stack.push(span_id);
        state.spans.insert(span_id, span);
        state.trace.agent_count += 1;
        drop(traces);

        self.span_index.write().await.insert(span_id, trace_id);
        // Recorded while still open, not just on close, so a restart can
        // reload an in-flight span instead of losing it entirely (§4.3).
        // `close_span` appends the same span_id again once it finishes; the
        // later record wins on reload.
        file_sink::append_span(&self.trace_dir, trace_id, &span_for_file).await?;

        Ok(span_id)
    }

    /// Closes a span by ID alone — the store resolves which trace it
    /// belongs to (spec §4.3: `close_span(span_id, output_fields)`).
    pub async fn close_span(&self, span_id: Uuid, fields: SpanCloseFields) -> EngineResult<()> {
        let trace_id = *self
            .span_index
            .read()
            .await
            .get(&span_id)
            .ok_or_else(|| EngineError::SpanNotOpen(format!("unknown span: {span_id}")))?;

        let mut traces = self.traces.write().await;
        let state = traces
            .get_mut(&trace_id)
            .ok_or_else(|| EngineError::SpanNotOpen(format!("no such trace: {trace_id}")))?;

        self.close_span_in_state(state, span_id, fields, false).await
    }

    async fn close_span_in_state(
        &self,
        state: &mut TraceState,
        span_id: Uuid,
        fields: SpanCloseFields,
        forced: bool,
    ) -> EngineResult<()> {
        {
            let span = state
                .spans
                .get(&span_id)
                .ok_or_else(|| EngineError::SpanNotOpen(format!("unknown span: {span_id}")))?;
            if !span.is_open() {
                return Err(EngineError::SpanNotOpen(format!("span {span_id} is already closed")));
            }
        }

        if !forced {
            match state.open_stack.last() {
                Some(top) if *top == span_id => {}
                _ => {
                    return Err(EngineError::SpanCloseOrder(format!(
                        "span {span_id} is not the most recently opened span on this trace"
                    )))
                }
            }
        }

        state.open_stack.retain(|id| *id != span_id);

        let span = state.spans.get_mut(&span_id).expect("checked above");
        span.close(fields.output_text, fields.model, fields.tokens_used, Utc::now(), forced);

        file_sink::append_span(&self.trace_dir, span.trace_id, span).await?;
        if let Some(pool) = &self.db_pool {
            let span_clone = span.clone();
            db_sink::best_effort("upsert_span", || db_sink::upsert_span(pool, &span_clone)).await;
        }

        Ok(())
    }

    /// Attaches a metadata key/value to a span, whether still open or
    /// already closed (e.g. the Generator's `localization_deficit` flag,
    /// spec §4.6). Re-appends the span record so the file sink reflects the
    /// latest state.
    pub async fn set_span_metadata(&self, span_id: Uuid, key: impl Into<String>, value: serde_json::Value) -> EngineResult<()> {
        let trace_id = *self
            .span_index
            .read()
            .await
            .get(&span_id)
            .ok_or_else(|| EngineError::SpanNotOpen(format!("unknown span: {span_id}")))?;

        let mut traces = self.traces.write().await;
        let state = traces
            .get_mut(&trace_id)
            .ok_or_else(|| EngineError::SpanNotOpen(format!("no such trace: {trace_id}")))?;
        let span = state
            .spans
            .get_mut(&span_id)
            .ok_or_else(|| EngineError::SpanNotOpen(format!("unknown span: {span_id}")))?;
        span.set_metadata(key, value);

        file_sink::append_span(&self.trace_dir, span.trace_id, span).await?;
        if let Some(pool) = &self.db_pool {
            let span_clone = span.clone();
            db_sink::best_effort("upsert_span_metadata", || db_sink::upsert_span(pool, &span_clone)).await;
        }

        Ok(())
    }

    /// Ends a trace. Any spans still open are force-closed with
    /// `forced=true` and a warning is logged for each (spec §4.3).
    pub async fn end_trace(&self, trace_id: Uuid) -> EngineResult<()> {
        let mut traces = self.traces.write().await;
        let state = traces
            .get_mut(&trace_id)
            .ok_or_else(|| EngineError::SpanNotOpen(format!("no such trace: {trace_id}")))?;

        let still_open: Vec<Uuid> = state.open_stack.clone();
        for span_id in still_open.into_iter().rev() {
            warn!(%trace_id, %span_id, "force-closing span still open at end_trace");
            self.close_span_in_state(state, span_id, SpanCloseFields::default(), true)
                .await?;
        }

        state.trace.total_duration_ms = Some((Utc::now() - state.trace.created_at).num_milliseconds().max(0));

        file_sink::write_header(&self.trace_dir, &state.trace).await?;
        if let Some(pool) = &self.db_pool {
            db_sink::best_effort("upsert_trace_final", || db_sink::upsert_trace(pool, &state.trace)).await;
        }

        traces.remove(&trace_id);
        Ok(())
    }
}

pub type SharedTraceStore = Arc<TraceStore>;
