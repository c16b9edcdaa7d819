use std::path::{Path, PathBuf};

use pe_core::{EngineError, EngineResult, Span, Trace};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// One line of the NDJSON trace file. The first line written for a trace is
/// always a `Header`; every subsequent line is a `SpanRecord` (spec §6:
/// "newline-delimited JSON, one record per span, preceded by a single trace
/// header record").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
enum Record {
    Header { trace: Trace },
    SpanRecord { span: Span },
}

pub fn trace_file_path(trace_dir: &Path, trace_id: Uuid) -> PathBuf {
    trace_dir.join(format!("{trace_id}.ndjson"))
}

pub async fn write_header(trace_dir: &Path, trace: &Trace) -> EngineResult<()> {
    tokio::fs::create_dir_all(trace_dir)
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("creating trace dir: {e}")))?;

    let path = trace_file_path(trace_dir, trace.trace_id);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("opening {}: {e}", path.display())))?;

    let line = serde_json::to_string(&Record::Header { trace: trace.clone() })
        .map_err(|e| EngineError::TraceFileSink(format!("serializing header: {e}")))?;

    file.write_all(line.as_bytes())
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("writing header: {e}")))?;
    file.write_all(b"\n")
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("writing header newline: {e}")))?;

    Ok(())
}

pub async fn append_span(trace_dir: &Path, trace_id: Uuid, span: &Span) -> EngineResult<()> {
    let path = trace_file_path(trace_dir, trace_id);
    let mut file = OpenOptions::new()
        .append(true)
        .open(&path)
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("opening {}: {e}", path.display())))?;

    let line = serde_json::to_string(&Record::SpanRecord { span: span.clone() })
        .map_err(|e| EngineError::TraceFileSink(format!("serializing span: {e}")))?;

    file.write_all(line.as_bytes())
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("appending span: {e}")))?;
    file.write_all(b"\n")
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("appending span newline: {e}")))?;

    Ok(())
}

/// Reloads a trace file from disk, reconstructing the `Trace` header and
/// every span record written so far. Used both for the restart-tolerance
/// guarantee (§4.3) and for round-trip verification (§8).
pub async fn read_trace_file(trace_dir: &Path, trace_id: Uuid) -> EngineResult<Option<(Trace, Vec<Span>)>> {
    let path = trace_file_path(trace_dir, trace_id);
    if !path.exists() {
        return Ok(None);
    }

    let mut contents = String::new();
    OpenOptions::new()
        .read(true)
        .open(&path)
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("opening {}: {e}", path.display())))?
        .read_to_string(&mut contents)
        .await
        .map_err(|e| EngineError::TraceFileSink(format!("reading {}: {e}", path.display())))?;

    let mut trace = None;
    let mut spans = Vec::new();

    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let record: Record = serde_json::from_str(line)
            .map_err(|e| EngineError::TraceFileSink(format!("parsing trace file line: {e}")))?;
        match record {
            Record::Header { trace: t } => trace = Some(t),
            Record::SpanRecord { span } => spans.push(span),
        }
    }

    match trace {
        Some(trace) => Ok(Some((trace, spans))),
        None => Err(EngineError::TraceFileSink(format!(
            "trace file {} has no header record",
            path.display()
        ))),
    }
}
