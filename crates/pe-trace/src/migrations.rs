use pe_core::EngineError;
use sqlx::PgPool;
use tracing::{error, info};

type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i32,
    pub name: String,
    pub up_sql: String,
}

impl Migration {
    pub fn new(version: i32, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            up_sql: up_sql.into(),
        }
    }
}

/// Runs all pending migrations against the relational trace sink (spec
/// §4.3/§6: "two tables (traces, spans) that mirror §3"). Failures here are
/// surfaced to the caller, who demotes them to a degraded-sink warning
/// rather than aborting the run.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("running trace store migrations");

    create_migrations_table(pool).await?;

    let migrations = get_migrations();
    let applied_versions = get_applied_migrations(pool).await?;

    for migration in migrations {
        if !applied_versions.contains(&migration.version) {
            apply_migration(pool, &migration).await?;
        } else {
            info!(version = migration.version, "migration already applied");
        }
    }

    info!("trace store migrations complete");
    Ok(())
}

async fn create_migrations_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| EngineError::Fatal(format!("migrations table: {e}")))?;

    Ok(())
}

async fn get_applied_migrations(pool: &PgPool) -> Result<Vec<i32>> {
    let versions: Vec<(i32,)> = sqlx::query_as("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(|e| EngineError::Fatal(format!("reading applied migrations: {e}")))?;

    Ok(versions.into_iter().map(|(v,)| v).collect())
}

async fn apply_migration(pool: &PgPool, migration: &Migration) -> Result<()> {
    info!(version = migration.version, name = %migration.name, "applying migration");

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| EngineError::Fatal(format!("begin migration tx: {e}")))?;

    sqlx::query(&migration.up_sql).execute(&mut *tx).await.map_err(|e| {
        error!(version = migration.version, "migration failed: {}", e);
        EngineError::Fatal(format!("migration {}: {e}", migration.version))
    })?;

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES ($1, $2, NOW())")
        .bind(migration.version)
        .bind(&migration.name)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::Fatal(format!("recording migration {}: {e}", migration.version)))?;

    tx.commit()
        .await
        .map_err(|e| EngineError::Fatal(format!("commit migration {}: {e}", migration.version)))?;

    Ok(())
}

fn get_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "create_traces_table",
            r#"
            CREATE TABLE traces (
                trace_id UUID PRIMARY KEY,
                policy_query TEXT NOT NULL,
                policy_type TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                agent_count INTEGER NOT NULL DEFAULT 0,
                total_duration_ms BIGINT,
                external_trace_id TEXT,
                metadata JSONB NOT NULL DEFAULT '{}'
            );
            "#,
        ),
        Migration::new(
            2,
            "create_spans_table",
            r#"
            CREATE TABLE spans (
                span_id UUID PRIMARY KEY,
                trace_id UUID NOT NULL REFERENCES traces(trace_id) ON DELETE CASCADE,
                parent_span_id UUID REFERENCES spans(span_id),
                span_type TEXT NOT NULL,
                agent_name TEXT NOT NULL,
                started_at TIMESTAMP WITH TIME ZONE NOT NULL,
                ended_at TIMESTAMP WITH TIME ZONE,
                duration_ms BIGINT,
                input_text TEXT,
                output_text TEXT,
                model TEXT,
                tokens_used JSONB,
                metadata JSONB NOT NULL DEFAULT '{}',
                forced BOOLEAN NOT NULL DEFAULT FALSE,
                dropped BOOLEAN NOT NULL DEFAULT FALSE
            );
            CREATE INDEX idx_spans_trace_id ON spans(trace_id);
            CREATE INDEX idx_spans_agent_name ON spans(agent_name);
            CREATE INDEX idx_spans_span_type ON spans(span_type);
            "#,
        ),
    ]
}
