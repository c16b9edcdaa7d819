pub mod db_pool;
pub mod db_sink;
pub mod file_sink;
pub mod migrations;
pub mod store;

pub use db_pool::{create_pool, check_pool_health, PgPoolConfig};
pub use migrations::run_migrations;
pub use store::{SharedTraceStore, SpanCloseFields, TraceStore};
