pub mod circuit_breaker;
pub mod retry;
pub mod search;
pub mod worker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError};
pub use retry::{with_retry, Retriable};
pub use search::{HttpSearchGateway, SearchGateway, SearchOutcome};
pub use worker::{HttpWorkerGateway, WorkerGateway, WorkerRequest, WorkerResponse, WorkerRole};
