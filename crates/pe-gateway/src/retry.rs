use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(30);
const BACKOFF_FACTOR: u32 = 2;

/// Whether a failure is worth retrying at all. Malformed/Fatal failures are
/// passed straight back out on the first attempt.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

/// Runs `f`, retrying up to `max_attempts` times total (i.e. at most
/// `max_attempts - 1` retries) with exponential backoff between attempts:
/// 0.5s, 1s, 2s, ... capped at 30s. Stops early the moment an error reports
/// `is_retriable() == false`.
pub async fn with_retry<F, Fut, T, E>(max_attempts: u32, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retriable,
{
    assert!(max_attempts >= 1, "max_attempts must be at least 1");

    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !err.is_retriable() {
                    return Err(err);
                }
                let delay = backoff_delay(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let scale = BACKOFF_FACTOR.saturating_pow(attempt.saturating_sub(1));
    let delay = BASE_DELAY.saturating_mul(scale);
    delay.min(MAX_DELAY)
}
