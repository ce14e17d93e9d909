use super::client::GenerationError;
use std::{future::Future, time::Duration};

/// Retry wrapper for remote generation calls.
///
/// Only transient failures are retried; the backoff doubles after every
/// failed attempt (`initial_delay * 2^(attempt-1)`, no jitter), and the last
/// observed failure is surfaced once the attempt budget is spent.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let mut attempt = 1u32;
        loop {
            tracing::debug!(attempt, "generation attempt");
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.initial_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, will retry: {error}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::warn!(attempt, "giving up: {error}");
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };
    use tokio::time::Instant;

    fn transient() -> GenerationError {
        GenerationError::Transient("internal server error".into())
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_makes_three_attempts_with_doubling_delays() {
        let policy = RetryPolicy::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<(), _> = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert_eq!(result, Err(transient()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 1000ms after attempt 1 plus 2000ms after attempt 2.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_then_success_retries_once() {
        let policy = RetryPolicy::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(transient())
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let policy = RetryPolicy::default();
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(GenerationError::Permanent("policy refusal".into()))
                }
            })
            .await;

        assert_eq!(
            result,
            Err(GenerationError::Permanent("policy refusal".into()))
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
