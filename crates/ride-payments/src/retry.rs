//! Retry policy for external processor calls (§4.3 "Resilient external
//! client"): exponential backoff with jitter, capped attempts, and a
//! retry/no-retry classification driven by the processor response.

use {rand::Rng, std::time::Duration};

#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Whether a failed attempt should be retried. Implemented by the caller's
/// error type so this module stays decoupled from any particular HTTP
/// client.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Runs `attempt` up to `config.max_attempts` times, backing off
/// exponentially (with full jitter) between tries. Stops retrying as soon as
/// an error reports itself as non-retryable.
pub async fn retry<T, E, F, Fut>(config: RetryConfig, mut attempt: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut backoff = config.initial_backoff;
    for attempt_number in 1..=config.max_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt_number == config.max_attempts || !err.is_retryable() => {
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(attempt_number, ?backoff, "retrying processor call after failure");
                let _ = err;
                let jittered_millis = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64);
                tokio::time::sleep(Duration::from_millis(jittered_millis)).await;
                backoff = (backoff * 2).min(config.max_backoff);
            }
        }
    }
    unreachable!("loop always returns within max_attempts iterations")
}

/// Classifies an HTTP status code per §4.3: retry on 408/429/503/5xx, never
/// on other 4xx.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 503) || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky {
        failures_left: std::cell::Cell<u32>,
    }

    #[derive(Debug)]
    struct FlakyError(bool);

    impl Retryable for FlakyError {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let flaky = Flaky { failures_left: std::cell::Cell::new(2) };
        let result = retry(
            RetryConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            || async {
                let left = flaky.failures_left.get();
                if left > 0 {
                    flaky.failures_left.set(left - 1);
                    Err(FlakyError(true))
                } else {
                    Ok(42)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let attempts = std::cell::Cell::new(0);
        let result: Result<(), FlakyError> = retry(RetryConfig::default(), || async {
            attempts.set(attempts.get() + 1);
            Err(FlakyError(false))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn status_classification_matches_the_allow_list() {
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(500));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(422));
    }
}
