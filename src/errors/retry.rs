use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::classification::ErrorClassification;
use super::types::DastError;
use tracing::{debug, warn};

impl ErrorClassification {
    /// Calculate the retry delay for this error classification based on the
    /// current attempt number (0-indexed).
    ///
    /// - TimeoutError: 5s + (attempt * 5s), capped at 30s
    /// - Default: exponential backoff 2^attempt + random jitter (0-1s), capped at 30s
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        match self.error_type {
            "TimeoutError" => {
                let secs = 5 + (attempt as u64 * 5);
                Duration::from_secs(secs.min(30))
            }
            _ => {
                let base: f64 = 2.0_f64.powi(attempt as i32);
                let jitter: f64 = rand::random::<f64>();
                let secs = (base + jitter).min(30.0);
                Duration::from_secs_f64(secs)
            }
        }
    }
}

/// Retry configuration for one-shot engine requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Execute an async operation with retry logic.
///
/// Retries only if the error is classified as retryable and we haven't
/// exceeded max_retries.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut factory: F,
) -> Result<T, DastError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DastError>>,
{
    let max_attempts = config.max_retries + 1;
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable || attempt + 1 >= max_attempts {
                    if !classification.retryable {
                        warn!(
                            operation = operation_name,
                            error_type = classification.error_type,
                            "Non-retryable error, failing immediately"
                        );
                    } else {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = max_attempts,
                            "Max retries exhausted"
                        );
                    }
                    return Err(e);
                }

                let delay = classification.retry_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Retrying after error"
                );

                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DastError::Internal("Retry loop exited unexpectedly".into())))
}

/// Bounds for a poll loop. Every loop has at least one of `deadline` or
/// `max_attempts`, otherwise it would never give up.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Option<Duration>,
    pub max_attempts: Option<u32>,
    /// Consecutive retryable failures tolerated before the loop gives up.
    pub max_transient_errors: u32,
}

impl PollPolicy {
    pub fn with_deadline(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval,
            deadline: Some(deadline),
            max_attempts: None,
            max_transient_errors: 3,
        }
    }

    pub fn with_attempts(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            deadline: None,
            max_attempts: Some(max_attempts),
            max_transient_errors: 3,
        }
    }
}

/// Result of a single status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep<T> {
    Done(T),
    Pending(Option<T>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    Deadline,
    AttemptsExhausted,
    TransientErrors,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready { value: T, polls: u32 },
    GaveUp { last: Option<T>, polls: u32, reason: GiveUpReason },
}

impl<T> PollOutcome<T> {
    pub fn polls(&self) -> u32 {
        match self {
            PollOutcome::Ready { polls, .. } | PollOutcome::GaveUp { polls, .. } => *polls,
        }
    }
}

/// Sleep-then-check loop shared by engine readiness and all scan phases.
///
/// Retryable check errors are absorbed until `max_transient_errors`
/// consecutive failures, after which the loop gives up without error.
/// Non-retryable errors and cancellation are returned as `Err`.
///
/// With a deadline, neither the sleep nor an in-flight check may run past
/// it: a check still pending at the deadline is dropped and the loop gives
/// up with [`GiveUpReason::Deadline`].
pub async fn poll_until<F, Fut, T>(
    operation_name: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<PollOutcome<T>, DastError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep<T>, DastError>>,
{
    let started = Instant::now();
    let expires_at = policy.deadline.map(|deadline| started + deadline);
    let mut polls: u32 = 0;
    let mut consecutive_errors: u32 = 0;
    let mut last: Option<T> = None;

    loop {
        let wake_at = match expires_at {
            Some(at) => (Instant::now() + policy.interval).min(at),
            None => Instant::now() + policy.interval,
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(DastError::Cancelled(format!("{} interrupted", operation_name)));
            }
            _ = tokio::time::sleep_until(wake_at) => {}
        }
        polls += 1;

        let step = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(DastError::Cancelled(format!("{} interrupted", operation_name)));
            }
            step = bounded(expires_at, check()) => step,
        };
        let Some(step) = step else {
            warn!(operation = operation_name, polls, "Poll request outlived the deadline; abandoning it");
            return Ok(PollOutcome::GaveUp { last, polls, reason: GiveUpReason::Deadline });
        };

        match step {
            Ok(PollStep::Done(value)) => {
                debug!(operation = operation_name, polls, "Poll complete");
                return Ok(PollOutcome::Ready { value, polls });
            }
            Ok(PollStep::Pending(progress)) => {
                consecutive_errors = 0;
                if progress.is_some() {
                    last = progress;
                }
            }
            Err(e) => {
                let classification = e.classify();
                if !classification.retryable {
                    return Err(e);
                }
                consecutive_errors += 1;
                warn!(
                    operation = operation_name,
                    consecutive_errors,
                    max = policy.max_transient_errors,
                    error = %e,
                    "Poll request failed"
                );
                if consecutive_errors > policy.max_transient_errors {
                    return Ok(PollOutcome::GaveUp {
                        last,
                        polls,
                        reason: GiveUpReason::TransientErrors,
                    });
                }
            }
        }

        if let Some(at) = expires_at {
            if Instant::now() >= at {
                return Ok(PollOutcome::GaveUp { last, polls, reason: GiveUpReason::Deadline });
            }
        }
        if let Some(max_attempts) = policy.max_attempts {
            if polls >= max_attempts {
                return Ok(PollOutcome::GaveUp {
                    last,
                    polls,
                    reason: GiveUpReason::AttemptsExhausted,
                });
            }
        }
    }
}

/// Await `fut`, or `None` once `expires_at` has passed. A future that is
/// already ready when the deadline hits still yields its value.
async fn bounded<Fut: Future>(expires_at: Option<Instant>, fut: Fut) -> Option<Fut::Output> {
    match expires_at {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_delay_timeout() {
        let class = ErrorClassification {
            error_type: "TimeoutError",
            retryable: true,
            kind: FailureKind::TransientPoll,
        };
        assert_eq!(class.retry_delay(0), Duration::from_secs(5));
        assert_eq!(class.retry_delay(1), Duration::from_secs(10));
        assert_eq!(class.retry_delay(9), Duration::from_secs(30)); // capped
    }

    #[test]
    fn test_retry_delay_default_exponential() {
        let class = ErrorClassification {
            error_type: "NetworkError",
            retryable: true,
            kind: FailureKind::TransientPoll,
        };
        let d0 = class.retry_delay(0);
        let d1 = class.retry_delay(1);
        assert!(d0.as_secs_f64() >= 1.0 && d0.as_secs_f64() < 3.0);
        assert!(d1.as_secs_f64() >= 2.0 && d1.as_secs_f64() < 4.0);
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let config = RetryConfig::default();
        let result = with_retry("test", &config, || async { Ok::<_, DastError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let config = RetryConfig { max_retries: 3 };

        let result = with_retry("test", &config, || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(DastError::Engine("rejected".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_from_network_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let config = RetryConfig { max_retries: 3 };

        let result = with_retry("test", &config, || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DastError::Network("reset".into()))
                } else {
                    Ok("report")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "report");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let policy = PollPolicy::with_deadline(Duration::from_secs(5), Duration::from_secs(60));

        let outcome = poll_until("test", &policy, &CancellationToken::new(), || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 3 {
                    Ok(PollStep::Done(100u8))
                } else {
                    Ok(PollStep::Pending(Some((n * 30) as u8)))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Ready { value: 100, polls: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_deadline_counts_polls() {
        let policy = PollPolicy::with_deadline(Duration::from_secs(5), Duration::from_secs(30));
        let started = Instant::now();

        let outcome = poll_until("test", &policy, &CancellationToken::new(), || async {
            Ok(PollStep::Pending(Some(50u8)))
        })
        .await
        .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::GaveUp { last: Some(50), polls: 6, reason: GiveUpReason::Deadline }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_abandons_slow_check_at_deadline() {
        let policy = PollPolicy::with_deadline(Duration::from_secs(5), Duration::from_secs(30));
        let started = Instant::now();

        let outcome = poll_until("test", &policy, &CancellationToken::new(), || async {
            tokio::time::sleep(Duration::from_secs(50)).await;
            Ok(PollStep::Pending(Some(50u8)))
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::GaveUp { last: None, polls: 1, reason: GiveUpReason::Deadline });
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_last_sleep_stops_at_deadline() {
        let policy = PollPolicy::with_deadline(Duration::from_secs(7), Duration::from_secs(30));
        let started = Instant::now();

        let outcome = poll_until("test", &policy, &CancellationToken::new(), || async {
            Ok(PollStep::Pending(Some(10u8)))
        })
        .await
        .unwrap();

        assert_eq!(outcome.polls(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_attempt_cap() {
        let policy = PollPolicy::with_attempts(Duration::from_secs(2), 30);
        let outcome: PollOutcome<String> = poll_until(
            "readiness",
            &policy,
            &CancellationToken::new(),
            || async { Ok(PollStep::Pending(None)) },
        )
        .await
        .unwrap();

        assert_eq!(outcome.polls(), 30);
        assert!(matches!(
            outcome,
            PollOutcome::GaveUp { reason: GiveUpReason::AttemptsExhausted, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_transient_errors_give_up_after_three_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let policy = PollPolicy::with_deadline(Duration::from_secs(10), Duration::from_secs(3600));

        let outcome: PollOutcome<u8> = poll_until("test", &policy, &CancellationToken::new(), || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DastError::Network("connection reset".into()))
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(
            outcome,
            PollOutcome::GaveUp { reason: GiveUpReason::TransientErrors, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_transient_error_counter_resets() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let policy = PollPolicy::with_deadline(Duration::from_secs(1), Duration::from_secs(3600));

        let outcome = poll_until("test", &policy, &CancellationToken::new(), || {
            let calls = calls_clone.clone();
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0..=2 => Err(DastError::Network("flaky".into())),
                    3 => Ok(PollStep::Pending(Some(10u8))),
                    4..=6 => Err(DastError::Network("flaky".into())),
                    _ => Ok(PollStep::Done(100u8)),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Ready { value: 100, polls: 8 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_fatal_error_propagates() {
        let policy = PollPolicy::with_deadline(Duration::from_secs(1), Duration::from_secs(60));
        let result: Result<PollOutcome<u8>, _> = poll_until(
            "test",
            &policy,
            &CancellationToken::new(),
            || async { Err(DastError::Engine("scan does not exist".into())) },
        )
        .await;
        assert!(matches!(result, Err(DastError::Engine(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let policy = PollPolicy::with_deadline(Duration::from_secs(1), Duration::from_secs(60));
        let result: Result<PollOutcome<u8>, _> = poll_until("test", &policy, &token, || async {
            Ok(PollStep::Pending(None))
        })
        .await;
        assert!(matches!(result, Err(DastError::Cancelled(_))));
    }
}
