use std::future::Future;
use std::time::Duration;

use super::core::StageOutcome;
use crate::config::{PipelineErrorHandling, StageErrorHandling};

/// Retry parameters for one stage
///
/// Stage-level values override the pipeline defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub exponential_backoff: bool,
}

impl RetryPolicy {
    pub fn resolve(pipeline: &PipelineErrorHandling, stage: Option<&StageErrorHandling>) -> Self {
        Self {
            max_retries: stage
                .and_then(|s| s.max_retries)
                .unwrap_or(pipeline.max_retries),
            retry_delay: Duration::from_millis(
                stage
                    .and_then(|s| s.retry_delay)
                    .unwrap_or(pipeline.retry_delay),
            ),
            exponential_backoff: stage
                .and_then(|s| s.use_exponential_backoff)
                .unwrap_or(true),
        }
    }

    /// Wait before retry `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return self.retry_delay;
        }
        let factor = 2u32.saturating_pow(attempt.max(1) - 1);
        self.retry_delay.saturating_mul(factor)
    }
}

/// How a retry sequence ended
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    /// Last outcome; `Failed` when every attempt failed
    pub outcome: StageOutcome,
    pub attempts: u32,
}

impl RetryOutcome {
    pub fn recovered(&self) -> bool {
        !self.outcome.is_failed()
    }
}

/// Re-run a failed stage until it stops failing or the policy is exhausted
///
/// `attempt` is called with the 1-indexed retry number after the backoff
/// delay for that retry has elapsed. Only the calling task sleeps.
pub async fn run_with_retry<F, Fut>(
    policy: &RetryPolicy,
    initial: StageOutcome,
    mut attempt: F,
) -> RetryOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StageOutcome>,
{
    let mut outcome = initial;
    let mut attempts = 0;

    while outcome.is_failed() && attempts < policy.max_retries {
        attempts += 1;
        tokio::time::sleep(policy.delay_for_attempt(attempts)).await;
        outcome = attempt(attempts).await;
    }

    RetryOutcome { outcome, attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntegrationErrorKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32, delay_ms: u64, exponential: bool) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(delay_ms),
            exponential_backoff: exponential,
        }
    }

    fn failure() -> StageOutcome {
        StageOutcome::failed(IntegrationErrorKind::StageExecution, "flaky")
    }

    #[test]
    fn test_exponential_delays() {
        let p = policy(3, 1000, true);
        let delays: Vec<u128> = (1..=4).map(|k| p.delay_for_attempt(k).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000]);
    }

    #[test]
    fn test_constant_delays() {
        let p = policy(3, 1000, false);
        let delays: Vec<u128> = (1..=3).map(|k| p.delay_for_attempt(k).as_millis()).collect();
        assert_eq!(delays, vec![1000, 1000, 1000]);
    }

    #[test]
    fn test_delay_saturates() {
        let p = policy(100, 1000, true);
        assert_eq!(p.delay_for_attempt(80), p.delay_for_attempt(33));
    }

    #[test]
    fn test_resolution_precedence() {
        let pipeline = PipelineErrorHandling {
            max_retries: 5,
            retry_delay: 250,
            ..PipelineErrorHandling::default()
        };
        let p = RetryPolicy::resolve(&pipeline, None);
        assert_eq!(p, policy(5, 250, true));

        let stage = StageErrorHandling {
            max_retries: Some(1),
            use_exponential_backoff: Some(false),
            ..StageErrorHandling::default()
        };
        let p = RetryPolicy::resolve(&pipeline, Some(&stage));
        assert_eq!(p, policy(1, 250, false));

        let p = RetryPolicy::resolve(&PipelineErrorHandling::default(), None);
        assert_eq!(p, policy(3, 1000, true));
    }

    #[tokio::test]
    async fn test_recovers_on_second_retry() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&policy(3, 1, true), failure(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 2 {
                    failure()
                } else {
                    StageOutcome::Completed(json!("ok"))
                }
            }
        })
        .await;

        assert!(result.recovered());
        assert_eq!(result.attempts, 2);
        assert_eq!(result.outcome, StageOutcome::Completed(json!("ok")));
    }

    #[tokio::test]
    async fn test_exhausted() {
        let result = run_with_retry(&policy(2, 1, false), failure(), |_| async { failure() }).await;
        assert!(!result.recovered());
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_zero_retries_keeps_initial_failure() {
        let result = run_with_retry(&policy(0, 1, true), failure(), |_| async {
            StageOutcome::Completed(json!(1))
        })
        .await;
        assert_eq!(result.attempts, 0);
        assert_eq!(result.outcome, failure());
    }
}
