use crate::error::{FailureClass, Result, ScriptError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Fire-and-forget progress notification.
pub type OnProgress<'a> = &'a (dyn Fn(&str) + Sync);

/// Bounded retry for a single batch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause after a rate-limited or overloaded failure.
    pub rate_limit_backoff: Duration,
    /// Pause after any other failure.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            rate_limit_backoff: Duration::from_secs(5),
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn pause_for(&self, class: FailureClass) -> Duration {
        match class {
            FailureClass::RateLimited => self.rate_limit_backoff,
            FailureClass::Other => self.backoff,
        }
    }
}

/// Runs `op` until it succeeds or the policy runs out of attempts.
///
/// Rate-limited failures report one progress message per retry. Invalid
/// input is returned immediately. Once every attempt has failed, the last
/// error comes back wrapped in [`ScriptError::BatchExhausted`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    on_progress: OnProgress<'_>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e @ ScriptError::InvalidInput(_)) => return Err(e),
            Err(e) => e,
        };

        warn!("Batch failed (attempt {}/{}): {}", attempt, max_attempts, err);
        if attempt >= max_attempts {
            return Err(ScriptError::BatchExhausted {
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let class = err.failure_class();
        let pause = policy.pause_for(class);
        if class == FailureClass::RateLimited {
            let message = format!(
                "Server busy, retrying in {}s (attempt {}/{})...",
                pause.as_secs_f64(),
                attempt,
                max_attempts
            );
            debug!("{}", message);
            on_progress(&message);
        }
        tokio::time::sleep(pause).await;
    }
}
