use std::time::Duration;

use {
    switchyard_protocol::{DEFAULT_MAX_REDELIVERIES, Task},
    tracing::warn,
};

use crate::{client::QueueClient, error::PublishError};

/// Redelivery ceiling applied when a delivery is rejected or abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_redeliveries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    Requeue { attempt: u32 },
    DeadLetter,
}

impl RetryPolicy {
    /// A zero ceiling is raised to one.
    #[must_use]
    pub fn new(max_redeliveries: u32) -> Self {
        Self {
            max_redeliveries: max_redeliveries.max(1),
        }
    }

    /// Fate of a failed delivery that was on its `attempt`-th redelivery.
    #[must_use]
    pub fn on_failure(&self, attempt: u32) -> RetryVerdict {
        let next = attempt.saturating_add(1);
        if next > self.max_redeliveries {
            RetryVerdict::DeadLetter
        } else {
            RetryVerdict::Requeue { attempt: next }
        }
    }
}

/// Exponential publish backoff: `base * 2^n`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(10),
            retries: 5,
        }
    }
}

impl Backoff {
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Publish, retrying `Unreachable` failures with exponential backoff.
/// `Invalid` is returned immediately.
pub async fn publish_with_backoff<C>(
    client: &C,
    queue: &str,
    task: &Task,
    backoff: &Backoff,
) -> Result<(), PublishError>
where
    C: QueueClient + ?Sized,
{
    let mut retry = 0;
    loop {
        match client.publish(queue, task).await {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_retryable() || retry >= backoff.retries => return Err(e),
            Err(e) => {
                let delay = backoff.delay(retry);
                warn!(
                    task_id = %task.id(),
                    queue,
                    retry = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "publish failed, backing off"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(0, RetryVerdict::Requeue { attempt: 1 })]
    #[case(4, RetryVerdict::Requeue { attempt: 5 })]
    #[case(5, RetryVerdict::DeadLetter)]
    #[case(u32::MAX, RetryVerdict::DeadLetter)]
    fn default_ceiling(#[case] attempt: u32, #[case] expected: RetryVerdict) {
        assert_eq!(RetryPolicy::default().on_failure(attempt), expected);
    }

    #[test]
    fn zero_ceiling_is_raised() {
        assert_eq!(RetryPolicy::new(0).max_redeliveries, 1);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
            retries: 10,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }
}
