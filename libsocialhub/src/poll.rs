//! Bounded status polling
//!
//! Multi-step publishes (Instagram containers, YouTube video
//! processing) need to wait for remote processing before the final
//! publish call. [`StatusPoll`] is the one polling primitive: a bounded
//! attempt count, a mandatory inter-poll delay, and caller-supplied
//! cancellation via a deadline. There is no ambient polling anywhere
//! else; when the caller returns, polling stops.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::AdapterError;

/// One observation of remote processing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// Terminal: processing finished, carry the result forward.
    Ready(T),
    /// Terminal: the remote side reports a processing error.
    Failed(String),
    /// Terminal: the remote container lapsed before completing.
    Expired,
    /// Keep polling.
    Pending,
}

/// A bounded, cancellable poll loop.
#[derive(Debug, Clone, Copy)]
pub struct StatusPoll {
    interval: Duration,
    max_attempts: u32,
}

impl StatusPoll {
    /// `interval` is clamped to at least 10ms so a misconfigured poll
    /// can never busy-loop.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(10)),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll `check` until a terminal outcome, attempt exhaustion, or
    /// the deadline elapses.
    ///
    /// `check` receives the 1-based attempt number. Exhaustion and
    /// deadline both surface as [`AdapterError::Timeout`]; adapter
    /// errors from `check` propagate immediately.
    pub async fn run<T, F, Fut>(
        &self,
        deadline: Option<Duration>,
        check: F,
    ) -> Result<T, AdapterError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollOutcome<T>, AdapterError>>,
    {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, self.run_unbounded(check))
                .await
                .map_err(|_| {
                    AdapterError::Timeout(format!(
                        "status poll cancelled by {:?} deadline",
                        limit
                    ))
                })?,
            None => self.run_unbounded(check).await,
        }
    }

    async fn run_unbounded<T, F, Fut>(&self, mut check: F) -> Result<T, AdapterError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollOutcome<T>, AdapterError>>,
    {
        for attempt in 1..=self.max_attempts {
            match check(attempt).await? {
                PollOutcome::Ready(value) => return Ok(value),
                PollOutcome::Failed(message) => {
                    return Err(AdapterError::Remote {
                        status: None,
                        message: format!("remote processing failed: {}", message),
                    })
                }
                PollOutcome::Expired => {
                    return Err(AdapterError::Remote {
                        status: None,
                        message: "remote container expired before completing".to_string(),
                    })
                }
                PollOutcome::Pending => {
                    debug!(attempt, max = self.max_attempts, "still processing");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }

        Err(AdapterError::Timeout(format!(
            "status poll exhausted {} attempts at {:?} intervals",
            self.max_attempts, self.interval
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_attempt() {
        let poll = StatusPoll::new(Duration::from_secs(1), 5);
        let result: Result<&str, _> = poll
            .run(None, |_| async { Ok(PollOutcome::Ready("done")) })
            .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_ready() {
        let poll = StatusPoll::new(Duration::from_secs(1), 5);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result = poll
            .run(None, move |attempt| {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Ok(PollOutcome::Pending)
                    } else {
                        Ok(PollOutcome::Ready(attempt))
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_timeout() {
        let poll = StatusPoll::new(Duration::from_secs(1), 4);
        let result: Result<(), _> = poll
            .run(None, |_| async { Ok(PollOutcome::Pending) })
            .await;
        assert!(matches!(result, Err(AdapterError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels() {
        let poll = StatusPoll::new(Duration::from_secs(10), 100);
        let result: Result<(), _> = poll
            .run(Some(Duration::from_secs(15)), |_| async {
                Ok(PollOutcome::Pending)
            })
            .await;
        assert!(matches!(result, Err(AdapterError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_is_remote_error() {
        let poll = StatusPoll::new(Duration::from_secs(1), 5);
        let result: Result<(), _> = poll
            .run(None, |_| async {
                Ok(PollOutcome::Failed("transcode error".to_string()))
            })
            .await;
        match result {
            Err(AdapterError::Remote { message, .. }) => {
                assert!(message.contains("transcode error"));
            }
            other => panic!("expected Remote, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_is_terminal() {
        let poll = StatusPoll::new(Duration::from_secs(1), 5);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<(), _> = poll
            .run(None, move |_| {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(PollOutcome::Expired)
                }
            })
            .await;
        assert!(matches!(result, Err(AdapterError::Remote { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interval_clamped() {
        let poll = StatusPoll::new(Duration::ZERO, 0);
        assert!(poll.interval() >= Duration::from_millis(10));
        assert_eq!(poll.max_attempts(), 1);
    }
}
