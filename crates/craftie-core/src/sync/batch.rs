//! Bulk flush of finished sessions with a fixed-delay retry.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::SinkError;
use crate::session::Session;

/// A finished session waiting to reach the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSession {
    pub session: Session,
    /// Row the live loop already created for this session, if any.
    pub sheet_row: Option<u32>,
}

impl PendingSession {
    pub const fn new(session: Session, sheet_row: Option<u32>) -> Self {
        Self { session, sheet_row }
    }
}

/// A sink that accepts many finished sessions in one write.
///
/// Writing the same batch twice must not duplicate rows that already have a
/// known position.
#[allow(async_fn_in_trait)]
pub trait BatchSink {
    async fn write_sessions(&self, sessions: &[PendingSession]) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchSyncError {
    #[error("batch sync cancelled")]
    Cancelled,

    #[error("batch sync failed after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: SinkError,
    },
}

/// Writes `sessions` to `sink`, retrying on failure.
///
/// Returns the number of the attempt that succeeded. Cancellation is observed
/// before each attempt and while waiting between attempts.
pub async fn flush_with_retry<S: BatchSink>(
    sink: &S,
    sessions: &[PendingSession],
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<u32, BatchSyncError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(BatchSyncError::Cancelled);
        }

        match sink.write_sessions(sessions).await {
            Ok(()) => return Ok(attempt),
            Err(source) if attempt >= attempts => {
                return Err(BatchSyncError::Exhausted { attempts, source });
            }
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, "batch sync attempt failed, retrying");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(BatchSyncError::Cancelled),
                    () = tokio::time::sleep(policy.delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    use tokio::time::Instant;

    /// Fails the first `failures` writes, then succeeds.
    struct FlakySink {
        failures: Cell<u32>,
        calls: Cell<u32>,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures: Cell::new(failures),
                calls: Cell::new(0),
            }
        }
    }

    impl BatchSink for FlakySink {
        async fn write_sessions(&self, _sessions: &[PendingSession]) -> Result<(), SinkError> {
            self.calls.set(self.calls.get() + 1);
            if self.failures.get() == 0 {
                return Ok(());
            }
            self.failures.set(self.failures.get() - 1);
            Err(SinkError::RowNumber("flaky".to_string()))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let sink = FlakySink::new(2);
        let started = Instant::now();

        let attempt = flush_with_retry(&sink, &[], &policy(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(attempt, 3);
        assert_eq!(sink.calls.get(), 3);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts_and_last_error() {
        let sink = FlakySink::new(10);

        let err = flush_with_retry(&sink, &[], &policy(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                BatchSyncError::Exhausted {
                    attempts: 3,
                    source: SinkError::RowNumber(_)
                }
            ),
            "{err}"
        );
        assert_eq!(sink.calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_delay() {
        let sink = FlakySink::new(10);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let started = Instant::now();

        let err = flush_with_retry(&sink, &[], &policy(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, BatchSyncError::Cancelled));
        assert_eq!(sink.calls.get(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_write() {
        let sink = FlakySink::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = flush_with_retry(&sink, &[], &policy(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchSyncError::Cancelled));
        assert_eq!(sink.calls.get(), 0);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let sink = FlakySink::new(0);
        let policy = RetryPolicy {
            attempts: 0,
            delay: Duration::ZERO,
        };
        let attempt = flush_with_retry(&sink, &[], &policy, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(attempt, 1);
    }
}
