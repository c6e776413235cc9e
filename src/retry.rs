//! Retry logic with a fixed backoff schedule
//!
//! A [`BackoffSchedule`] is an ordered list of wait durations. It is used two ways:
//! - bounded: [`retry_with_schedule`] makes one attempt per step and gives up after the last
//! - cyclic: [`BackoffSchedule::cycle`] restarts from the first step forever (dedup polling)
//!
//! # Example
//!
//! ```no_run
//! use media_dumper::retry::{BackoffSchedule, IsRetryable, retry_with_schedule};
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let schedule = BackoffSchedule::default();
//! retry_with_schedule(&schedule, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, TransferError};
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network errors, 5xx, connection reset) should return `true`.
/// Definitive failures (404, permission denied, disk full) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Transient { .. })
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transfer(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Auth failures need a new token, not another attempt
            Error::Access { .. } => false,
            Error::Config { .. }
            | Error::ProviderNotFound { .. }
            | Error::Storage { .. }
            | Error::Source { .. }
            | Error::Metadata(_)
            | Error::Serialization(_)
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}

/// Fixed, ordered list of wait durations between attempts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<Duration>,
}

impl BackoffSchedule {
    /// Create a schedule from explicit steps
    pub fn new(steps: Vec<Duration>) -> Self {
        Self { steps }
    }

    /// Number of steps (and so the maximum number of fetch attempts)
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the schedule has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The steps in order
    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }

    /// Endless iterator that wraps back to the first step after the last one.
    ///
    /// An empty schedule yields a zero wait forever.
    pub fn cycle(&self) -> impl Iterator<Item = Duration> + Send + '_ {
        let fallback = self.steps.is_empty().then_some(Duration::ZERO);
        self.steps.iter().copied().chain(fallback).cycle()
    }
}

impl Default for BackoffSchedule {
    /// 2s, 4s, 8s, 16s, 32s
    fn default() -> Self {
        Self::new(
            [2, 4, 8, 16, 32]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
        )
    }
}

/// Execute an async operation, retrying transient failures on a fixed schedule
///
/// One attempt is made per schedule step. After a retryable failure the step's
/// duration is slept before the next attempt; no sleep follows the final attempt.
/// A non-retryable error is returned immediately. After the schedule is exhausted
/// the last error is returned.
///
/// An empty schedule still makes a single attempt.
pub async fn retry_with_schedule<F, Fut, T, E>(
    schedule: &BackoffSchedule,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let attempts = schedule.len().max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let delay = schedule.steps()[attempt];
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    #[tokio::test]
    async fn test_success_no_retry() {
        let schedule = BackoffSchedule::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_schedule(&schedule, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifth_attempt_succeeds_after_four_sleeps() {
        let schedule = BackoffSchedule::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let start = tokio::time::Instant::now();

        let result = retry_with_schedule(&schedule, || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 4 {
                    Err(TestError::Transient)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31),
            "expected 2+4+8+16 seconds of backoff, got {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_exhausted_returns_last_error() {
        let schedule = BackoffSchedule::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let start = tokio::time::Instant::now();

        let result = retry_with_schedule(&schedule, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            5,
            "one attempt per schedule step"
        );
        // No sleep after the final attempt
        assert!(start.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_no_retry() {
        let schedule = BackoffSchedule::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let start = tokio::time::Instant::now();

        let result = retry_with_schedule(&schedule, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Permanent)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            counter.load(Ordering::SeqCst),
            1,
            "should not retry permanent error"
        );
        assert_eq!(start.elapsed(), Duration::ZERO, "must not sleep at all");
    }

    #[tokio::test]
    async fn test_empty_schedule_makes_one_attempt() {
        let schedule = BackoffSchedule::new(vec![]);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_schedule(&schedule, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cycle_wraps_to_first_step() {
        let schedule = BackoffSchedule::new(vec![Duration::from_secs(2), Duration::from_secs(4)]);
        let waits: Vec<_> = schedule.cycle().take(5).collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(2),
            ]
        );
    }

    #[test]
    fn test_error_classification() {
        let transient = Error::Transfer(TransferError::Transient {
            url: "http://x/a.jpg".into(),
            reason: "status 502".into(),
        });
        let not_found = Error::Transfer(TransferError::NotFound {
            url: "http://x/a.jpg".into(),
        });
        let reset = Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));

        assert!(transient.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(reset.is_retryable());
        assert!(
            !Error::Access {
                message: "expired".into()
            }
            .is_retryable()
        );
    }
}
