//! Transient-error retry with exponential backoff.
//!
//! The same policy is applied independently at three call sites, each with
//! its own [`Backoff`] state:
//!
//! - [`RetrySite::PutBlock`]: one block upload
//! - [`RetrySite::PutBlockList`]: one chunk commit
//! - [`RetrySite::ReadLoop`]: the whole extraction session, which is thrown
//!   away and restarted from the first source byte
//!
//! Only errors for which [`Error::is_transient`] holds are retried. Any other
//! error is returned immediately.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use gzchunk::retry::{Backoff, RetryPolicy};
//!
//! let policy = RetryPolicy::default().max_attempts(3);
//! let mut backoff = Backoff::new(&policy);
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
//! assert_eq!(backoff.next_delay(), None);
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::{Error, Result};

/// Call site a retry loop protects. Used in logs and in [`Error::RetriesExhausted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrySite {
    /// Uploading one block.
    PutBlock,
    /// Committing a chunk's block list.
    PutBlockList,
    /// The outer read loop (whole-session restart).
    ReadLoop,
}

impl fmt::Display for RetrySite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PutBlock => write!(f, "put block"),
            Self::PutBlockList => write!(f, "put block list"),
            Self::ReadLoop => write!(f, "read loop"),
        }
    }
}

/// Backoff and bound settings for a retry loop.
///
/// The default starts at one second, doubles after every transient failure
/// and never gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after every retry.
    pub multiplier: u32,
    /// Upper bound for a single delay. `None` lets the delay keep doubling.
    pub max_backoff: Option<Duration>,
    /// Maximum number of attempts, including the first. `None` is unbounded.
    pub max_attempts: Option<u32>,
    /// Maximum time spent retrying, measured from the first attempt.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
            max_backoff: None,
            max_attempts: None,
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// Creates the default unbounded policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::default().max_attempts(1)
    }

    /// Sets the delay before the first retry.
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Sets the multiplier applied after each retry (minimum 1).
    pub fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Caps a single delay.
    pub fn max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = Some(cap);
        self
    }

    /// Caps the number of attempts (minimum 1).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    /// Caps the total time spent retrying.
    pub fn max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = Some(elapsed);
        self
    }
}

/// Backoff state of one retry loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    delay: Duration,
    attempts: u32,
    started: Instant,
}

impl Backoff {
    /// Starts a new backoff sequence. The first attempt is counted as started now.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            policy: policy.clone(),
            delay: policy.initial_backoff,
            attempts: 1,
            started: Instant::now(),
        }
    }

    /// Number of attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records a transient failure and returns how long to wait before the
    /// next attempt, or `None` when a bound of the policy is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self
            .policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
        {
            return None;
        }

        let delay = match self.policy.max_backoff {
            Some(cap) => self.delay.min(cap),
            None => self.delay,
        };

        if let Some(max_elapsed) = self.policy.max_elapsed {
            if self.started.elapsed().saturating_add(delay) > max_elapsed {
                return None;
            }
        }

        self.attempts += 1;
        self.delay = self.delay.saturating_mul(self.policy.multiplier);
        Some(delay)
    }
}

/// Runs `operation` until it succeeds, fails fatally, or the policy gives up.
pub async fn with_retry<T, F, Fut>(site: RetrySite, policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_notify(site, policy, operation, |_, _| {}).await
}

/// Like [`with_retry`], calling `notify` with each transient error and the
/// delay about to be slept.
pub async fn with_retry_notify<T, F, Fut, N>(
    site: RetrySite,
    policy: &RetryPolicy,
    mut operation: F,
    mut notify: N,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    N: FnMut(&Error, Duration),
{
    let mut backoff = Backoff::new(policy);
    loop {
        match operation().await {
            Ok(value) => {
                if backoff.attempts() > 1 {
                    log::debug!("{} succeeded after {} attempts", site, backoff.attempts());
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() => {
                let Some(delay) = backoff.next_delay() else {
                    log::error!(
                        "{} giving up after {} attempts: {}",
                        site,
                        backoff.attempts(),
                        err
                    );
                    return Err(Error::RetriesExhausted {
                        site,
                        attempts: backoff.attempts(),
                        last: Box::new(err),
                    });
                };
                log::warn!(
                    "{} failed (attempt {}), retrying in {:?}: {}",
                    site,
                    backoff.attempts() - 1,
                    delay,
                    err
                );
                notify(&err, delay);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, StorageError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn busy() -> Error {
        StorageError::new(ErrorCode::ServerBusy, "busy").into()
    }

    #[test]
    fn test_backoff_doubles_from_one_second() {
        let mut backoff = Backoff::new(&RetryPolicy::default());
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
        );
        assert_eq!(backoff.attempts(), 6);
    }

    #[test]
    fn test_backoff_cap() {
        let policy = RetryPolicy::default().max_backoff(Duration::from_secs(3));
        let mut backoff = Backoff::new(&policy);
        let delays: Vec<_> = (0..4).map(|_| backoff.next_delay().unwrap()).collect();
        assert_eq!(delays, [1, 2, 3, 3].map(Duration::from_secs).to_vec());
    }

    #[test]
    fn test_backoff_saturates() {
        let mut backoff = Backoff::new(&RetryPolicy::default());
        for _ in 0..200 {
            assert!(backoff.next_delay().is_some());
        }
    }

    #[test]
    fn test_no_retry_policy() {
        let mut backoff = Backoff::new(&RetryPolicy::no_retry());
        assert_eq!(backoff.next_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_from_transient() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let value = with_retry(RetrySite::PutBlock, &RetryPolicy::default(), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(busy())
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_fatal_is_immediate() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry(
            RetrySite::PutBlockList,
            &RetryPolicy::default(),
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::new(ErrorCode::InvalidBlockList, "bad list").into())
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts() {
        let policy = RetryPolicy::default().max_attempts(3);
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let mut notified = Vec::new();

        let result: Result<()> = with_retry_notify(
            RetrySite::PutBlock,
            &policy,
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(busy())
            },
            |_, delay| notified.push(delay),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(notified, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        match result {
            Err(Error::RetriesExhausted { site, attempts, .. }) => {
                assert_eq!(site, RetrySite::PutBlock);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_max_elapsed() {
        let policy = RetryPolicy::default().max_elapsed(Duration::from_secs(5));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry(RetrySite::ReadLoop, &policy, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(busy())
        })
        .await;

        // sleeps 1s, 2s; the 4s delay would exceed the 5s budget
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(Error::RetriesExhausted { .. })));
    }
}
