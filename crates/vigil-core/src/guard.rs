//! Concurrency guard for version transitions.
//!
//! Writers never trust state they read earlier: every transition carries a
//! [`CasToken`] naming the version it expects to be current, and the store
//! rejects the write if that is no longer true. A writer that loses the race
//! gets [`VersionError::Conflict`] and must reload before trying again.
//! [`retry_on_conflict`] packages that loop for callers whose change can be
//! re-derived from the fresh current row.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use vigil_types::BusinessKey;

use crate::error::VersionError;

/// Default number of attempts made by [`retry_on_conflict`].
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause before the second attempt, grown linearly afterwards.
const DEFAULT_BACKOFF_MS: u64 = 10;

/// The compare-and-swap precondition of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasToken {
    /// Chain being written.
    pub business_key: BusinessKey,
    /// Version the writer observed as current.
    pub expected_version: u32,
}

impl CasToken {
    /// Token expecting `expected_version` to be current for `business_key`.
    pub const fn new(business_key: BusinessKey, expected_version: u32) -> Self {
        Self {
            business_key,
            expected_version,
        }
    }
}

/// How [`retry_on_conflict`] retries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause before the second attempt, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }

    fn pause_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

/// Run `attempt` until it succeeds, fails with something other than a
/// conflict, or the policy's attempts are used up.
///
/// `attempt` receives the 1-based attempt number. Each call must reload the
/// current state itself; this function never replays a previous token.
///
/// # Errors
///
/// Returns the last error produced by `attempt`.
pub async fn retry_on_conflict<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, VersionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, VersionError>>,
{
    let mut n: u32 = 1;
    loop {
        match attempt(n).await {
            Err(err) if err.is_conflict() && n < policy.max_attempts => {
                tracing::warn!(attempt = n, error = %err, "Version conflict, retrying with fresh state");
                let pause = policy.pause_after(n);
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
                n = n.saturating_add(1);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn conflict() -> VersionError {
        VersionError::Conflict {
            kind: "case",
            business_key: BusinessKey::new("case-1"),
            expected: Some(1),
        }
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_ms: 0,
        };
        let result = retry_on_conflict(&policy, |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 3 { Err(conflict()) } else { Ok(n) } }
        })
        .await;
        assert_eq!(result.ok(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_ms: 0,
        };
        let result: Result<(), _> = retry_on_conflict(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(conflict()) }
        })
        .await;
        assert!(result.is_err_and(|e| e.is_conflict()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VersionError::Persistence("down".to_owned())) }
        })
        .await;
        assert!(matches!(result, Err(VersionError::Persistence(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_policy_defaults_from_empty_yaml() {
        let policy: RetryPolicy = serde_yml::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());

        let tuned: RetryPolicy = serde_yml::from_str("max_attempts: 7").unwrap();
        assert_eq!(tuned.max_attempts, 7);
        assert_eq!(tuned.backoff_ms, RetryPolicy::default().backoff_ms);
    }
}
