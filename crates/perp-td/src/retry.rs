//! Bounded retry with backoff, decoupled from the call sites.
//!
//! The caller supplies a classifier that decides, per error, whether the
//! attempt is fatal, retryable on the policy's schedule, or retryable after a
//! server-dictated delay. Only the HTTP layer (429) and protective-order
//! placement use retries; everything else fails fast.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// `base_delay × 2^attempt`.
    Exponential,
}

/// Classifier output for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fatal,
    Retry,
    /// Retry after the given delay (e.g. from a `Retry-After` header).
    RetryAfter(Duration),
}

/// Retry schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    /// Relative jitter applied to every delay, e.g. `0.2` for ±20%.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Exponential backoff with ±20% jitter.
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff: Backoff::Exponential,
            jitter: 0.2,
        }
    }

    /// At most `max_attempts` attempts separated by a fixed `delay`.
    pub fn fixed_attempts(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_retries: max_attempts.saturating_sub(1),
            base_delay: delay,
            backoff: Backoff::Fixed,
            jitter: 0.0,
        }
    }

    /// Un-jittered delay before retry number `attempt + 1`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => self
                .base_delay
                .checked_mul(1u32 << attempt.min(16))
                .unwrap_or(Duration::MAX),
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(1.0 + factor)
    }

    /// Run `op` until it succeeds, the classifier says fatal, or retries run out.
    ///
    /// `op` receives the zero-based attempt number so callers can rebuild
    /// per-attempt state (timestamps, signatures). The last error is returned
    /// on exhaustion.
    pub async fn run<T, E, F, Fut, C>(&self, label: &str, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Verdict,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let verdict = classify(&err);
            if verdict == Verdict::Fatal {
                return Err(err);
            }
            if attempt >= self.max_retries {
                warn!("[retry] {label}: giving up after {} attempt(s): {err}", attempt + 1);
                return Err(err);
            }

            let delay = match verdict {
                Verdict::RetryAfter(d) => self.jittered(d),
                _ => self.jittered(self.base_delay_for(attempt)),
            };
            warn!(
                "[retry] {label}: attempt {}/{} failed ({err}), retrying in {:.2}s",
                attempt + 1,
                self.max_retries + 1,
                delay.as_secs_f64(),
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn exponential_schedule_doubles() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100));
        assert_eq!(policy.base_delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(1000));
        for _ in 0..100 {
            let d = policy.jittered(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(800) && d <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn fixed_attempts_counts_total_attempts() {
        let policy = RetryPolicy::fixed_attempts(3, Duration::from_secs(1));
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(5, Duration::ZERO);
        let result: Result<u32, String> = policy
            .run(
                "test",
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { if attempt < 2 { Err("busy".to_string()) } else { Ok(attempt) } }
                },
                |_| Verdict::Retry,
            )
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(5, Duration::ZERO);
        let result: Result<(), String> = policy
            .run(
                "test",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("bad request".to_string()) }
                },
                |_| Verdict::Fatal,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed_attempts(3, Duration::ZERO);
        let result: Result<(), String> = policy
            .run(
                "test",
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(format!("fail {attempt}")) }
                },
                |_| Verdict::RetryAfter(Duration::ZERO),
            )
            .await;
        assert_eq!(result, Err("fail 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
