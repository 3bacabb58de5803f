//! `RetryPolicy` — a pure value object answering "should I retry? how long
//! do I wait?". Grounded in `examples/other_examples`'s stencila retry
//! module (`BackoffConfig`/`delay_for_attempt`), adapted to the spec's
//! fixed/linear/exponential curve and `retry_on`/`give_up_on` kind sets.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Shape of the wait-time curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Linear,
    Exponential,
}

/// Decides whether a failed leaf should be retried, and how long to wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    /// Fraction of the base delay to jitter by, in `[0, 1]`.
    pub jitter_fraction: f64,
    /// Empty means "retry on anything not in `give_up_on`".
    pub retry_on: HashSet<String>,
    /// Always wins over `retry_on`.
    pub give_up_on: HashSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_secs(0),
            backoff: Backoff::Fixed,
            jitter_fraction: 0.0,
            retry_on: HashSet::new(),
            give_up_on: HashSet::new(),
        }
    }
}

/// What the retry state machine should do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retry after the given delay; `next_attempt` is the attempt number the
    /// leaf is about to make.
    Retry { delay: Duration, next_attempt: u32 },
    /// Give up; the leaf has failed for good.
    GiveUp,
}

/// Samples a jitter multiplier in `[lo, hi)`. A collaborator rather than a
/// bare `rand::thread_rng()` call so tests can substitute a deterministic
/// sampler (SPEC_FULL.md §9: "must not use an unseeded or time-seeded PRNG
/// in tests").
pub trait JitterSampler: Send + Sync {
    fn sample(&self, lo: f64, hi: f64) -> f64;
}

/// Default sampler, backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandJitterSampler;

impl JitterSampler for RandJitterSampler {
    fn sample(&self, lo: f64, hi: f64) -> f64 {
        if lo >= hi {
            return lo;
        }
        rand::thread_rng().gen_range(lo..hi)
    }
}

/// Deterministic sampler for tests: always returns a fixed point within the
/// requested range, expressed as a fraction of the way from `lo` to `hi`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitterSampler(pub f64);

impl JitterSampler for FixedJitterSampler {
    fn sample(&self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.0.clamp(0.0, 1.0)
    }
}

impl RetryPolicy {
    /// The base delay (before jitter) to wait before attempt `k + 1`, given
    /// that attempt `k` (1-based) just failed.
    fn base_delay(&self, k: u32) -> Duration {
        let base_secs = self.delay.as_secs_f64();
        let scaled = match self.backoff {
            Backoff::Fixed => base_secs,
            Backoff::Linear => base_secs * f64::from(k),
            Backoff::Exponential => base_secs * 2f64.powi(i32::try_from(k.saturating_sub(1)).unwrap_or(i32::MAX)),
        };
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Apply `jitter_fraction` to a base delay using the given sampler.
    fn jittered(&self, base: Duration, sampler: &dyn JitterSampler) -> Duration {
        if self.jitter_fraction <= 0.0 {
            return base;
        }
        let base_secs = base.as_secs_f64();
        let lo = (base_secs * (1.0 - self.jitter_fraction)).max(0.0);
        let hi = (base_secs * (1.0 + self.jitter_fraction)).max(lo);
        let sampled = sampler.sample(lo, hi);
        Duration::from_secs_f64(sampled.max(0.0))
    }

    /// Classify `error` and decide whether attempt `k` (1-based, the attempt
    /// that just failed) should be retried.
    pub fn decide(&self, error: &WorkflowError, k: u32, sampler: &dyn JitterSampler) -> RetryDecision {
        if self.give_up_on.contains(&error.kind) {
            return RetryDecision::GiveUp;
        }
        let eligible = self.retry_on.is_empty() || self.retry_on.contains(&error.kind);
        if eligible && k < self.max_attempts {
            let delay = self.jittered(self.base_delay(k), sampler);
            RetryDecision::Retry {
                delay,
                next_attempt: k + 1,
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(backoff: Backoff, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(10),
            backoff,
            jitter_fraction: 0.0,
            retry_on: HashSet::new(),
            give_up_on: HashSet::new(),
        }
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let p = policy(Backoff::Fixed, 5);
        assert_eq!(p.base_delay(1), Duration::from_millis(10));
        assert_eq!(p.base_delay(3), Duration::from_millis(10));
    }

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let p = policy(Backoff::Linear, 5);
        assert_eq!(p.base_delay(1), Duration::from_millis(10));
        assert_eq!(p.base_delay(2), Duration::from_millis(20));
        assert_eq!(p.base_delay(3), Duration::from_millis(30));
    }

    #[test]
    fn exponential_backoff_doubles() {
        let p = policy(Backoff::Exponential, 5);
        assert_eq!(p.base_delay(1), Duration::from_millis(10));
        assert_eq!(p.base_delay(2), Duration::from_millis(20));
        assert_eq!(p.base_delay(3), Duration::from_millis(40));
    }

    #[test]
    fn backoff_is_monotonic_without_jitter() {
        let p = policy(Backoff::Exponential, 6);
        let delays: Vec<_> = (1..5).map(|k| p.base_delay(k)).collect();
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn give_up_on_wins_over_retry_on() {
        let mut p = policy(Backoff::Fixed, 5);
        p.retry_on.insert("network_error".to_string());
        p.give_up_on.insert("network_error".to_string());
        let err = WorkflowError::user("network_error", "boom");
        assert_eq!(p.decide(&err, 1, &FixedJitterSampler(0.5)), RetryDecision::GiveUp);
    }

    #[test]
    fn retries_up_to_max_attempts() {
        let p = policy(Backoff::Fixed, 3);
        let err = WorkflowError::user("transient", "boom");
        let sampler = FixedJitterSampler(0.5);
        assert!(matches!(p.decide(&err, 1, &sampler), RetryDecision::Retry { next_attempt: 2, .. }));
        assert!(matches!(p.decide(&err, 2, &sampler), RetryDecision::Retry { next_attempt: 3, .. }));
        assert_eq!(p.decide(&err, 3, &sampler), RetryDecision::GiveUp);
    }

    #[test]
    fn empty_retry_on_means_retry_everything_not_given_up() {
        let p = policy(Backoff::Fixed, 2);
        let err = WorkflowError::user("anything", "boom");
        assert!(matches!(p.decide(&err, 1, &FixedJitterSampler(0.0)), RetryDecision::Retry { .. }));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut p = policy(Backoff::Fixed, 5);
        p.jitter_fraction = 0.5;
        let base = p.base_delay(1);
        let lo = base.mul_f64(0.5);
        let hi = base.mul_f64(1.5);
        for frac in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let d = p.jittered(base, &FixedJitterSampler(frac));
            assert!(d >= lo && d <= hi, "{d:?} not within [{lo:?}, {hi:?}]");
        }
    }
}
