//! Retry pacing shared by every tier.
//!
//! One policy object instead of per-tier sleep loops: exponential growth with
//! jitter for ordinary failures, a long flat override for provider-side quota
//! errors, and an explicit cancellation signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Cooperative cancellation flag, checked between attempts and sleeps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Delay schedule for retries within a tier.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for attempt 0; doubles each attempt.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Flat override applied after a detected quota-exceeded condition. Long
    /// on purpose: provider-side quota state takes tens of seconds to drain.
    pub quota_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            quota_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Deterministic exponential delay for the given attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.pow(attempt.min(5));
        self.base_delay
            .saturating_mul(multiplier as u32)
            .min(self.max_delay)
    }

    /// Exponential delay with multiplicative jitter in [0.5, 1.5), so
    /// concurrent jobs do not retry in lockstep.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        self.delay_for(attempt).mul_f64(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_ceiling() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            quota_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        // Exponent saturates; no overflow for silly attempt counts.
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy::default();
        for attempt in 0..4 {
            let bare = policy.delay_for(attempt);
            for _ in 0..20 {
                let jittered = policy.jittered_delay_for(attempt);
                assert!(jittered >= bare.mul_f64(0.5));
                assert!(jittered <= policy.max_delay.max(bare.mul_f64(1.5)));
            }
        }
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
