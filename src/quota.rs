//! Sliding-window quota tracking for a single credential.
//!
//! Leaky-bucket-by-eviction: every query first discards events older than the
//! horizon, then evaluates the ceilings. Simpler to reason about than a token
//! bucket, and accepts burstiness up to the window boundary.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Horizon for per-minute ceilings (RPM, TPM).
pub const MINUTE: Duration = Duration::from_secs(60);

/// Horizon for the per-day ceiling (RPD).
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Quota ceilings for one credential class.
///
/// Defaults are the Gemini free-tier constants: 15 requests/minute,
/// 1M tokens/minute, 1,500 requests/day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    /// Requests per minute.
    pub rpm: u32,
    /// Tokens per minute.
    pub tpm: u64,
    /// Requests per day.
    pub rpd: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            rpm: 15,
            tpm: 1_000_000,
            rpd: 1_500,
        }
    }
}

/// Point-in-time view of a window's consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub requests_this_minute: u32,
    pub tokens_this_minute: u64,
    pub requests_today: u32,
}

/// Per-credential sliding-window quota tracker.
///
/// Three independent event logs: request instants over a 1-minute horizon,
/// request instants over a 24-hour horizon, and `(instant, tokens)` pairs over
/// a 1-minute horizon. Invariant: expired entries are purged before any limit
/// is evaluated.
///
/// Every operation has an `_at(now)` variant so tests can simulate time
/// without sleeping; the plain form delegates with `Instant::now()`.
#[derive(Debug)]
pub struct RateWindow {
    limits: QuotaLimits,
    minute_requests: VecDeque<Instant>,
    day_requests: VecDeque<Instant>,
    minute_tokens: VecDeque<(Instant, u64)>,
}

impl RateWindow {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            minute_requests: VecDeque::new(),
            day_requests: VecDeque::new(),
            minute_tokens: VecDeque::new(),
        }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Whether a request with the given token estimate is currently admissible.
    pub fn can_admit(&mut self, estimated_tokens: u64) -> bool {
        self.can_admit_at(estimated_tokens, Instant::now())
    }

    pub fn can_admit_at(&mut self, estimated_tokens: u64, now: Instant) -> bool {
        self.purge_expired(now);
        let snap = self.snapshot_unpurged();
        snap.requests_this_minute < self.limits.rpm
            && snap.requests_today < self.limits.rpd
            && snap.tokens_this_minute + estimated_tokens <= self.limits.tpm
    }

    /// How long until a request with this estimate could be admitted.
    ///
    /// `None` means admissible right now. Otherwise the wait is the maximum,
    /// over every bound dimension, of the time until that dimension's oldest
    /// entry falls out of its horizon. Callers sleep for the returned duration
    /// and re-check; there is no busy polling. A day-bound credential yields a
    /// wait that may span hours, which callers are expected to treat as "try a
    /// different credential instead". An estimate larger than the TPM ceiling
    /// can never be admitted no matter what expires; that yields
    /// `Duration::MAX`, so callers comparing against a wait budget bail out
    /// instead of sleeping.
    pub fn wait_duration(&mut self, estimated_tokens: u64) -> Option<Duration> {
        self.wait_duration_at(estimated_tokens, Instant::now())
    }

    pub fn wait_duration_at(&mut self, estimated_tokens: u64, now: Instant) -> Option<Duration> {
        if estimated_tokens > self.limits.tpm {
            return Some(Duration::MAX);
        }
        self.purge_expired(now);
        let snap = self.snapshot_unpurged();

        let mut wait: Option<Duration> = None;
        let mut extend = |candidate: Duration| {
            wait = Some(wait.map_or(candidate, |w| w.max(candidate)));
        };

        if snap.requests_this_minute >= self.limits.rpm {
            if let Some(oldest) = self.minute_requests.front() {
                extend((*oldest + MINUTE).saturating_duration_since(now));
            }
        }
        if snap.tokens_this_minute + estimated_tokens > self.limits.tpm {
            if let Some((oldest, _)) = self.minute_tokens.front() {
                extend((*oldest + MINUTE).saturating_duration_since(now));
            }
        }
        if snap.requests_today >= self.limits.rpd {
            if let Some(oldest) = self.day_requests.front() {
                extend((*oldest + DAY).saturating_duration_since(now));
            }
        }
        wait
    }

    /// Record one dispatched request and its token consumption.
    pub fn record(&mut self, tokens_used: u64) {
        self.record_at(tokens_used, Instant::now());
    }

    pub fn record_at(&mut self, tokens_used: u64, now: Instant) {
        self.minute_requests.push_back(now);
        self.day_requests.push_back(now);
        self.minute_tokens.push_back((now, tokens_used));
    }

    pub fn snapshot(&mut self) -> WindowSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&mut self, now: Instant) -> WindowSnapshot {
        self.purge_expired(now);
        self.snapshot_unpurged()
    }

    fn snapshot_unpurged(&self) -> WindowSnapshot {
        WindowSnapshot {
            requests_this_minute: self.minute_requests.len() as u32,
            tokens_this_minute: self.minute_tokens.iter().map(|(_, t)| t).sum(),
            requests_today: self.day_requests.len() as u32,
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        while let Some(front) = self.minute_requests.front() {
            if now.saturating_duration_since(*front) >= MINUTE {
                self.minute_requests.pop_front();
            } else {
                break;
            }
        }
        while let Some((front, _)) = self.minute_tokens.front() {
            if now.saturating_duration_since(*front) >= MINUTE {
                self.minute_tokens.pop_front();
            } else {
                break;
            }
        }
        while let Some(front) = self.day_requests.front() {
            if now.saturating_duration_since(*front) >= DAY {
                self.day_requests.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_limits() -> QuotaLimits {
        QuotaLimits {
            rpm: 3,
            tpm: 100,
            rpd: 5,
        }
    }

    #[test]
    fn admits_until_rpm_exhausted_then_recovers_after_window() {
        let mut w = RateWindow::new(small_limits());
        let base = Instant::now();

        for i in 0..3 {
            assert!(w.can_admit_at(10, base));
            w.record_at(10, base + Duration::from_secs(i));
        }
        assert!(!w.can_admit_at(10, base + Duration::from_secs(3)));

        // The whole minute window must elapse past the oldest entry.
        assert!(w.can_admit_at(10, base + Duration::from_secs(61)));
    }

    #[test]
    fn tpm_bound_rejects_oversized_estimate() {
        let mut w = RateWindow::new(small_limits());
        let base = Instant::now();
        w.record_at(80, base);

        assert!(w.can_admit_at(20, base + Duration::from_secs(1)));
        assert!(!w.can_admit_at(21, base + Duration::from_secs(1)));
    }

    #[test]
    fn oversized_estimate_is_never_admittable() {
        let mut w = RateWindow::new(small_limits());
        let base = Instant::now();

        // Estimate exceeds the TPM ceiling outright: not admissible, and no
        // finite wait can change that, even with a completely empty window.
        assert!(!w.can_admit_at(101, base));
        assert_eq!(w.wait_duration_at(101, base), Some(Duration::MAX));

        // At the ceiling exactly it still fits.
        assert!(w.can_admit_at(100, base));
        assert_eq!(w.wait_duration_at(100, base), None);
    }

    #[test]
    fn wait_duration_points_at_oldest_minute_entry() {
        let mut w = RateWindow::new(small_limits());
        let base = Instant::now();
        w.record_at(10, base);
        w.record_at(10, base + Duration::from_secs(5));
        w.record_at(10, base + Duration::from_secs(10));

        // RPM-bound at t=20: oldest entry expires at t=60.
        let wait = w
            .wait_duration_at(10, base + Duration::from_secs(20))
            .expect("should be rpm-bound");
        assert_eq!(wait, Duration::from_secs(40));

        assert_eq!(w.wait_duration_at(10, base + Duration::from_secs(61)), None);
    }

    #[test]
    fn wait_duration_takes_max_of_bound_dimensions() {
        let mut w = RateWindow::new(QuotaLimits {
            rpm: 1,
            tpm: 50,
            rpd: 100,
        });
        let base = Instant::now();
        w.record_at(60, base);

        // Both RPM- and TPM-bound; both expire with the same (only) entry.
        let wait = w
            .wait_duration_at(10, base + Duration::from_secs(30))
            .unwrap();
        assert_eq!(wait, Duration::from_secs(30));
    }

    #[test]
    fn rpd_survives_minute_expiry() {
        let mut w = RateWindow::new(QuotaLimits {
            rpm: 100,
            tpm: 1_000,
            rpd: 2,
        });
        let base = Instant::now();
        w.record_at(1, base);
        w.record_at(1, base + Duration::from_secs(1));

        let later = base + Duration::from_secs(120);
        let snap = w.snapshot_at(later);
        assert_eq!(snap.requests_this_minute, 0);
        assert_eq!(snap.requests_today, 2);
        assert!(!w.can_admit_at(1, later));

        let wait = w.wait_duration_at(1, later).unwrap();
        assert_eq!(wait, DAY - Duration::from_secs(120));
    }

    #[test]
    fn snapshot_reflects_purged_state() {
        let mut w = RateWindow::new(small_limits());
        let base = Instant::now();
        w.record_at(40, base);
        w.record_at(20, base + Duration::from_secs(30));

        let snap = w.snapshot_at(base + Duration::from_secs(70));
        assert_eq!(snap.requests_this_minute, 1);
        assert_eq!(snap.tokens_this_minute, 20);
        assert_eq!(snap.requests_today, 2);
    }
}
