//! API credentials and the least-loaded credential pool.
//!
//! Each credential owns its own quota window behind a mutex; pool selection is
//! a single critical section so two concurrent callers cannot both pick the
//! same "least loaded" credential and overshoot its ceilings.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::quota::{QuotaLimits, RateWindow, WindowSnapshot};

/// Opaque authentication token. Never logged: `Debug` redacts the value, and
/// the only way to read it back is the explicit [`ApiKey::expose`].
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read the raw token. Only the HTTP adapter should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Per-credential view exposed through [`CredentialPool::snapshots`].
#[derive(Debug, Clone)]
pub struct CredentialSnapshot {
    pub id: String,
    pub usage: u64,
    pub window: WindowSnapshot,
    pub limits: QuotaLimits,
}

/// One independent API credential with its own quota accounting.
///
/// The identifier is immutable; the usage counter is only ever advanced by
/// [`CredentialPool::record_usage`].
pub struct Credential {
    id: String,
    key: ApiKey,
    window: Mutex<RateWindow>,
    usage: AtomicU64,
}

impl Credential {
    pub fn new(id: impl Into<String>, key: ApiKey, limits: QuotaLimits) -> Self {
        Self {
            id: id.into(),
            key,
            window: Mutex::new(RateWindow::new(limits)),
            usage: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &ApiKey {
        &self.key
    }

    /// Total requests dispatched with this credential.
    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }

    pub fn can_admit(&self, estimated_tokens: u64) -> bool {
        self.lock_window().can_admit(estimated_tokens)
    }

    /// Wait hint for this credential; `None` means admissible now.
    pub fn wait_duration(&self, estimated_tokens: u64) -> Option<Duration> {
        self.lock_window().wait_duration(estimated_tokens)
    }

    /// Sleep-and-recheck until the window admits the estimate.
    ///
    /// Returns the elapsed wait, or `None` if the projected wait would push
    /// the total past `cap` (caller should rotate to another credential or
    /// degrade tier instead of stalling). An estimate the window can never
    /// admit reports an infinite wait, so it bails here too.
    pub async fn wait_until_admittable(
        &self,
        estimated_tokens: u64,
        cap: Duration,
    ) -> Option<Duration> {
        let start = Instant::now();
        loop {
            let wait = match self.lock_window().wait_duration(estimated_tokens) {
                None => return Some(start.elapsed()),
                Some(wait) => wait,
            };
            let remaining = cap.saturating_sub(start.elapsed());
            if wait > remaining {
                return None;
            }
            debug!(credential = %self.id, wait_ms = wait.as_millis() as u64, "quota wait");
            sleep(wait).await;
        }
    }

    pub fn snapshot(&self) -> CredentialSnapshot {
        let mut window = self.lock_window();
        CredentialSnapshot {
            id: self.id.clone(),
            usage: self.usage(),
            window: window.snapshot(),
            limits: window.limits(),
        }
    }

    fn record(&self, tokens: u64) {
        self.lock_window().record(tokens);
    }

    fn lock_window(&self) -> MutexGuard<'_, RateWindow> {
        // A poisoned window only means a panic elsewhere mid-record; the event
        // logs are still internally consistent, so keep going.
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("usage", &self.usage())
            .finish_non_exhaustive()
    }
}

/// Raised by [`CredentialPool::from_env`] when no keys are configured.
#[derive(Debug, thiserror::Error)]
#[error("no API keys found: set GEMINI_API_KEY or GEMINI_API_KEY_1..GEMINI_API_KEY_9")]
pub struct NoCredentials;

/// Holds N credentials and selects the least-loaded admissible one.
pub struct CredentialPool {
    credentials: Vec<Arc<Credential>>,
    // Serializes read-compute-pick so concurrent callers see a consistent view.
    select: Mutex<()>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: credentials.into_iter().map(Arc::new).collect(),
            select: Mutex::new(()),
        }
    }

    /// Build a pool from `GEMINI_API_KEY_1..=9`, falling back to the single
    /// `GEMINI_API_KEY` when no numbered keys are present.
    pub fn from_env(limits: QuotaLimits) -> Result<Self, NoCredentials> {
        let mut credentials = Vec::new();
        for i in 1..=9 {
            if let Ok(token) = std::env::var(format!("GEMINI_API_KEY_{i}")) {
                credentials.push(Credential::new(format!("key_{i}"), ApiKey::new(token), limits));
            }
        }
        if credentials.is_empty() {
            if let Ok(token) = std::env::var("GEMINI_API_KEY") {
                credentials.push(Credential::new("key_1", ApiKey::new(token), limits));
            }
        }
        if credentials.is_empty() {
            return Err(NoCredentials);
        }
        Ok(Self::new(credentials))
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Least-loaded credential whose window admits the estimate, or `None`
    /// when every credential is over quota.
    ///
    /// Load is the mean of four normalized fractions: RPM, TPM, and RPD
    /// consumption against their ceilings, plus this credential's share of
    /// the pool's historical usage. The usage share steers selection away
    /// from credentials that have already done disproportionate work, giving
    /// round-robin-like fairness under sustained load. Ties break by pool
    /// order (stable).
    pub fn best_available(&self, estimated_tokens: u64) -> Option<Arc<Credential>> {
        let _guard = self.lock_select();
        let total_usage: u64 = self.credentials.iter().map(|c| c.usage()).sum();

        let mut best: Option<(f64, &Arc<Credential>)> = None;
        for credential in &self.credentials {
            let mut window = credential.lock_window();
            if !window.can_admit(estimated_tokens) {
                continue;
            }
            let snap = window.snapshot();
            let limits = window.limits();
            drop(window);

            let rpm_load = snap.requests_this_minute as f64 / limits.rpm.max(1) as f64;
            let tpm_load = snap.tokens_this_minute as f64 / limits.tpm.max(1) as f64;
            let rpd_load = snap.requests_today as f64 / limits.rpd.max(1) as f64;
            let usage_load = credential.usage() as f64 / total_usage.max(1) as f64;
            let load = (rpm_load + tpm_load + rpd_load + usage_load) / 4.0;

            debug!(
                credential = %credential.id,
                rpm = snap.requests_this_minute,
                tpm = snap.tokens_this_minute,
                rpd = snap.requests_today,
                load,
                "credential load"
            );

            if best.as_ref().map_or(true, |(b, _)| load < *b) {
                best = Some((load, credential));
            }
        }
        best.map(|(_, c)| Arc::clone(c))
    }

    /// Smallest wait hint across the pool, for bounded block-and-retry when
    /// nothing currently admits. `None` only for an empty pool.
    pub fn shortest_wait(&self, estimated_tokens: u64) -> Option<Duration> {
        self.credentials
            .iter()
            .map(|c| c.wait_duration(estimated_tokens).unwrap_or(Duration::ZERO))
            .min()
    }

    /// Record a dispatched request. Called only after the request actually
    /// went out; selection itself has no side effects.
    pub fn record_usage(&self, credential: &Credential, tokens: u64) {
        credential.record(tokens);
        credential.usage.fetch_add(1, Ordering::Relaxed);
    }

    /// Demote a credential whose provider-side quota was hit despite local
    /// tracking believing it was available (clock skew or external
    /// consumption). Charging a large synthetic token count pushes its load
    /// score up without counting a real request against the usage stats.
    pub fn penalize(&self, credential: &Credential, tokens: u64) {
        warn!(credential = %credential.id, tokens, "penalizing credential after provider quota error");
        credential.record(tokens);
    }

    pub fn snapshots(&self) -> Vec<CredentialSnapshot> {
        self.credentials.iter().map(|c| c.snapshot()).collect()
    }

    fn lock_select(&self) -> MutexGuard<'_, ()> {
        self.select.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("credentials", &self.credentials.len())
            .finish()
    }
}
