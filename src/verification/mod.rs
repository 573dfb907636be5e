//! One-time verification codes for registration and password changes.
//!
//! Codes are 6-digit numeric strings stored in process memory, keyed by the
//! normalized (trimmed, lowercased) email they were requested for. Each key holds
//! at most one live code; issuing again replaces the old one. A code is redeemable
//! exactly once and only before its 5 minute TTL elapses. Nothing here survives a
//! restart, which is fine for codes this short-lived.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Codes stay redeemable for 5 minutes.
pub const CODE_TTL: Duration = Duration::from_secs(5 * 60);

/// Expired entries are reclaimed every 10 minutes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

struct CodeEntry {
    code: String,
    expires_at: Instant,
}

/// In-memory store of live verification codes.
///
/// All read-modify-write sequences happen under the single map lock, so at most
/// one of any number of concurrent redemption attempts for the same key can
/// observe success.
pub struct CodeRegistry {
    ttl: Duration,
    codes: Mutex<HashMap<String, CodeEntry>>,
}

impl CodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl: CODE_TTL,
            codes: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn normalize_key(owner_key: &str) -> String {
        owner_key.trim().to_lowercase()
    }

    fn generate_code() -> String {
        // Uniform over the full 6-digit space.
        rand::thread_rng().gen_range(100_000..=999_999).to_string()
    }

    /// Issue a fresh code for the owner key, replacing any unredeemed one.
    ///
    /// The previous code, if any, becomes permanently unredeemable. The code is
    /// only returned; delivering it to the owner is the caller's job.
    pub async fn issue(&self, owner_key: &str) -> String {
        let code = Self::generate_code();
        let mut codes = self.codes.lock().await;
        codes.insert(
            Self::normalize_key(owner_key),
            CodeEntry {
                code: code.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        code
    }

    /// Redeem a code for the owner key.
    ///
    /// Missing key, elapsed expiry, and code mismatch all return `false` and leave
    /// the map untouched; expired entries wait for the sweep. An exact match on a
    /// live entry removes it and returns `true`; the check and the removal share
    /// one critical section, so a code can be spent at most once.
    pub async fn redeem(&self, owner_key: &str, code: &str) -> bool {
        let key = Self::normalize_key(owner_key);
        let mut codes = self.codes.lock().await;

        let Some(entry) = codes.get(&key) else {
            return false;
        };
        if entry.expires_at <= Instant::now() {
            return false;
        }
        if entry.code != code {
            return false;
        }

        codes.remove(&key);
        true
    }

    /// Drop every expired entry. Purely memory reclamation; redemption outcomes
    /// are the same whether or not this has run.
    pub async fn sweep_expired(&self) {
        let now = Instant::now();
        let mut codes = self.codes.lock().await;
        let before = codes.len();
        codes.retain(|_, entry| entry.expires_at > now);
        let swept = before - codes.len();
        if swept > 0 {
            debug!(swept, "swept expired verification codes");
        }
    }

    /// Number of live-or-expired entries currently held.
    pub async fn len(&self) -> usize {
        self.codes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.codes.lock().await.is_empty()
    }
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that periodically sweeps expired codes.
pub fn spawn_sweeper(registry: Arc<CodeRegistry>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            registry.sweep_expired().await;
        }
    })
}
