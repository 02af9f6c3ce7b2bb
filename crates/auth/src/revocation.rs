//! Revocation ledger: tokens rejected before their natural expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use gatehouse_core::unix_nanos;

use crate::Claim;

/// Default size above which `block` sweeps dead entries inline. After a sweep
/// the mark moves to twice the surviving size, so a ledger full of live
/// entries is not rescanned on every insert.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 4096;

/// Process-wide record of revoked tokens (token → expires_at, unix nanos).
///
/// Shared as `Arc<RevocationLedger>`. Reads take the shared lock, `block` and
/// `compact` take the exclusive one, so a `block` that has returned is visible
/// to every later `is_blocked`.
#[derive(Debug)]
pub struct RevocationLedger {
    entries: RwLock<HashMap<String, i64>>,
    compaction_threshold: usize,
    // Only written while the write lock is held.
    high_water: AtomicUsize,
}

impl Default for RevocationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RevocationLedger {
    pub fn new() -> Self {
        Self::with_compaction_threshold(DEFAULT_COMPACTION_THRESHOLD)
    }

    pub fn with_compaction_threshold(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            entries: RwLock::new(HashMap::new()),
            compaction_threshold: threshold,
            high_water: AtomicUsize::new(threshold),
        }
    }

    fn reset_high_water(&self, remaining: usize) {
        let mark = self.compaction_threshold.max(remaining.saturating_mul(2));
        self.high_water.store(mark, Ordering::Relaxed);
    }

    // A poisoned lock still holds a consistent map (every write is a single
    // insert/retain), so recover it instead of forgetting revocations.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, i64>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, i64>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Record `token` as revoked until the claim's expiry.
    ///
    /// Returns `false` (and records nothing) if the claim is already expired.
    pub fn block(&self, token: &str, claim: &Claim, now: DateTime<Utc>) -> bool {
        let now = unix_nanos(now);
        if claim.expires_at <= now {
            return false;
        }

        let mut entries = self.write();
        entries.insert(token.to_string(), claim.expires_at);

        if entries.len() > self.high_water.load(Ordering::Relaxed) {
            let before = entries.len();
            entries.retain(|_, expires_at| *expires_at > now);
            self.reset_high_water(entries.len());
            tracing::debug!(
                evicted = before - entries.len(),
                remaining = entries.len(),
                "revocation ledger compacted on insert"
            );
        }
        true
    }

    /// True only while an entry exists and its expiry is still in the future.
    pub fn is_blocked(&self, token: &str, now: DateTime<Utc>) -> bool {
        let now = unix_nanos(now);
        self.read()
            .get(token)
            .is_some_and(|expires_at| *expires_at > now)
    }

    /// Drop every entry that has reached its expiry. Returns the number evicted.
    pub fn compact(&self, now: DateTime<Utc>) -> usize {
        let now = unix_nanos(now);
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        self.reset_high_water(entries.len());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
