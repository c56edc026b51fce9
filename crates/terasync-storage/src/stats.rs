//! Cache usage statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use terasync_core::types::ContentHash;

/// Counters maintained by the cache provider and the pull path.
///
/// Per-hash last access times are kept so an external reconciliation sweep
/// can decide which blobs are cold.
#[derive(Debug, Default)]
pub struct FileStatistics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced_waits: AtomicU64,
    origin_fetches: AtomicU64,
    origin_failures: AtomicU64,
    bytes_fetched: AtomicU64,
    requests_served: AtomicU64,
    bytes_served: AtomicU64,
    last_access: DashMap<ContentHash, DateTime<Utc>>,
}

/// Point-in-time copy of [`FileStatistics`].
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced_waits: u64,
    pub origin_fetches: u64,
    pub origin_failures: u64,
    pub bytes_fetched: u64,
    pub requests_served: u64,
    pub bytes_served: u64,
    pub tracked_blobs: usize,
}

impl FileStatistics {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, hash: &ContentHash) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.touch(hash);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_origin_fetch(&self, hash: &ContentHash, bytes: u64) {
        self.origin_fetches.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
        self.touch(hash);
    }

    pub fn record_origin_failure(&self) {
        self.origin_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished pull of `bytes` payload bytes.
    pub fn record_request(&self, bytes: u64) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);
    }

    /// When `hash` was last served or fetched.
    pub fn last_access(&self, hash: &ContentHash) -> Option<DateTime<Utc>> {
        self.last_access.get(hash).map(|entry| *entry)
    }

    /// Number of origin fetches so far.
    pub fn origin_fetches(&self) -> u64 {
        self.origin_fetches.load(Ordering::Relaxed)
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            origin_fetches: self.origin_fetches.load(Ordering::Relaxed),
            origin_failures: self.origin_failures.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            tracked_blobs: self.last_access.len(),
        }
    }

    fn touch(&self, hash: &ContentHash) {
        self.last_access.insert(hash.clone(), Utc::now());
    }
}
