//! Counter Store (C1): shared atomic counters with TTL.
//!
//! A `DashMap` of atomics with lock-free CAS updates. A production
//! deployment might back this with an out-of-process store (e.g. Redis);
//! `InMemoryCounterStore` is the in-process default the spec explicitly
//! allows (spec.md §4.1): "a mutex and a background expiry sweeper
//! satisfies the contract."

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments `key` and returns the post-increment value.
    async fn increment(&self, key: &str) -> i64;
    /// Sets (or refreshes) the TTL on `key`. Idempotent; a lost refresh on
    /// an already-expiring key is acceptable (spec.md §4.1).
    async fn set_ttl(&self, key: &str, seconds: u64);
    /// Returns the current value, or zero if the key does not exist.
    async fn get(&self, key: &str) -> i64;
    /// Decrements `key`, returning the post-decrement value.
    async fn decrement(&self, key: &str) -> i64;
}

struct Entry {
    value: AtomicI64,
    expires_at: std::sync::Mutex<Option<Instant>>,
}

pub struct InMemoryCounterStore {
    store: DashMap<String, Entry>,
}

impl InMemoryCounterStore {
    /// Builds the store and spawns a background sweeper that removes
    /// expired keys every second. Must be called from within a Tokio
    /// runtime.
    pub fn new() -> std::sync::Arc<Self> {
        let this = std::sync::Arc::new(Self { store: DashMap::new() });
        let weak = std::sync::Arc::downgrade(&this);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                store.sweep();
            }
        });
        this
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.store.retain(|_, entry| match *entry.expires_at.lock().unwrap() {
            Some(expires_at) => expires_at > now,
            None => true,
        });
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str) -> i64 {
        let entry = self
            .store
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: AtomicI64::new(0),
                expires_at: std::sync::Mutex::new(None),
            });
        entry.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn set_ttl(&self, key: &str, seconds: u64) {
        if let Some(entry) = self.store.get(key) {
            *entry.expires_at.lock().unwrap() = Some(Instant::now() + Duration::from_secs(seconds));
        }
    }

    async fn get(&self, key: &str) -> i64 {
        self.store
            .get(key)
            .map(|e| e.value.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    async fn decrement(&self, key: &str) -> i64 {
        let entry = self
            .store
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: AtomicI64::new(0),
                expires_at: std::sync::Mutex::new(None),
            });
        entry.value.fetch_sub(1, Ordering::SeqCst) - 1
    }
}
