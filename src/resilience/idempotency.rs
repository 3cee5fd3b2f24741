//! Idempotency-keyed result caching.
//!
//! # Responsibilities
//! - Derive deterministic keys from an operation name and its parameters
//! - Replay a stored success instead of re-running the operation
//! - Expire records after a TTL (lazily on read, eagerly on sweep)
//!
//! # Design Decisions
//! - Only successes are stored; a failed attempt leaves no trace
//! - Concurrent callers with the same key are serialized on a per-key lock,
//!   so at most one of them runs the operation while the others wait for its
//!   result. If that attempt fails, the next waiter makes its own attempt.
//! - Records live in memory only; nothing survives a restart

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::observability::metrics;

/// Derive the idempotency key for an operation and its parameters.
///
/// Object keys are sorted recursively, so parameter order never changes the key.
pub fn idempotency_key<P>(operation: &str, params: &P) -> Result<String, serde_json::Error>
where
    P: Serialize + ?Sized,
{
    let canonical = canonicalize(serde_json::to_value(params)?);
    let payload = format!("{operation}:{}", serde_json::to_string(&canonical)?);
    Ok(hex::encode(Sha256::digest(payload.as_bytes())))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// A stored successful result.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord<T> {
    pub key: String,
    pub result: T,
    pub operation_name: String,
    pub timestamp: DateTime<Utc>,
    stored_at: Instant,
}

/// Listing entry for inspection tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedOperation {
    pub key: String,
    pub operation_name: String,
    pub timestamp: DateTime<Utc>,
}

/// TTL-bound cache of successful operation results.
#[derive(Debug)]
pub struct IdempotencyCache<T> {
    records: DashMap<String, IdempotencyRecord<T>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
}

impl<T: Clone> IdempotencyCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            locks: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stored result for `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let expired = match self.records.get(key) {
            Some(record) if !self.is_expired(&record) => return Some(record.result.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.records.remove_if(key, |_, record| self.is_expired(record));
            tracing::debug!(key, "Expired idempotency record dropped");
            metrics::record_idempotency_size(self.records.len());
        }
        None
    }

    /// Run `op` at most once per live `key`.
    ///
    /// A live record short-circuits to its stored result without invoking
    /// `op`. Errors propagate and are never stored.
    pub async fn execute<F, Fut, E>(&self, key: &str, operation_name: &str, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        if let Some(result) = self.replay(key) {
            return Ok(result);
        }

        let slot = KeySlot::acquire(&self.locks, key);
        let _held = slot.lock.clone().lock_owned().await;

        // Another caller may have finished while we waited.
        if let Some(result) = self.replay(key) {
            return Ok(result);
        }
        metrics::record_idempotency_event("miss");

        match op().await {
            Ok(result) => {
                self.records.insert(
                    key.to_owned(),
                    IdempotencyRecord {
                        key: key.to_owned(),
                        result: result.clone(),
                        operation_name: operation_name.to_owned(),
                        timestamp: Utc::now(),
                        stored_at: Instant::now(),
                    },
                );
                metrics::record_idempotency_event("stored");
                metrics::record_idempotency_size(self.records.len());
                Ok(result)
            }
            Err(e) => {
                tracing::error!(
                    key,
                    operation = operation_name,
                    error = ?e,
                    "Idempotent operation failed"
                );
                Err(e)
            }
        }
    }

    /// Remove every expired record, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = record.stored_at.elapsed() < self.ttl;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            tracing::info!(removed, "Cleaned up expired idempotency keys");
        }
        metrics::record_idempotency_size(self.records.len());
        removed
    }

    /// Drop every record, returning how many were held.
    pub fn clear(&self) -> usize {
        let count = self.records.len();
        self.records.clear();
        metrics::record_idempotency_size(0);
        count
    }

    /// Cached operations, newest first.
    pub fn entries(&self) -> Vec<CachedOperation> {
        let mut entries: Vec<CachedOperation> = self
            .records
            .iter()
            .map(|r| CachedOperation {
                key: r.key.clone(),
                operation_name: r.operation_name.clone(),
                timestamp: r.timestamp,
            })
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    fn replay(&self, key: &str) -> Option<T> {
        let result = self.get(key)?;
        tracing::info!(key, "Returning cached result for idempotency key");
        metrics::record_idempotency_event("hit");
        Some(result)
    }

    fn is_expired(&self, record: &IdempotencyRecord<T>) -> bool {
        record.stored_at.elapsed() >= self.ttl
    }
}

/// Per-key lock handle; the map entry goes away with its last holder.
struct KeySlot<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl<'a> KeySlot<'a> {
    fn acquire(locks: &'a DashMap<String, Arc<Mutex<()>>>, key: &str) -> Self {
        let lock = locks.entry(key.to_owned()).or_default().clone();
        Self {
            locks,
            key: key.to_owned(),
            lock,
        }
    }
}

impl Drop for KeySlot<'_> {
    fn drop(&mut self) {
        // One reference in the map plus ours means nobody else is waiting.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}
