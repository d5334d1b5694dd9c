pub mod session;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::cache::session::{CacheRecord, SessionData};

/// Scope name of the cache visible to every task, used for cross-task
/// bookkeeping such as seen-entry dedup and resolver failure counts.
pub const SHARED_SCOPE: &str = "_shared_";

pub const DEFAULT_TTL_DAYS: u32 = 45;

/// A namespaced TTL key/value store layered on the persisted session.
///
/// Each handle is scoped to one task (or the shared scope) and has an active
/// namespace; the engine switches the namespace to the running plugin's name
/// so plugin cache calls are automatically isolated from each other.
///
/// Expired records are purged lazily: [`ScopedCache::set_namespace`] is the
/// only purge trigger, and it sweeps the whole scope. Scopes that are never
/// reactivated keep their expired records until the owning session is next
/// used — a bounded leak the usage pattern tolerates. `get` does not check
/// expiry; a record is gone only once a purge has removed it.
#[derive(Clone)]
pub struct ScopedCache {
    data: Arc<RwLock<SessionData>>,
    scope: String,
    namespace: String,
}

impl ScopedCache {
    pub(crate) fn new(data: Arc<RwLock<SessionData>>, scope: &str) -> Self {
        Self {
            data,
            scope: scope.to_string(),
            namespace: String::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Switch the active namespace, purging expired records across this
    /// handle's scope as a side effect.
    pub fn set_namespace(&mut self, namespace: &str) {
        self.namespace = namespace.to_string();
        self.purge_expired_at(Utc::now());
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) {
        let mut data = self.data.write();
        let Some(scope) = data.caches.get_mut(&self.scope) else {
            return;
        };

        let mut purged = 0usize;
        for records in scope.values_mut() {
            let before = records.len();
            records.retain(|_, record| !record.is_expired_at(now));
            purged += before - records.len();
        }
        scope.retain(|_, records| !records.is_empty());

        if purged > 0 {
            debug!(
                "Purged {} expired cache records from scope '{}'",
                purged, self.scope
            );
        }
    }

    /// Upsert a value with the default TTL.
    pub fn store(&self, key: &str, value: Value) {
        self.store_for(key, value, DEFAULT_TTL_DAYS);
    }

    /// Upsert a value that expires `days` days after now.
    pub fn store_for(&self, key: &str, value: Value, days: u32) {
        let mut data = self.data.write();
        data.caches
            .entry(self.scope.clone())
            .or_default()
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), CacheRecord::new(value, days));
    }

    /// Get-or-store: returns the already-stored value when present without
    /// resetting its expiry, otherwise stores and returns `value`.
    pub fn store_default(&self, key: &str, value: Value) -> Value {
        self.store_default_for(key, value, DEFAULT_TTL_DAYS)
    }

    pub fn store_default_for(&self, key: &str, value: Value, days: u32) -> Value {
        let mut data = self.data.write();
        let records = data
            .caches
            .entry(self.scope.clone())
            .or_default()
            .entry(self.namespace.clone())
            .or_default();

        records
            .entry(key.to_string())
            .or_insert_with(|| CacheRecord::new(value, days))
            .value
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let data = self.data.read();
        data.caches
            .get(&self.scope)?
            .get(&self.namespace)?
            .get(key)
            .map(|record| record.value.clone())
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    pub fn namespaces(&self) -> Vec<String> {
        let data = self.data.read();
        data.caches
            .get(&self.scope)
            .map(|scope| scope.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn insert_record(&self, namespace: &str, key: &str, record: CacheRecord) {
        let mut data = self.data.write();
        data.caches
            .entry(self.scope.clone())
            .or_default()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), record);
    }
}
