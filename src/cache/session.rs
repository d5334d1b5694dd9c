use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::ScopedCache;
use crate::error::{Error, Result};

pub const SESSION_VERSION: u32 = 1;

/// The process-wide failed list keeps only the most recent failures.
pub const MAX_FAILED_ENTRIES: usize = 25;

/// One stored cache value with its expiry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub stored: DateTime<Utc>,
    pub days: u32,
    pub value: Value,
}

impl CacheRecord {
    pub fn new(value: Value, days: u32) -> Self {
        Self {
            stored: Utc::now(),
            days,
            value,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.stored).num_days() > i64::from(self.days)
    }
}

pub type NamespaceRecords = HashMap<String, CacheRecord>;
pub type ScopeRecords = HashMap<String, NamespaceRecords>;

/// A failure reported by a task, kept for the `failed` CLI surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEntry {
    pub title: String,
    pub url: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionData {
    pub version: u32,
    /// scope (task name or `_shared_`) -> namespace -> key -> record
    pub caches: HashMap<String, ScopeRecords>,
    pub failed: VecDeque<FailedEntry>,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            version: SESSION_VERSION,
            caches: HashMap::new(),
            failed: VecDeque::new(),
        }
    }
}

/// Permissive on-disk shape: individual records are decoded one by one so a
/// single corrupt record never blocks the rest of the session.
#[derive(Debug, Deserialize)]
struct RawSessionData {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    caches: HashMap<String, HashMap<String, HashMap<String, Value>>>,
    #[serde(default)]
    failed: Vec<Value>,
}

/// Disk-backed session state shared by every task in a run: the namespaced
/// cache records plus the bounded failed-entries list. Saved as JSON with a
/// temp-file-then-rename write.
pub struct SessionStore {
    path: Option<PathBuf>,
    data: Arc<RwLock<SessionData>>,
}

impl SessionStore {
    /// Load the session from `path`, starting empty when the file is missing
    /// or wholly unreadable. Records that fail to decode are dropped with a
    /// warning rather than failing the load.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            debug!("Session file does not exist: {}", path.display());
            return Ok(Self {
                path: Some(path),
                data: Arc::new(RwLock::new(SessionData::default())),
            });
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            Error::Session(format!(
                "Failed to read session file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let data = match serde_json::from_str::<RawSessionData>(&content) {
            Ok(raw) => Self::decode(raw),
            Err(e) => {
                warn!(
                    "Session file '{}' is unreadable ({}), starting empty",
                    path.display(),
                    e
                );
                SessionData::default()
            }
        };

        Ok(Self {
            path: Some(path),
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// A session that never touches disk. Used by tests and `--test` runs
    /// that start without an existing session file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Arc::new(RwLock::new(SessionData::default())),
        }
    }

    fn decode(raw: RawSessionData) -> SessionData {
        if raw.version != SESSION_VERSION {
            debug!(
                "Session version {} differs from current {}",
                raw.version, SESSION_VERSION
            );
        }

        let mut dropped = 0usize;
        let mut caches: HashMap<String, ScopeRecords> = HashMap::new();

        for (scope, namespaces) in raw.caches {
            let scope_records = caches.entry(scope).or_default();
            for (namespace, records) in namespaces {
                let ns_records = scope_records.entry(namespace).or_default();
                for (key, value) in records {
                    match serde_json::from_value::<CacheRecord>(value) {
                        Ok(record) => {
                            ns_records.insert(key, record);
                        }
                        Err(e) => {
                            warn!("Dropping malformed cache record '{}': {}", key, e);
                            dropped += 1;
                        }
                    }
                }
            }
        }

        let mut failed = VecDeque::new();
        for value in raw.failed {
            match serde_json::from_value::<FailedEntry>(value) {
                Ok(entry) => failed.push_back(entry),
                Err(e) => {
                    warn!("Dropping malformed failed-entry record: {}", e);
                    dropped += 1;
                }
            }
        }
        failed.truncate(MAX_FAILED_ENTRIES);

        if dropped > 0 {
            info!("Session loaded with {} malformed records dropped", dropped);
        }

        SessionData {
            version: SESSION_VERSION,
            caches,
            failed,
        }
    }

    /// Persist the session. A no-op for in-memory sessions.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Session(format!(
                        "Failed to create session directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let content = {
            let data = self.data.read();
            serde_json::to_string_pretty(&*data)?
        };

        // Write to a temporary file first, then rename (atomic operation)
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content).map_err(|e| {
            Error::Session(format!(
                "Failed to write session to '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
        fs::rename(&temp_path, path).map_err(|e| {
            Error::Session(format!(
                "Failed to rename session file '{}' to '{}': {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        debug!("Saved session to {}", path.display());
        Ok(())
    }

    /// A cache handle scoped to `scope` (a task name, or
    /// [`crate::cache::SHARED_SCOPE`]).
    pub fn cache(&self, scope: &str) -> ScopedCache {
        ScopedCache::new(Arc::clone(&self.data), scope)
    }

    pub fn failure_sink(&self) -> FailureSink {
        FailureSink {
            data: Arc::clone(&self.data),
        }
    }

    pub fn failed(&self) -> Vec<FailedEntry> {
        self.data.read().failed.iter().cloned().collect()
    }

    pub fn clear_failed(&self) {
        self.data.write().failed.clear();
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Handle tasks use to report failed entries into the bounded
/// process-wide list.
#[derive(Clone)]
pub struct FailureSink {
    data: Arc<RwLock<SessionData>>,
}

impl FailureSink {
    pub fn record(
        &self,
        title: impl Into<String>,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) {
        let mut data = self.data.write();
        data.failed.push_front(FailedEntry {
            title: title.into(),
            url: url.into(),
            reason: reason.into(),
            failed_at: Utc::now(),
        });
        data.failed.truncate(MAX_FAILED_ENTRIES);
    }
}
