//! Engine context
//!
//! The enabled toggle, running counters and a bounded log of recent rewrites,
//! passed explicitly to the engine. Durable state goes through a
//! [`PersistencePort`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::config::defaults::DEFAULT_LOG_RING_CAPACITY;
use crate::errors::AppResult;

const KEY_ENABLED: &str = "enabled";
const KEY_MANIFESTS_PROCESSED: &str = "stats.manifests_processed";
const KEY_SEGMENTS_REMOVED: &str = "stats.segments_removed";
const KEY_CLEAN_SOURCES_FOUND: &str = "stats.clean_sources_found";
const KEY_PASSTHROUGH_FALLBACKS: &str = "stats.passthrough_fallbacks";

/// Key/value store for the toggle and counters
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set(&self, key: &str, value: String) -> AppResult<()>;
}

#[derive(Default)]
pub struct InMemoryPersistence {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistencePort for InMemoryPersistence {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub manifests_processed: u64,
    pub segments_removed: u64,
    pub clean_sources_found: u64,
    pub passthrough_fallbacks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

pub struct EngineContext {
    enabled: AtomicBool,
    manifests_processed: AtomicU64,
    segments_removed: AtomicU64,
    clean_sources_found: AtomicU64,
    passthrough_fallbacks: AtomicU64,
    log: Mutex<VecDeque<LogEntry>>,
    log_capacity: usize,
    persistence: Arc<dyn PersistencePort>,
}

impl EngineContext {
    pub fn new(persistence: Arc<dyn PersistencePort>) -> Self {
        Self::with_log_capacity(persistence, DEFAULT_LOG_RING_CAPACITY)
    }

    pub fn with_log_capacity(persistence: Arc<dyn PersistencePort>, log_capacity: usize) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            manifests_processed: AtomicU64::new(0),
            segments_removed: AtomicU64::new(0),
            clean_sources_found: AtomicU64::new(0),
            passthrough_fallbacks: AtomicU64::new(0),
            log: Mutex::new(VecDeque::with_capacity(log_capacity)),
            log_capacity,
            persistence,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryPersistence::new()))
    }

    /// Restore the toggle and counters. Missing or unparsable values keep their defaults.
    pub async fn load(&self) -> AppResult<()> {
        if let Some(enabled) = self.persistence.get(KEY_ENABLED).await? {
            self.enabled
                .store(enabled.parse().unwrap_or(true), Ordering::Relaxed);
        }
        for (key, counter) in self.counters() {
            if let Some(value) = self.persistence.get(key).await?
                && let Ok(value) = value.parse::<u64>()
            {
                counter.store(value, Ordering::Relaxed);
            }
        }
        debug!("Engine context loaded: {:?}", self.stats());
        Ok(())
    }

    pub async fn flush(&self) -> AppResult<()> {
        self.persistence
            .set(KEY_ENABLED, self.is_enabled().to_string())
            .await?;
        for (key, counter) in self.counters() {
            self.persistence
                .set(key, counter.load(Ordering::Relaxed).to_string())
                .await?;
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn record_manifest(&self, segments_removed: usize, clean_source_found: bool) {
        self.manifests_processed.fetch_add(1, Ordering::Relaxed);
        self.segments_removed
            .fetch_add(segments_removed as u64, Ordering::Relaxed);
        if clean_source_found {
            self.clean_sources_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_passthrough(&self) {
        self.passthrough_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Append to the log ring, dropping the oldest entry when full
    pub async fn log(&self, message: impl Into<String>) {
        if self.log_capacity == 0 {
            return;
        }
        let mut log = self.log.lock().await;
        while log.len() >= self.log_capacity {
            log.pop_front();
        }
        log.push_back(LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Oldest first
    pub async fn recent_log(&self) -> Vec<LogEntry> {
        self.log.lock().await.iter().cloned().collect()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            manifests_processed: self.manifests_processed.load(Ordering::Relaxed),
            segments_removed: self.segments_removed.load(Ordering::Relaxed),
            clean_sources_found: self.clean_sources_found.load(Ordering::Relaxed),
            passthrough_fallbacks: self.passthrough_fallbacks.load(Ordering::Relaxed),
        }
    }

    fn counters(&self) -> [(&'static str, &AtomicU64); 4] {
        [
            (KEY_MANIFESTS_PROCESSED, &self.manifests_processed),
            (KEY_SEGMENTS_REMOVED, &self.segments_removed),
            (KEY_CLEAN_SOURCES_FOUND, &self.clean_sources_found),
            (KEY_PASSTHROUGH_FALLBACKS, &self.passthrough_fallbacks),
        ]
    }
}
