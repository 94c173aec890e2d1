//! Change notifications between sibling contexts (tabs, windows, processes)
//! that share one persistent store.
//!
//! This is separate from the in-process `EventBus`: a write lands in the
//! shared `shared_signals` table, siblings notice it by polling, and the
//! writing context gets an immediate companion event of its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::signal_repo;
use crate::errors::SignalError;

pub const FAVORITES_UPDATED_KEY: &str = "favorites_updated";

const CHANNEL_CAPACITY: usize = 32;

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, SignalError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), SignalError>;
}

pub struct SqliteSignalStore {
    pool: SqlitePool,
}

impl SqliteSignalStore {
    pub async fn connect(database_url: &str) -> Result<Self, SignalError> {
        let pool = SqlitePoolOptions::new().connect(database_url).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, SignalError> {
        signal_repo::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SignalStore for SqliteSignalStore {
    async fn read(&self, key: &str) -> Result<Option<String>, SignalError> {
        Ok(signal_repo::load_signal(&self.pool, key).await?)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), SignalError> {
        signal_repo::write_signal(&self.pool, key, value).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOrigin {
    /// Written by this context.
    Local,
    /// Observed in the shared store, written by a sibling.
    Sibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalChange {
    pub key: String,
    pub value: String,
    pub origin: SignalOrigin,
}

pub struct CrossTabSignal {
    store: Arc<dyn SignalStore>,
    key: String,
    context_id: Uuid,
    // Held across store round trips so a poll never mistakes our own write
    // for a sibling's.
    last_seen: Mutex<Option<String>>,
    changes: broadcast::Sender<SignalChange>,
}

impl CrossTabSignal {
    /// Opens the channel for `key`; whatever value is already stored counts
    /// as seen.
    pub async fn open(store: Arc<dyn SignalStore>, key: &str) -> Result<Self, SignalError> {
        let current = store.read(key).await?;
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            store,
            key: key.to_string(),
            context_id: Uuid::new_v4(),
            last_seen: Mutex::new(current),
            changes,
        })
    }

    pub async fn favorites(store: Arc<dyn SignalStore>) -> Result<Self, SignalError> {
        Self::open(store, FAVORITES_UPDATED_KEY).await
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalChange> {
        self.changes.subscribe()
    }

    /// Writes `key = <unix millis>-<context id>` to the shared store and
    /// emits the same-context companion event. A sibling write that landed
    /// since the last look is reported first, so it is never overwritten
    /// unseen.
    pub async fn notify(&self) -> Result<SignalChange, SignalError> {
        let mut last_seen = self.last_seen.lock().await;

        let current = self.store.read(&self.key).await?;
        if let Some(value) = current {
            if last_seen.as_deref() != Some(value.as_str()) {
                *last_seen = Some(value.clone());
                self.emit_sibling(value);
            }
        }

        // Millis never go backwards for one key; the context id keeps two
        // writers in the same millisecond apart.
        let previous = last_seen.as_deref().and_then(stamp_millis).unwrap_or(0);
        let stamp = Utc::now().timestamp_millis().max(previous + 1);
        let value = format!("{stamp}-{}", self.context_id.simple());

        self.store.write(&self.key, &value).await?;
        *last_seen = Some(value.clone());

        let change = SignalChange {
            key: self.key.clone(),
            value,
            origin: SignalOrigin::Local,
        };
        let listeners = self.changes.send(change.clone()).unwrap_or(0);
        debug!(key = %self.key, value = %change.value, listeners, "cross_tab_signal_written");
        Ok(change)
    }

    /// Checks the shared store once; returns the change if a sibling wrote a
    /// new value since the last look.
    pub async fn poll_once(&self) -> Result<Option<SignalChange>, SignalError> {
        let mut last_seen = self.last_seen.lock().await;
        let current = self.store.read(&self.key).await?;

        let Some(value) = current else {
            return Ok(None);
        };
        if last_seen.as_deref() == Some(value.as_str()) {
            return Ok(None);
        }
        *last_seen = Some(value.clone());
        Ok(Some(self.emit_sibling(value)))
    }

    fn emit_sibling(&self, value: String) -> SignalChange {
        let change = SignalChange {
            key: self.key.clone(),
            value,
            origin: SignalOrigin::Sibling,
        };
        let _ = self.changes.send(change.clone());
        info!(key = %self.key, value = %change.value, "cross_tab_signal_observed");
        change
    }

    /// Polls the shared store every `interval` until the returned watcher is
    /// stopped or dropped.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> SignalWatcher {
        let signal = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = signal.poll_once().await {
                    warn!(key = %signal.key, error = %e, "cross_tab_signal_poll_failed");
                }
            }
        });
        SignalWatcher { handle }
    }
}

fn stamp_millis(value: &str) -> Option<i64> {
    value.split('-').next()?.parse().ok()
}

pub struct SignalWatcher {
    handle: JoinHandle<()>,
}

impl SignalWatcher {
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
