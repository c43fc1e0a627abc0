//! Network-aware sync orchestration.
//!
//! The [`SyncEngine`] bulk-loads registered data modules into the cache
//! in priority order, tracks progress and status for subscribers, and
//! owns the persisted queue of actions taken while offline. Delivery is
//! best-effort with a bounded retry budget: an action that keeps
//! failing is dropped and reported only in the logs, because the UI
//! already showed its optimistic result long ago.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::{entry::format_age_minutes, CacheEngine};
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::remote::{RemoteBackend, RemoteError};
use crate::store::KeyValueStore;

use super::action::{ActionPayload, OfflineAction};
use super::module::DataModule;

// ============================================================================
// Persisted keys
// ============================================================================

/// Serialized offline action queue
const QUEUE_KEY: &str = "offline_action_queue";

/// Serialized status summary (only `last_sync_time` is read back)
const STATUS_KEY: &str = "sync_status";

/// Set once the first full load has succeeded
const INITIAL_LOAD_KEY: &str = "initial_load_complete";

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFreshness {
    Fresh,
    Stale,
    Offline,
}

/// Snapshot of the engine's externally visible state.
///
/// Purely informational: freshness drives UI banners and never blocks a
/// read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub is_syncing: bool,
    /// 0-100, recomputed after every module during a bulk sync.
    pub sync_progress: u8,
    pub pending_actions_count: usize,
    pub data_freshness: DataFreshness,
}

impl SyncStatus {
    /// Human-readable age of the last successful sync ("never", "5m ago").
    pub fn last_sync_display(&self) -> String {
        match self.last_sync_time {
            Some(t) => format_age_minutes((Utc::now() - t).num_minutes()),
            None => "never".to_string(),
        }
    }
}

pub type SyncListener = Box<dyn Fn(&SyncStatus) + Send + Sync>;

/// Mutable state shared across engine handles.
struct SyncState {
    connectivity: ConnectivityState,
    last_sync_time: Option<DateTime<Utc>>,
    sync_progress: u8,
    queue: Vec<OfflineAction>,
}

// ============================================================================
// Engine
// ============================================================================

/// Orchestrates bulk data loads and offline action delivery.
///
/// Clone is cheap; handles share all state, so a clone can be moved into
/// a background task to flush the queue without blocking the caller.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn KeyValueStore>,
    cache: CacheEngine,
    remote: Arc<dyn RemoteBackend>,
    monitor: Arc<dyn ConnectivityMonitor>,
    modules: Arc<Vec<DataModule>>,
    config: SyncConfig,
    state: Arc<Mutex<SyncState>>,
    listeners: Arc<Mutex<Vec<(u64, SyncListener)>>>,
    next_listener_id: Arc<AtomicU64>,
    /// Guards `perform_initial_load` and `sync_all_data` together; the
    /// two entry points must never overlap.
    syncing: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        cache: CacheEngine,
        remote: Arc<dyn RemoteBackend>,
        monitor: Arc<dyn ConnectivityMonitor>,
        modules: Vec<DataModule>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            cache,
            remote,
            monitor,
            modules: Arc::new(modules),
            config,
            state: Arc::new(Mutex::new(SyncState {
                connectivity: ConnectivityState::default(),
                last_sync_time: None,
                sync_progress: 0,
                queue: Vec::new(),
            })),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: Arc::new(AtomicU64::new(0)),
            syncing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restore persisted queue and status, then take the first
    /// connectivity reading.
    pub async fn init(&self) {
        let queue = match self.store.get_string(QUEUE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<OfflineAction>>(&raw) {
                Ok(queue) => queue,
                Err(e) => {
                    warn!(error = %e, "Persisted action queue unreadable, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Could not read persisted action queue");
                Vec::new()
            }
        };

        let last_sync_time = match self.store.get_string(STATUS_KEY).await {
            Ok(Some(raw)) => serde_json::from_str::<SyncStatus>(&raw)
                .map(|status| status.last_sync_time)
                .unwrap_or(None),
            _ => None,
        };

        let connectivity = self.monitor.fetch_current_state().await;
        let pending = queue.len();

        {
            let mut state = self.state.lock().await;
            state.queue = queue;
            state.last_sync_time = last_sync_time;
            state.connectivity = connectivity;
        }

        debug!(
            pending,
            online = connectivity.is_online(),
            "Sync engine initialized"
        );
        self.notify().await;
    }

    // =========================================================================
    // Status and subscriptions
    // =========================================================================

    pub async fn status(&self) -> SyncStatus {
        let state = self.state.lock().await;
        self.snapshot(&state)
    }

    fn snapshot(&self, state: &SyncState) -> SyncStatus {
        let is_online = state.connectivity.is_online();
        let data_freshness = if !is_online {
            DataFreshness::Offline
        } else {
            match state.last_sync_time {
                None => DataFreshness::Stale,
                Some(t) if Utc::now() - t > self.config.freshness_window => DataFreshness::Stale,
                Some(_) => DataFreshness::Fresh,
            }
        };

        SyncStatus {
            is_online,
            last_sync_time: state.last_sync_time,
            is_syncing: self.syncing.load(Ordering::SeqCst),
            sync_progress: state.sync_progress,
            pending_actions_count: state.queue.len(),
            data_freshness,
        }
    }

    /// Register a status listener; returns the id to pass to
    /// [`unsubscribe`](Self::unsubscribe).
    pub async fn subscribe<F>(&self, listener: F) -> u64
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().await.push((id, Box::new(listener)));
        id
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.listeners.lock().await.retain(|(lid, _)| *lid != id);
    }

    /// Push the current status to every listener. A panicking listener
    /// is isolated and logged so it cannot starve the others.
    async fn notify(&self) {
        let status = self.status().await;
        let listeners = self.listeners.lock().await;
        for (id, listener) in listeners.iter() {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&status))).is_err() {
                error!(listener = id, "Status listener panicked");
            }
        }
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    /// Feed a reachability change event from the platform monitor.
    ///
    /// Coming back online flushes the pending action queue; going
    /// offline only updates status.
    pub async fn handle_connectivity_change(&self, connectivity: ConnectivityState) {
        let was_online = {
            let mut state = self.state.lock().await;
            let was = state.connectivity.is_online();
            state.connectivity = connectivity;
            was
        };
        let now_online = connectivity.is_online();
        self.notify().await;

        if !was_online && now_online {
            info!("Connectivity restored, flushing pending actions");
            self.sync_pending_actions().await;
        } else if was_online && !now_online {
            debug!("Went offline");
        }
    }

    pub async fn is_online(&self) -> bool {
        self.state.lock().await.connectivity.is_online()
    }

    // =========================================================================
    // Bulk sync
    // =========================================================================

    /// One-time first population of the cache.
    ///
    /// Idempotent across launches: once a run has succeeded the
    /// persisted flag short-circuits every later call.
    pub async fn perform_initial_load(&self) -> bool {
        match self.store.get_string(INITIAL_LOAD_KEY).await {
            Ok(Some(flag)) if flag == "true" => {
                debug!("Initial load already complete, skipping");
                return true;
            }
            _ => {}
        }

        if !self.begin_sync().await {
            return false;
        }
        info!(modules = self.modules.len(), "Starting initial load");

        if !self.run_modules().await {
            self.abort_sync().await;
            return false;
        }

        if let Err(e) = self.store.set_string(INITIAL_LOAD_KEY, "true").await {
            warn!(error = %e, "Could not persist initial-load flag");
        }
        self.finish_sync().await;
        true
    }

    /// Re-populate every module and flush the action queue.
    ///
    /// Safe to call repeatedly (pull-to-refresh); returns false without
    /// doing anything when a sync is already running.
    pub async fn sync_all_data(&self) -> bool {
        if !self.begin_sync().await {
            debug!("Sync already in progress, refusing to start another");
            return false;
        }
        info!(modules = self.modules.len(), "Starting full sync");

        if !self.run_modules().await {
            self.abort_sync().await;
            return false;
        }

        self.flush_queue().await;
        self.finish_sync().await;
        true
    }

    async fn begin_sync(&self) -> bool {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        {
            let mut state = self.state.lock().await;
            state.sync_progress = 0;
        }
        self.notify().await;
        true
    }

    /// Walk the module list in declared order, caching each snapshot and
    /// notifying after every module so progress bars animate smoothly.
    async fn run_modules(&self) -> bool {
        let total = self.modules.len();
        if total == 0 {
            let mut state = self.state.lock().await;
            state.sync_progress = 100;
            return true;
        }

        let mut completed = 0usize;
        for module in self.modules.iter() {
            match module.load().await {
                Ok(snapshot) => {
                    if !self
                        .cache
                        .set(&module.cache_key, &snapshot, Some(module.ttl))
                        .await
                    {
                        warn!(module = %module.key, "Module snapshot was not cached");
                    }
                    completed += 1;
                    debug!(module = %module.key, "Module synced");
                }
                Err(e) if module.is_critical => {
                    error!(module = %module.key, error = %e, "Critical module failed, aborting sync");
                    return false;
                }
                Err(e) => {
                    warn!(module = %module.key, error = %e, "Module failed, skipping");
                }
            }

            {
                let mut state = self.state.lock().await;
                state.sync_progress = ((completed * 100) / total) as u8;
            }
            self.notify().await;
        }

        true
    }

    async fn finish_sync(&self) {
        {
            let mut state = self.state.lock().await;
            state.last_sync_time = Some(Utc::now());
        }
        self.syncing.store(false, Ordering::SeqCst);
        self.persist_status().await;
        self.notify().await;
        info!("Sync complete");
    }

    async fn abort_sync(&self) {
        self.syncing.store(false, Ordering::SeqCst);
        self.notify().await;
    }

    // =========================================================================
    // Action queue
    // =========================================================================

    /// Record a user action for delivery, persist the queue, and (when
    /// online) kick off a best-effort flush that does not block the
    /// caller. Returns the action id.
    pub async fn queue_action(&self, action: ActionPayload) -> String {
        let action = OfflineAction::new(action);
        let id = action.id.clone();

        let online = {
            let mut state = self.state.lock().await;
            state.queue.push(action);
            state.connectivity.is_online()
        };
        self.persist_queue().await;
        self.notify().await;

        if online {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.sync_pending_actions().await;
            });
        }

        id
    }

    /// Attempt delivery of every queued action. No-op while offline or
    /// with an empty queue.
    ///
    /// Each failure bumps the action's retry count; at the limit the
    /// action is dropped permanently and only the log records it. This
    /// at-most-N best-effort model is deliberate for engagement data -
    /// the user saw their optimistic result long before this runs.
    pub async fn sync_pending_actions(&self) {
        let (online, batch) = {
            let state = self.state.lock().await;
            (state.connectivity.is_online(), state.queue.clone())
        };
        if !online || batch.is_empty() {
            return;
        }
        debug!(pending = batch.len(), "Flushing action queue");

        let batch_ids: HashSet<String> = batch.iter().map(|a| a.id.clone()).collect();
        let mut survivors = Vec::new();
        let mut delivered = 0usize;
        let mut dropped = 0usize;

        for mut action in batch {
            match self.dispatch(&action.action).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(id = %action.id, "Action delivered");
                }
                Err(e) => {
                    action.retry_count += 1;
                    if action.retry_count >= self.config.max_action_retries {
                        warn!(
                            id = %action.id,
                            kind = action.action.kind(),
                            attempts = action.retry_count,
                            error = %e,
                            "Action dropped after exhausting retries"
                        );
                        dropped += 1;
                    } else {
                        debug!(
                            id = %action.id,
                            retry_count = action.retry_count,
                            error = %e,
                            "Action delivery failed, will retry"
                        );
                        survivors.push(action);
                    }
                }
            }
        }

        {
            let mut state = self.state.lock().await;
            // keep anything enqueued while this pass was running
            let late: Vec<OfflineAction> = state
                .queue
                .drain(..)
                .filter(|a| !batch_ids.contains(&a.id))
                .collect();
            state.queue = survivors;
            state.queue.extend(late);
        }
        self.persist_queue().await;
        self.notify().await;

        if delivered > 0 || dropped > 0 {
            info!(delivered, dropped, "Action queue flush complete");
        }
    }

    async fn dispatch(&self, action: &ActionPayload) -> Result<(), RemoteError> {
        match action {
            ActionPayload::Vote {
                poll_id,
                option_id,
                user_id,
            } => self.remote.submit_vote(poll_id, option_id, user_id).await,
            ActionPayload::Follow { payload } => self.remote.update_follow(payload).await,
            ActionPayload::Calculation { payload } => self.remote.save_calculation(payload).await,
            ActionPayload::Favorite { payload } => self.remote.update_favorite(payload).await,
            ActionPayload::Feedback { payload } => self.remote.submit_feedback(payload).await,
        }
    }

    /// Queue flush as part of a full sync; factored out so the bulk path
    /// reads top-to-bottom.
    async fn flush_queue(&self) {
        self.sync_pending_actions().await;
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    async fn persist_queue(&self) {
        let raw = {
            let state = self.state.lock().await;
            match serde_json::to_string(&state.queue) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Could not serialize action queue");
                    return;
                }
            }
        };
        if let Err(e) = self.store.set_string(QUEUE_KEY, &raw).await {
            warn!(error = %e, "Could not persist action queue");
        }
    }

    async fn persist_status(&self) {
        let status = self.status().await;
        let raw = match serde_json::to_string(&status) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Could not serialize sync status");
                return;
            }
        };
        if let Err(e) = self.store.set_string(STATUS_KEY, &raw).await {
            debug!(error = %e, "Could not persist sync status");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
