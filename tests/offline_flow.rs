//! End-to-end offline behavior: bulk load, queue while offline,
//! reconnect flush, and the voting asymmetry, all against in-memory
//! fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use taleem_sync::{
    ActionPayload, CacheConfig, CacheEngine, ConnectivityMonitor, ConnectivityState, DataFreshness,
    DataModule, MemoryStore, Poll, PollOption, RemoteBackend, RemoteError, SyncConfig, SyncEngine,
    SyncStatus, UserIdentity, VoteManager, VoteOutcome,
};

// ============================================================================
// Fakes
// ============================================================================

/// Records every submission; can be switched between accepting and
/// rejecting at runtime.
#[derive(Default)]
struct FakeBackend {
    reject: AtomicBool,
    votes: Mutex<Vec<(String, String, String)>>,
    follows: AtomicUsize,
    favorites: AtomicUsize,
    feedback: AtomicUsize,
    calculations: AtomicUsize,
}

impl FakeBackend {
    fn check(&self) -> Result<(), RemoteError> {
        if self.reject.load(Ordering::SeqCst) {
            Err(RemoteError::UnexpectedResponse("rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteBackend for FakeBackend {
    async fn submit_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        user_id: &str,
    ) -> Result<(), RemoteError> {
        self.check()?;
        self.votes.lock().await.push((
            poll_id.to_string(),
            option_id.to_string(),
            user_id.to_string(),
        ));
        Ok(())
    }

    async fn update_follow(&self, _: &Value) -> Result<(), RemoteError> {
        self.check()?;
        self.follows.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_calculation(&self, _: &Value) -> Result<(), RemoteError> {
        self.check()?;
        self.calculations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_favorite(&self, _: &Value) -> Result<(), RemoteError> {
        self.check()?;
        self.favorites.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn submit_feedback(&self, _: &Value) -> Result<(), RemoteError> {
        self.check()?;
        self.feedback.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeMonitor(ConnectivityState);

#[async_trait]
impl ConnectivityMonitor for FakeMonitor {
    async fn fetch_current_state(&self) -> ConnectivityState {
        self.0
    }
}

fn reference_modules() -> Vec<DataModule> {
    vec![
        DataModule::new(
            "universities",
            "Universities",
            "universities",
            Duration::hours(24),
            || async {
                Ok(json!([
                    {"name": "NUST", "city": "Islamabad"},
                    {"name": "LUMS", "city": "Lahore"},
                ]))
            },
        )
        .critical(),
        DataModule::new(
            "scholarships",
            "Scholarships",
            "scholarships",
            Duration::hours(24),
            || async { Ok(json!([{"name": "HEC Need-Based"}])) },
        ),
        DataModule::new(
            "careers",
            "Careers",
            "careers",
            Duration::hours(12),
            || async { Ok(json!([{"field": "Software Engineering"}])) },
        ),
    ]
}

struct World {
    store: Arc<MemoryStore>,
    backend: Arc<FakeBackend>,
    cache: CacheEngine,
    sync: SyncEngine,
}

async fn world(start: ConnectivityState) -> World {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(FakeBackend::default());
    let cache = CacheEngine::new(store.clone(), CacheConfig::default());
    cache.init().await;
    let sync = SyncEngine::new(
        store.clone(),
        cache.clone(),
        backend.clone(),
        Arc::new(FakeMonitor(start)),
        reference_modules(),
        SyncConfig::default(),
    );
    sync.init().await;
    World {
        store,
        backend,
        cache,
        sync,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn initial_load_fills_cache_in_module_order() {
    let w = world(ConnectivityState::online()).await;

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    w.sync
        .subscribe(move |status: &SyncStatus| {
            if let Ok(mut seen) = sink.lock() {
                seen.push(status.sync_progress);
            }
        })
        .await;

    assert!(w.sync.perform_initial_load().await);

    let universities: Option<Value> = w.cache.get("universities").await;
    assert!(universities.is_some());
    let scholarships: Option<Value> = w.cache.get("scholarships").await;
    assert!(scholarships.is_some());
    let careers: Option<Value> = w.cache.get("careers").await;
    assert!(careers.is_some());

    // progress stepped through every module, not just 0 -> 100
    let progress = seen.lock().unwrap().clone();
    assert!(progress.contains(&33));
    assert!(progress.contains(&66));
    assert!(progress.contains(&100));
}

#[tokio::test]
async fn offline_actions_flush_on_reconnect() {
    let w = world(ConnectivityState::offline()).await;

    w.sync
        .queue_action(ActionPayload::Follow {
            payload: json!({"careerId": "se-1"}),
        })
        .await;
    w.sync
        .queue_action(ActionPayload::Favorite {
            payload: json!({"universityId": "nust"}),
        })
        .await;

    let status = w.sync.status().await;
    assert_eq!(status.pending_actions_count, 2);
    assert_eq!(status.data_freshness, DataFreshness::Offline);
    assert_eq!(w.backend.follows.load(Ordering::SeqCst), 0);

    // both actions go out without any further caller involvement
    w.sync
        .handle_connectivity_change(ConnectivityState::online())
        .await;

    assert_eq!(w.backend.follows.load(Ordering::SeqCst), 1);
    assert_eq!(w.backend.favorites.load(Ordering::SeqCst), 1);
    assert_eq!(w.sync.status().await.pending_actions_count, 0);
}

#[tokio::test]
async fn rejected_actions_survive_until_the_retry_budget_runs_out() {
    let w = world(ConnectivityState::offline()).await;
    w.backend.reject.store(true, Ordering::SeqCst);

    w.sync
        .queue_action(ActionPayload::Feedback {
            payload: json!({"message": "app bohat acha hai"}),
        })
        .await;

    // attempt 1 on reconnect, 2 and 3 on later flushes
    w.sync
        .handle_connectivity_change(ConnectivityState::online())
        .await;
    assert_eq!(w.sync.status().await.pending_actions_count, 1);
    w.sync.sync_pending_actions().await;
    assert_eq!(w.sync.status().await.pending_actions_count, 1);
    w.sync.sync_pending_actions().await;
    assert_eq!(w.sync.status().await.pending_actions_count, 0);

    // dropped for good: accepting submissions again changes nothing
    w.backend.reject.store(false, Ordering::SeqCst);
    w.sync.sync_pending_actions().await;
    assert_eq!(w.backend.feedback.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn full_sync_flushes_queue_after_modules() {
    let w = world(ConnectivityState::offline()).await;

    w.sync
        .queue_action(ActionPayload::Calculation {
            payload: json!({"matric": 980, "inter": 890}),
        })
        .await;

    // the reconnect flush burns one attempt against a rejecting backend,
    // leaving the action queued for the full sync to deliver
    w.backend.reject.store(true, Ordering::SeqCst);
    w.sync
        .handle_connectivity_change(ConnectivityState::online())
        .await;
    assert_eq!(w.sync.status().await.pending_actions_count, 1);

    w.backend.reject.store(false, Ordering::SeqCst);
    assert!(w.sync.sync_all_data().await);
    assert_eq!(w.backend.calculations.load(Ordering::SeqCst), 1);
    assert_eq!(w.sync.status().await.pending_actions_count, 0);
}

#[tokio::test]
async fn voting_stays_out_of_the_action_queue() {
    let w = world(ConnectivityState::offline()).await;
    let vote_manager = VoteManager::new(
        w.store.clone(),
        w.cache.clone(),
        w.backend.clone(),
        Arc::new(FakeMonitor(ConnectivityState::offline())),
    );
    vote_manager
        .load(vec![Poll {
            id: "poll-1".to_string(),
            question: "Hostel or day scholar?".to_string(),
            options: vec![
                PollOption {
                    id: "hostel".to_string(),
                    label: "Hostel".to_string(),
                    votes: 0,
                },
                PollOption {
                    id: "day".to_string(),
                    label: "Day scholar".to_string(),
                    votes: 0,
                },
            ],
        }])
        .await;

    let outcome = vote_manager
        .cast_vote("poll-1", "hostel", Some(&UserIdentity::new("u-7")))
        .await;
    assert!(matches!(outcome, VoteOutcome::Recorded(_)));

    // the offline vote never became a queued action: reconnecting the
    // sync engine delivers nothing
    w.sync
        .handle_connectivity_change(ConnectivityState::online())
        .await;
    assert!(w.backend.votes.lock().await.is_empty());
    assert_eq!(w.sync.status().await.pending_actions_count, 0);

    // but the local result is durable
    assert_eq!(
        vote_manager.has_voted("poll-1").await,
        Some("hostel".to_string())
    );
}

#[tokio::test]
async fn cached_snapshots_are_batch_readable() {
    let w = world(ConnectivityState::online()).await;
    assert!(w.sync.sync_all_data().await);

    let snapshots: HashMap<String, Value> = w
        .cache
        .get_many(&["universities", "scholarships", "careers", "absent"])
        .await;
    assert_eq!(snapshots.len(), 3);
    assert!(snapshots.contains_key("universities"));
}

#[tokio::test]
async fn status_persists_across_restart() {
    let store = {
        let w = world(ConnectivityState::online()).await;
        assert!(w.sync.sync_all_data().await);
        w.store
    };

    let cache = CacheEngine::new(store.clone(), CacheConfig::default());
    let sync = SyncEngine::new(
        store,
        cache,
        Arc::new(FakeBackend::default()),
        Arc::new(FakeMonitor(ConnectivityState::online())),
        Vec::new(),
        SyncConfig::default(),
    );
    sync.init().await;

    let status = sync.status().await;
    assert!(status.last_sync_time.is_some());
    assert_eq!(status.data_freshness, DataFreshness::Fresh);
    assert_ne!(status.last_sync_display(), "never");
}
