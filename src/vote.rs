//! Local-first poll voting.
//!
//! Votes must feel instant on any connection, so the order of
//! operations is fixed: tallies change in memory first, both the voted
//! map and the tallies are persisted second, and the remote submission
//! happens last as fire-and-forget. A failed submission is logged and
//! forgotten - votes deliberately do NOT go through the sync engine's
//! retry queue, the one asymmetry in the offline design.
//!
//! One vote per poll per device: once a poll id is in the voted map the
//! handler is a silent no-op, never an error, because the user is
//! already looking at the results.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::CacheEngine;
use crate::connectivity::ConnectivityMonitor;
use crate::models::{Poll, UserIdentity};
use crate::remote::RemoteBackend;
use crate::store::KeyValueStore;

/// Persisted poll-id -> option-id map
const VOTED_KEY: &str = "voted_polls";

/// Cache key for the aggregate tallies
const POLLS_CACHE_KEY: &str = "polls";

/// Tallies are the canonical local record; a year keeps them clear of
/// the cleanup scan for the life of an install.
const POLL_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    /// Vote recorded; the updated poll is returned for the UI.
    Recorded(Poll),
    /// This device already voted; carries the previously chosen option.
    AlreadyVoted(String),
    UnknownPoll,
    UnknownOption,
}

/// Vote state for the poll feature.
///
/// Clone is cheap; handles share the underlying maps.
#[derive(Clone)]
pub struct VoteManager {
    store: Arc<dyn KeyValueStore>,
    cache: CacheEngine,
    remote: Arc<dyn RemoteBackend>,
    monitor: Arc<dyn ConnectivityMonitor>,
    polls: Arc<Mutex<Vec<Poll>>>,
    voted: Arc<Mutex<HashMap<String, String>>>,
}

impl VoteManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        cache: CacheEngine,
        remote: Arc<dyn RemoteBackend>,
        monitor: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            cache,
            remote,
            monitor,
            polls: Arc::new(Mutex::new(Vec::new())),
            voted: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seed the poll list and restore persisted state.
    ///
    /// `initial_polls` is the shipped dataset; any locally recorded
    /// tallies overlay it per poll id so votes survive dataset updates.
    pub async fn load(&self, initial_polls: Vec<Poll>) {
        let voted = match self.store.get_string(VOTED_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(error = %e, "Voted map unreadable, starting empty");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "Could not read voted map");
                HashMap::new()
            }
        };

        let cached: Option<Vec<Poll>> = self.cache.get(POLLS_CACHE_KEY).await;
        let merged = match cached {
            Some(cached) => {
                let mut polls = initial_polls;
                for poll in polls.iter_mut() {
                    if let Some(local) = cached.iter().find(|c| c.id == poll.id) {
                        *poll = local.clone();
                    }
                }
                polls
            }
            None => initial_polls,
        };

        *self.voted.lock().await = voted;
        *self.polls.lock().await = merged;
    }

    /// Record a vote.
    ///
    /// The in-memory tallies and voted map are updated before any store
    /// or network I/O, so the caller can render the result on the same
    /// interaction frame. The remote push is spawned and its outcome is
    /// ignored for UI purposes.
    pub async fn cast_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        user: Option<&UserIdentity>,
    ) -> VoteOutcome {
        let snapshot = {
            let mut voted = self.voted.lock().await;
            if let Some(existing) = voted.get(poll_id) {
                debug!(poll_id, option = %existing, "Vote already recorded, ignoring");
                return VoteOutcome::AlreadyVoted(existing.clone());
            }

            let mut polls = self.polls.lock().await;
            let poll = match polls.iter_mut().find(|p| p.id == poll_id) {
                Some(poll) => poll,
                None => {
                    warn!(poll_id, "Vote for unknown poll ignored");
                    return VoteOutcome::UnknownPoll;
                }
            };
            if !poll.record_vote(option_id) {
                warn!(poll_id, option_id, "Vote for unknown option ignored");
                return VoteOutcome::UnknownOption;
            }

            voted.insert(poll_id.to_string(), option_id.to_string());
            poll.clone()
        };

        self.persist().await;

        if let Some(user) = user {
            if self.monitor.fetch_current_state().await.is_online() {
                let remote = self.remote.clone();
                let poll_id = poll_id.to_string();
                let option_id = option_id.to_string();
                let user_id = user.user_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = remote.submit_vote(&poll_id, &option_id, &user_id).await {
                        debug!(poll_id = %poll_id, error = %e, "Vote submission failed, keeping local result");
                    }
                });
            }
        }

        VoteOutcome::Recorded(snapshot)
    }

    pub async fn has_voted(&self, poll_id: &str) -> Option<String> {
        self.voted.lock().await.get(poll_id).cloned()
    }

    pub async fn polls(&self) -> Vec<Poll> {
        self.polls.lock().await.clone()
    }

    async fn persist(&self) {
        let raw = {
            let voted = self.voted.lock().await;
            serde_json::to_string(&*voted)
        };
        match raw {
            Ok(raw) => {
                if let Err(e) = self.store.set_string(VOTED_KEY, &raw).await {
                    warn!(error = %e, "Could not persist voted map");
                }
            }
            Err(e) => warn!(error = %e, "Could not serialize voted map"),
        }

        let polls = self.polls.lock().await.clone();
        if !self
            .cache
            .set(POLLS_CACHE_KEY, &polls, Some(Duration::days(POLL_TTL_DAYS)))
            .await
        {
            warn!("Could not cache poll tallies");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::connectivity::ConnectivityState;
    use crate::models::PollOption;
    use crate::remote::RemoteError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[derive(Default)]
    struct CountingRemote {
        votes: AtomicUsize,
    }

    #[async_trait]
    impl RemoteBackend for CountingRemote {
        async fn submit_vote(&self, _: &str, _: &str, _: &str) -> Result<(), RemoteError> {
            self.votes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn update_follow(&self, _: &Value) -> Result<(), RemoteError> {
            Ok(())
        }
        async fn save_calculation(&self, _: &Value) -> Result<(), RemoteError> {
            Ok(())
        }
        async fn update_favorite(&self, _: &Value) -> Result<(), RemoteError> {
            Ok(())
        }
        async fn submit_feedback(&self, _: &Value) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    struct FixedMonitor(ConnectivityState);

    #[async_trait]
    impl ConnectivityMonitor for FixedMonitor {
        async fn fetch_current_state(&self) -> ConnectivityState {
            self.0
        }
    }

    fn sample_polls() -> Vec<Poll> {
        vec![Poll {
            id: "poll-1".to_string(),
            question: "Best city for CS?".to_string(),
            options: vec![
                PollOption {
                    id: "lhr".to_string(),
                    label: "Lahore".to_string(),
                    votes: 0,
                },
                PollOption {
                    id: "isb".to_string(),
                    label: "Islamabad".to_string(),
                    votes: 0,
                },
            ],
        }]
    }

    async fn manager(state: ConnectivityState) -> (Arc<MemoryStore>, Arc<CountingRemote>, VoteManager) {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheEngine::new(store.clone(), CacheConfig::default());
        let remote = Arc::new(CountingRemote::default());
        let manager = VoteManager::new(
            store.clone(),
            cache,
            remote.clone(),
            Arc::new(FixedMonitor(state)),
        );
        manager.load(sample_polls()).await;
        (store, remote, manager)
    }

    #[tokio::test]
    async fn vote_updates_tally_immediately() {
        let (_, _, manager) = manager(ConnectivityState::offline()).await;

        match manager.cast_vote("poll-1", "lhr", None).await {
            VoteOutcome::Recorded(poll) => {
                assert_eq!(poll.options[0].votes, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(manager.has_voted("poll-1").await, Some("lhr".to_string()));
    }

    #[tokio::test]
    async fn second_vote_is_a_noop() {
        let (_, remote, manager) = manager(ConnectivityState::online()).await;

        manager
            .cast_vote("poll-1", "lhr", Some(&UserIdentity::new("u-1")))
            .await;
        let outcome = manager
            .cast_vote("poll-1", "isb", Some(&UserIdentity::new("u-1")))
            .await;

        assert_eq!(outcome, VoteOutcome::AlreadyVoted("lhr".to_string()));
        let polls = manager.polls().await;
        assert_eq!(polls[0].options[0].votes, 1);
        assert_eq!(polls[0].options[1].votes, 0);

        // give the single spawned submission a moment to land
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(remote.votes.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn unknown_targets_are_rejected() {
        let (_, _, manager) = manager(ConnectivityState::offline()).await;
        assert_eq!(
            manager.cast_vote("poll-9", "lhr", None).await,
            VoteOutcome::UnknownPoll
        );
        assert_eq!(
            manager.cast_vote("poll-1", "khi", None).await,
            VoteOutcome::UnknownOption
        );
        assert_eq!(manager.has_voted("poll-1").await, None);
    }

    #[tokio::test]
    async fn offline_vote_skips_remote_but_persists() {
        let (store, remote, manager) = manager(ConnectivityState::offline()).await;

        manager
            .cast_vote("poll-1", "isb", Some(&UserIdentity::new("u-1")))
            .await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(remote.votes.load(Ordering::SeqCst), 0);

        // state survives a fresh manager on the same store
        let cache = CacheEngine::new(store.clone(), CacheConfig::default());
        let fresh = VoteManager::new(
            store,
            cache,
            Arc::new(CountingRemote::default()),
            Arc::new(FixedMonitor(ConnectivityState::offline())),
        );
        fresh.load(sample_polls()).await;
        assert_eq!(fresh.has_voted("poll-1").await, Some("isb".to_string()));
        assert_eq!(fresh.polls().await[0].options[1].votes, 1);
    }

    #[tokio::test]
    async fn online_vote_reaches_remote() {
        let (_, remote, manager) = manager(ConnectivityState::online()).await;

        manager
            .cast_vote("poll-1", "lhr", Some(&UserIdentity::new("u-1")))
            .await;

        let mut submitted = 0;
        for _ in 0..50 {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            submitted = remote.votes.load(Ordering::SeqCst);
            if submitted > 0 {
                break;
            }
        }
        assert_eq!(submitted, 1);
    }

    #[tokio::test]
    async fn anonymous_vote_never_reaches_remote() {
        let (_, remote, manager) = manager(ConnectivityState::online()).await;
        manager.cast_vote("poll-1", "lhr", None).await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(remote.votes.load(Ordering::SeqCst), 0);
    }
}
