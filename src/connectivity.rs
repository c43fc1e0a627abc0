//! Network reachability capability.
//!
//! Platform reachability detection lives outside the crate; the sync
//! engine consumes it through [`ConnectivityMonitor`] for the one-shot
//! startup reading and through
//! [`SyncEngine::handle_connectivity_change`](crate::sync::SyncEngine::handle_connectivity_change)
//! for change events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub is_connected: bool,
    /// Some platforms can tell that a link is up but the internet is
    /// not actually reachable; `None` means undetermined.
    pub is_internet_reachable: Option<bool>,
}

impl ConnectivityState {
    pub fn online() -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
        }
    }

    /// Undetermined reachability is treated as online; a false negative
    /// here would strand queued actions until the next change event.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable.unwrap_or(true)
    }
}

impl Default for ConnectivityState {
    /// Optimistic until the first monitor reading arrives.
    fn default() -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: None,
        }
    }
}

/// One-shot reachability probe.
#[async_trait]
pub trait ConnectivityMonitor: Send + Sync {
    async fn fetch_current_state(&self) -> ConnectivityState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undetermined_reachability_counts_as_online() {
        let state = ConnectivityState {
            is_connected: true,
            is_internet_reachable: None,
        };
        assert!(state.is_online());
    }

    #[test]
    fn connected_but_unreachable_is_offline() {
        let state = ConnectivityState {
            is_connected: true,
            is_internet_reachable: Some(false),
        };
        assert!(!state.is_online());
    }

    #[test]
    fn disconnected_is_offline() {
        assert!(!ConnectivityState::offline().is_online());
    }
}
