use std::sync::Arc;

use parlor_store::{ChatStore, Interest, Profile, Subscription, Table};
use uuid::Uuid;

use crate::error::AppResult;

/// Keeps the local user's `is_online` flag in step with the view
/// lifecycle and derives the online list. Presence is best-effort:
/// flag-update failures are logged, never surfaced, never awaited by
/// the primary flow. There is no heartbeat — a client that dies without
/// its teardown stays online until corrected externally.
pub struct PresenceTracker {
    store: Arc<dyn ChatStore>,
    profile_id: Uuid,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn ChatStore>, profile_id: Uuid) -> Self {
        Self { store, profile_id }
    }

    /// Fire-and-forget flag update, used on view activation.
    pub fn set_online_detached(&self, online: bool) {
        let store = Arc::clone(&self.store);
        let profile_id = self.profile_id;
        tokio::spawn(async move {
            if let Err(err) = store.set_online(profile_id, online).await {
                tracing::warn!(%profile_id, online, error = %err, "presence update failed");
            }
        });
    }

    /// Awaited-but-swallowed variant for the teardown path, so the
    /// write gets a chance to land before the process exits.
    pub async fn clear_online(&self) {
        if let Err(err) = self.store.set_online(self.profile_id, false).await {
            tracing::warn!(profile_id = %self.profile_id, error = %err, "presence clear failed");
        }
    }

    pub async fn fetch_online(&self) -> AppResult<Vec<Profile>> {
        Ok(self.store.online_profiles().await?)
    }

    /// Any change to any profile invalidates the whole online list.
    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe(Interest::all(Table::Profiles))
    }
}
