use std::sync::Arc;
use std::time::Duration;

use parlor_store::{ChatStore, Interest, Subscription, Table, TypingPeer};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AppResult;

/// Silence on the composer for this long flips the flag back off.
pub const IDLE_AFTER: Duration = Duration::from_millis(2000);

struct TrackerState {
    typing: bool,
    // Bumped on every transition; a timer that fires with a stale epoch
    // lost the race to an abort and must not touch anything.
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

/// Local typing state machine: `Idle` and `Typing`, with an inactivity
/// timer. The remote flag is written once per transition, never per
/// keystroke, and always as a detached task whose failure is logged and
/// swallowed.
pub struct TypingTracker {
    store: Arc<dyn ChatStore>,
    profile_id: Uuid,
    idle_after: Duration,
    state: Arc<Mutex<TrackerState>>,
}

impl TypingTracker {
    pub fn new(store: Arc<dyn ChatStore>, profile_id: Uuid) -> Self {
        Self::with_idle_after(store, profile_id, IDLE_AFTER)
    }

    pub fn with_idle_after(
        store: Arc<dyn ChatStore>,
        profile_id: Uuid,
        idle_after: Duration,
    ) -> Self {
        Self {
            store,
            profile_id,
            idle_after,
            state: Arc::new(Mutex::new(TrackerState {
                typing: false,
                epoch: 0,
                timer: None,
            })),
        }
    }

    /// A composer keystroke. The first one in a window upserts
    /// `is_typing = true`; every one re-arms the inactivity timer.
    pub async fn on_input(&self) {
        let mut state = self.state.lock().await;
        let entered = !state.typing;
        state.typing = true;
        state.epoch += 1;
        let epoch = state.epoch;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer = Some(tokio::spawn(expire(
            Arc::clone(&self.store),
            self.profile_id,
            Arc::clone(&self.state),
            self.idle_after,
            epoch,
        )));
        drop(state);

        if entered {
            push_flag(Arc::clone(&self.store), self.profile_id, true);
        }
    }

    /// Sending a message ends the window immediately.
    pub async fn on_send(&self) {
        let mut state = self.state.lock().await;
        let was_typing = state.typing;
        state.typing = false;
        state.epoch += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        drop(state);

        if was_typing {
            push_flag(Arc::clone(&self.store), self.profile_id, false);
        }
    }

    /// Teardown: cancels any pending timer so no stale callback fires,
    /// and clears the remote flag if it was set.
    pub async fn shutdown(&self) {
        self.on_send().await;
    }

    pub async fn fetch_peers(&self) -> AppResult<Vec<TypingPeer>> {
        Ok(self.store.typing_peers(self.profile_id).await?)
    }

    /// Any change to any typing row invalidates the peer set.
    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe(Interest::all(Table::TypingStatus))
    }
}

impl Drop for TypingTracker {
    fn drop(&mut self) {
        // Last-ditch cancellation for paths that skipped shutdown().
        if let Ok(mut state) = self.state.try_lock() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
    }
}

async fn expire(
    store: Arc<dyn ChatStore>,
    profile_id: Uuid,
    state: Arc<Mutex<TrackerState>>,
    idle_after: Duration,
    epoch: u64,
) {
    tokio::time::sleep(idle_after).await;

    let mut state = state.lock().await;
    if state.epoch != epoch || !state.typing {
        return;
    }
    state.typing = false;
    state.timer = None;
    drop(state);

    push_flag(store, profile_id, false);
}

fn push_flag(store: Arc<dyn ChatStore>, profile_id: Uuid, is_typing: bool) {
    tokio::spawn(async move {
        if let Err(err) = store.upsert_typing(profile_id, is_typing).await {
            tracing::warn!(%profile_id, is_typing, error = %err, "typing update failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parlor_store::{ChatMessage, MemoryStore, Profile, StoreResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the in-process store and counts typing upserts by value.
    struct RecordingStore {
        inner: MemoryStore,
        typing_true: AtomicUsize,
        typing_false: AtomicUsize,
    }

    impl RecordingStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                typing_true: AtomicUsize::new(0),
                typing_false: AtomicUsize::new(0),
            }
        }

        fn true_upserts(&self) -> usize {
            self.typing_true.load(Ordering::SeqCst)
        }

        fn false_upserts(&self) -> usize {
            self.typing_false.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatStore for RecordingStore {
        async fn find_profile(&self, username: &str) -> StoreResult<Option<Profile>> {
            self.inner.find_profile(username).await
        }

        async fn create_profile(&self, username: &str) -> StoreResult<Profile> {
            self.inner.create_profile(username).await
        }

        async fn set_online(&self, profile_id: Uuid, online: bool) -> StoreResult<()> {
            self.inner.set_online(profile_id, online).await
        }

        async fn online_profiles(&self) -> StoreResult<Vec<Profile>> {
            self.inner.online_profiles().await
        }

        async fn insert_message(
            &self,
            profile_id: Uuid,
            content: &str,
        ) -> StoreResult<ChatMessage> {
            self.inner.insert_message(profile_id, content).await
        }

        async fn fetch_messages(&self) -> StoreResult<Vec<ChatMessage>> {
            self.inner.fetch_messages().await
        }

        async fn upsert_typing(&self, profile_id: Uuid, is_typing: bool) -> StoreResult<()> {
            if is_typing {
                self.typing_true.fetch_add(1, Ordering::SeqCst);
            } else {
                self.typing_false.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.upsert_typing(profile_id, is_typing).await
        }

        async fn typing_peers(&self, except: Uuid) -> StoreResult<Vec<TypingPeer>> {
            self.inner.typing_peers(except).await
        }

        fn subscribe(&self, interest: Interest) -> Subscription {
            self.inner.subscribe(interest)
        }
    }

    async fn drain_spawned() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn setup() -> (Arc<RecordingStore>, TypingTracker) {
        let store = Arc::new(RecordingStore::new(MemoryStore::new()));
        let alice = store.create_profile("alice").await.expect("create");
        let tracker = TypingTracker::new(store.clone(), alice.id);
        (store, tracker)
    }

    #[tokio::test(start_paused = true)]
    async fn one_true_upsert_per_window_then_one_false_after_silence() {
        let (store, tracker) = setup().await;

        for _ in 0..5 {
            tracker.on_input().await;
            drain_spawned().await;
            tokio::time::advance(Duration::from_millis(300)).await;
        }
        drain_spawned().await;
        assert_eq!(store.true_upserts(), 1);
        assert_eq!(store.false_upserts(), 0);

        tokio::time::advance(IDLE_AFTER).await;
        drain_spawned().await;
        assert_eq!(store.true_upserts(), 1);
        assert_eq!(store.false_upserts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keystrokes_keep_rearming_the_timer() {
        let (store, tracker) = setup().await;

        // Continuous typing across several windows' worth of time:
        // the flag never flips off.
        for _ in 0..10 {
            tracker.on_input().await;
            drain_spawned().await;
            tokio::time::advance(Duration::from_millis(1500)).await;
        }
        drain_spawned().await;
        assert_eq!(store.true_upserts(), 1);
        assert_eq!(store.false_upserts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_flips_the_flag_off_immediately_and_cancels_the_timer() {
        let (store, tracker) = setup().await;

        tracker.on_input().await;
        drain_spawned().await;
        tracker.on_send().await;
        drain_spawned().await;
        assert_eq!(store.true_upserts(), 1);
        assert_eq!(store.false_upserts(), 1);

        // The aborted timer must not double-clear.
        tokio::time::advance(IDLE_AFTER * 2).await;
        drain_spawned().await;
        assert_eq!(store.false_upserts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_window_can_open_after_send() {
        let (store, tracker) = setup().await;

        tracker.on_input().await;
        drain_spawned().await;
        tracker.on_send().await;
        drain_spawned().await;

        tracker.on_input().await;
        drain_spawned().await;
        assert_eq!(store.true_upserts(), 2);

        tokio::time::advance(IDLE_AFTER).await;
        drain_spawned().await;
        assert_eq!(store.false_upserts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_the_pending_timer() {
        let (store, tracker) = setup().await;

        tracker.on_input().await;
        drain_spawned().await;
        tracker.shutdown().await;
        drain_spawned().await;
        assert_eq!(store.false_upserts(), 1);

        tokio::time::advance(IDLE_AFTER * 2).await;
        drain_spawned().await;
        assert_eq!(store.false_upserts(), 1, "stale timer must not fire after teardown");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_send_writes_nothing() {
        let (store, tracker) = setup().await;

        tracker.on_send().await;
        drain_spawned().await;
        assert_eq!(store.true_upserts(), 0);
        assert_eq!(store.false_upserts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn peers_see_the_flag_appear_and_clear() {
        // End to end against the shared store: alice types, bob's
        // refetched view shows her, then silence clears her.
        let store = Arc::new(RecordingStore::new(MemoryStore::new()));
        let alice = store.create_profile("alice").await.expect("create");
        let bob = store.create_profile("bob").await.expect("create");

        let alice_tracker = TypingTracker::new(store.clone(), alice.id);
        let bob_view = TypingTracker::new(store.clone(), bob.id);
        let mut bob_sub = bob_view.subscribe();

        alice_tracker.on_input().await;
        drain_spawned().await;
        assert_eq!(bob_sub.notified().await, Some(()));
        let peers = bob_view.fetch_peers().await.expect("peers");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].username, "alice");

        // Alice must not see herself.
        assert!(alice_tracker.fetch_peers().await.expect("peers").is_empty());

        tokio::time::advance(IDLE_AFTER).await;
        drain_spawned().await;
        assert_eq!(bob_sub.notified().await, Some(()));
        assert!(bob_view.fetch_peers().await.expect("peers").is_empty());
    }
}
