use std::sync::Arc;

use parlor_store::{ChatMessage, ChatStore, Interest, Subscription, Table};

use crate::error::{AppError, AppResult};
use crate::session::SessionIdentity;

/// The message list, derived by full refetch whenever an insert
/// notification arrives. Never patched incrementally.
pub struct MessageFeed {
    store: Arc<dyn ChatStore>,
    session: SessionIdentity,
}

impl MessageFeed {
    pub fn new(store: Arc<dyn ChatStore>, session: SessionIdentity) -> Self {
        Self { store, session }
    }

    /// Sends the trimmed draft. Blank input is rejected before any
    /// network call; the caller keeps the draft on every error path so
    /// nothing is lost to a failed send.
    pub async fn send(&self, draft: &str) -> AppResult<()> {
        let content = draft.trim();
        if content.is_empty() {
            return Err(AppError::validation("message is empty"));
        }
        self.store
            .insert_message(self.session.profile_id, content)
            .await?;
        Ok(())
    }

    /// Full table, `created_at` ascending, authors joined in.
    pub async fn fetch_all(&self) -> AppResult<Vec<ChatMessage>> {
        Ok(self.store.fetch_messages().await?)
    }

    /// Insert notifications only; updates and deletes do not exist for
    /// messages.
    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe(Interest::inserts(Table::Messages))
    }

    pub fn is_own(&self, message: &ChatMessage) -> bool {
        message.profile_id == self.session.profile_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parlor_store::MemoryStore;

    async fn session_for(store: &MemoryStore, username: &str) -> SessionIdentity {
        let profile = store.create_profile(username).await.expect("create");
        SessionIdentity {
            profile_id: profile.id,
            username: profile.username,
        }
    }

    #[tokio::test]
    async fn send_trims_and_writes_exactly_one_row() {
        let store = Arc::new(MemoryStore::new());
        let alice = session_for(&store, "alice").await;
        let feed = MessageFeed::new(store.clone(), alice.clone());

        feed.send("  hi there  ").await.expect("send");

        let messages = feed.fetch_all().await.expect("fetch");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi there");
        assert_eq!(messages[0].profile_id, alice.profile_id);
    }

    #[tokio::test]
    async fn blank_sends_are_rejected_without_a_write() {
        let store = Arc::new(MemoryStore::new());
        let alice = session_for(&store, "alice").await;
        let feed = MessageFeed::new(store.clone(), alice);

        for draft in ["", "   ", "\n\t "] {
            let result = feed.send(draft).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
        assert!(feed.fetch_all().await.expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn fetch_orders_by_created_at_not_arrival() {
        let store = Arc::new(MemoryStore::new());
        let alice = session_for(&store, "alice").await;
        let feed = MessageFeed::new(store.clone(), alice.clone());

        let later = Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 30).unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 10).unwrap();
        store
            .insert_message_at(alice.profile_id, "arrives first, shows second", later)
            .await
            .expect("insert");
        store
            .insert_message_at(alice.profile_id, "arrives second, shows first", earlier)
            .await
            .expect("insert");

        let messages = feed.fetch_all().await.expect("fetch");
        assert_eq!(messages[0].content, "arrives second, shows first");
        assert_eq!(messages[1].content, "arrives first, shows second");
    }

    #[tokio::test]
    async fn own_classification_follows_the_session_profile() {
        let store = Arc::new(MemoryStore::new());
        let alice = session_for(&store, "alice").await;
        let bob = session_for(&store, "bob").await;

        let alice_feed = MessageFeed::new(store.clone(), alice.clone());
        let bob_feed = MessageFeed::new(store.clone(), bob.clone());

        alice_feed.send("from alice").await.expect("send");
        bob_feed.send("from bob").await.expect("send");

        let messages = bob_feed.fetch_all().await.expect("fetch");
        for message in &messages {
            let expected = message.profile_id == bob.profile_id;
            assert_eq!(bob_feed.is_own(message), expected);
            assert_eq!(alice_feed.is_own(message), !expected);
        }
    }

    #[tokio::test]
    async fn a_send_notifies_other_subscribers_and_carries_the_author() {
        // Alice sends; bob refetches on the notification and sees the
        // message attributed to alice.
        let store = Arc::new(MemoryStore::new());
        let alice = session_for(&store, "alice").await;
        let bob = session_for(&store, "bob").await;

        let alice_feed = MessageFeed::new(store.clone(), alice);
        let bob_feed = MessageFeed::new(store.clone(), bob);
        let mut bob_sub = bob_feed.subscribe();

        alice_feed.send("hi").await.expect("send");

        assert_eq!(bob_sub.notified().await, Some(()));
        let messages = bob_feed.fetch_all().await.expect("fetch");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[0].author.as_deref(), Some("alice"));
        assert!(!bob_feed.is_own(&messages[0]));
    }
}
