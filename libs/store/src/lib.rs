//! Remote-store contract shared by the Parlor client and server.
//!
//! The chat keeps three tables — `profiles`, `messages`, `typing_status` —
//! behind the [`ChatStore`] trait: insert/update/select plus a
//! change-notification feed. Notifications carry no row data; consumers
//! refetch the affected table in full, so the locally observed state is
//! eventually consistent.

pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use types::{ChangeEvent, ChangeOp, ChatMessage, Profile, Table, TypingPeer, TypingStatus};

pub type StoreResult<T> = Result<T, StoreError>;

/// Which notifications a subscriber wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub table: Table,
    inserts_only: bool,
}

impl Interest {
    /// Insert notifications only (the message feed's registration).
    pub fn inserts(table: Table) -> Self {
        Self {
            table,
            inserts_only: true,
        }
    }

    /// Every change on the table (presence and typing registrations).
    pub fn all(table: Table) -> Self {
        Self {
            table,
            inserts_only: false,
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table && (!self.inserts_only || event.op == ChangeOp::Insert)
    }
}

/// A live registration on the store's notification feed.
///
/// Scoped resource: dropping the subscription releases the registration,
/// on every exit path, exactly once. The payload of a notification is
/// deliberately unit — callers refetch, never patch.
pub struct Subscription {
    interest: Interest,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(interest: Interest, rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { interest, rx }
    }

    /// Waits for the next matching notification. Returns `None` once the
    /// feed is closed (store dropped or stream ended); a lagged receiver
    /// is coalesced into a single notification, since the reaction to any
    /// number of missed events is the same full refetch.
    pub async fn notified(&mut self) -> Option<()> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.interest.matches(&event) => return Some(()),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return Some(()),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The table store the chat is synchronized against.
///
/// Implementations: [`MemoryStore`] (in-process, tests), the client's
/// HTTP+websocket store, and the development server's SQLite backing.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Exact, case-sensitive username lookup.
    async fn find_profile(&self, username: &str) -> StoreResult<Option<Profile>>;

    /// Creates a profile with `is_online = true`; the store generates the id.
    async fn create_profile(&self, username: &str) -> StoreResult<Profile>;

    async fn set_online(&self, profile_id: Uuid, online: bool) -> StoreResult<()>;

    /// Profiles with `is_online = true`, ordered by username ascending.
    async fn online_profiles(&self) -> StoreResult<Vec<Profile>>;

    /// Inserts a message; `created_at` is assigned by the store.
    async fn insert_message(&self, profile_id: Uuid, content: &str) -> StoreResult<ChatMessage>;

    /// Full table, `created_at` ascending, author username joined in.
    async fn fetch_messages(&self) -> StoreResult<Vec<ChatMessage>>;

    /// Atomic insert-or-update of the typing flag, keyed by profile id.
    async fn upsert_typing(&self, profile_id: Uuid, is_typing: bool) -> StoreResult<()>;

    /// Peers with `is_typing = true`, excluding `except`, usernames joined.
    async fn typing_peers(&self, except: Uuid) -> StoreResult<Vec<TypingPeer>>;

    /// Registers interest in change notifications. Infallible by design:
    /// a feed that is already gone behaves like a feed with no events.
    fn subscribe(&self, interest: Interest) -> Subscription;
}
