use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user of the chat. Profiles are created on first login and never
/// deleted; `is_online` is flipped on login/logout and view lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub is_online: bool,
}

/// One chat message as served by the store: the row plus the author's
/// username denormalized from the profile join. `author` is `None` when
/// the join fails to resolve (profile gone out-of-band).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<String>,
}

/// Typing flag row. At most one row per profile; absence of a row is
/// equivalent to `is_typing = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingStatus {
    pub profile_id: Uuid,
    pub is_typing: bool,
    pub updated_at: DateTime<Utc>,
}

/// A peer currently typing, with the username joined in for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPeer {
    pub profile_id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Messages,
    TypingStatus,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Messages => "messages",
            Table::TypingStatus => "typing_status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOp::Insert => "insert",
            ChangeOp::Update => "update",
            ChangeOp::Delete => "delete",
        }
    }
}

/// Change notification emitted by the store after a mutation commits.
/// Carries no row data: every notification means "refetch the table".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub op: ChangeOp,
}

impl ChangeEvent {
    pub fn new(table: Table, op: ChangeOp) -> Self {
        Self { table, op }
    }
}
