//! In-process [`ChatStore`] implementation.
//!
//! Backs the sync-core tests: real tables in a `RwLock`, real broadcast
//! fan-out, no network. Semantics match the hosted store — unique
//! usernames, store-assigned ids and timestamps, atomic typing upsert,
//! notification-per-mutation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{ChangeEvent, ChangeOp, ChatMessage, Profile, Table, TypingPeer};
use crate::{ChatStore, Interest, StoreResult, Subscription};

const FEED_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
struct MessageRow {
    id: Uuid,
    profile_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TypingRow {
    is_typing: bool,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    profiles: Vec<Profile>,
    messages: Vec<MessageRow>,
    typing: HashMap<Uuid, TypingRow>,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    events: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tables: RwLock::new(Tables::default()),
            events,
        }
    }

    fn emit(&self, table: Table, op: ChangeOp) {
        // No receivers is fine; notifications are best-effort by contract.
        let _ = self.events.send(ChangeEvent::new(table, op));
    }

    /// Test support: inserts a message row with an explicit timestamp, so
    /// ordering can be exercised independently of arrival order.
    pub async fn insert_message_at(
        &self,
        profile_id: Uuid,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<ChatMessage> {
        let mut tables = self.tables.write().await;
        if !tables.profiles.iter().any(|p| p.id == profile_id) {
            return Err(StoreError::Rejected(format!(
                "unknown profile {profile_id}"
            )));
        }
        let row = MessageRow {
            id: Uuid::new_v4(),
            profile_id,
            content: content.to_string(),
            created_at,
        };
        let message = join_author(&tables.profiles, &row);
        tables.messages.push(row);
        drop(tables);
        self.emit(Table::Messages, ChangeOp::Insert);
        Ok(message)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn join_author(profiles: &[Profile], row: &MessageRow) -> ChatMessage {
    ChatMessage {
        id: row.id,
        profile_id: row.profile_id,
        content: row.content.clone(),
        created_at: row.created_at,
        author: profiles
            .iter()
            .find(|p| p.id == row.profile_id)
            .map(|p| p.username.clone()),
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_profile(&self, username: &str) -> StoreResult<Option<Profile>> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .iter()
            .find(|p| p.username == username)
            .cloned())
    }

    async fn create_profile(&self, username: &str) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        if tables.profiles.iter().any(|p| p.username == username) {
            return Err(StoreError::Rejected(format!(
                "username already taken: {username}"
            )));
        }
        let profile = Profile {
            id: Uuid::new_v4(),
            username: username.to_string(),
            is_online: true,
        };
        tables.profiles.push(profile.clone());
        drop(tables);
        self.emit(Table::Profiles, ChangeOp::Insert);
        Ok(profile)
    }

    async fn set_online(&self, profile_id: Uuid, online: bool) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let Some(profile) = tables.profiles.iter_mut().find(|p| p.id == profile_id) else {
            return Err(StoreError::Rejected(format!(
                "unknown profile {profile_id}"
            )));
        };
        profile.is_online = online;
        drop(tables);
        self.emit(Table::Profiles, ChangeOp::Update);
        Ok(())
    }

    async fn online_profiles(&self) -> StoreResult<Vec<Profile>> {
        let tables = self.tables.read().await;
        let mut online: Vec<Profile> = tables
            .profiles
            .iter()
            .filter(|p| p.is_online)
            .cloned()
            .collect();
        online.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(online)
    }

    async fn insert_message(&self, profile_id: Uuid, content: &str) -> StoreResult<ChatMessage> {
        self.insert_message_at(profile_id, content, Utc::now()).await
    }

    async fn fetch_messages(&self) -> StoreResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<ChatMessage> = tables
            .messages
            .iter()
            .map(|row| join_author(&tables.profiles, row))
            .collect();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    async fn upsert_typing(&self, profile_id: Uuid, is_typing: bool) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let op = if tables.typing.contains_key(&profile_id) {
            ChangeOp::Update
        } else {
            ChangeOp::Insert
        };
        tables.typing.insert(
            profile_id,
            TypingRow {
                is_typing,
                updated_at: Utc::now(),
            },
        );
        drop(tables);
        self.emit(Table::TypingStatus, op);
        Ok(())
    }

    async fn typing_peers(&self, except: Uuid) -> StoreResult<Vec<TypingPeer>> {
        let tables = self.tables.read().await;
        let mut peers: Vec<TypingPeer> = tables
            .typing
            .iter()
            .filter(|(id, row)| **id != except && row.is_typing)
            .filter_map(|(id, _)| {
                tables
                    .profiles
                    .iter()
                    .find(|p| p.id == *id)
                    .map(|p| TypingPeer {
                        profile_id: *id,
                        username: p.username.clone(),
                    })
            })
            .collect();
        peers.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(peers)
    }

    fn subscribe(&self, interest: Interest) -> Subscription {
        Subscription::new(interest, self.events.subscribe())
    }
}
