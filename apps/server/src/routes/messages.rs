use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use parlor_store::{ChangeOp, ChatMessage, Table};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::error::ApiError;
use crate::routes::parse_uuid;
use crate::state::AppState;
use crate::validation::validate_message_content;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_messages).post(send_message))
}

#[derive(Debug, Deserialize, Validate)]
struct SendMessageRequest {
    profile_id: Uuid,
    #[validate(custom(function = "validate_message_content"))]
    content: String,
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    profile_id: String,
    content: String,
    created_at: String,
    author: Option<String>,
}

impl MessageRow {
    fn into_message(self) -> Result<ChatMessage, ApiError> {
        let created_at = db::parse_timestamp(&self.created_at)
            .ok_or_else(|| ApiError::Internal(format!("bad timestamp {:?}", self.created_at)))?;
        Ok(ChatMessage {
            id: parse_uuid(&self.id)?,
            profile_id: parse_uuid(&self.profile_id)?,
            content: self.content,
            created_at,
            author: self.author,
        })
    }
}

async fn send_message(
    State(state): State<AppState>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    payload.validate()?;
    let content = payload.content.trim().to_string();

    let author: Option<(String,)> = sqlx::query_as("SELECT username FROM profiles WHERE id = ?")
        .bind(payload.profile_id.to_string())
        .fetch_optional(&state.db)
        .await?;
    let Some((author,)) = author else {
        return Err(ApiError::NotFound);
    };

    let id = Uuid::new_v4();
    let created_at_text = db::now_text();
    sqlx::query("INSERT INTO messages (id, profile_id, content, created_at) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(payload.profile_id.to_string())
        .bind(&content)
        .bind(&created_at_text)
        .execute(&state.db)
        .await?;

    state.notify(Table::Messages, ChangeOp::Insert);

    let created_at = db::parse_timestamp(&created_at_text)
        .ok_or_else(|| ApiError::Internal(format!("bad timestamp {created_at_text:?}")))?;
    Ok(Json(ChatMessage {
        id,
        profile_id: payload.profile_id,
        content,
        created_at,
        author: Some(author),
    }))
}

async fn list_messages(State(state): State<AppState>) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT m.id, m.profile_id, m.content, m.created_at, p.username AS author
        FROM messages m
        LEFT JOIN profiles p ON p.id = m.profile_id
        ORDER BY m.created_at ASC
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let messages = rows
        .into_iter()
        .map(MessageRow::into_message)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(messages))
}
