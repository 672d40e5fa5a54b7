use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use parlor_store::{ChangeOp, Table, TypingPeer};
use serde::Deserialize;
use uuid::Uuid;

use crate::db;
use crate::error::ApiError;
use crate::routes::parse_uuid;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(typing_peers))
        .route("/:profile_id", put(set_typing))
}

#[derive(Debug, Deserialize)]
struct TypingRequest {
    is_typing: bool,
}

#[derive(Debug, Deserialize)]
struct TypingQuery {
    except: Option<Uuid>,
}

async fn set_typing(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
    Json(payload): Json<TypingRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM profiles WHERE id = ?")
        .bind(profile_id.to_string())
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound);
    }

    let had_row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM typing_status WHERE profile_id = ?")
            .bind(profile_id.to_string())
            .fetch_optional(&state.db)
            .await?;

    // One row per profile, enforced by the store rather than the caller.
    sqlx::query(
        r#"
        INSERT INTO typing_status (profile_id, is_typing, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(profile_id) DO UPDATE SET
            is_typing = excluded.is_typing,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(profile_id.to_string())
    .bind(payload.is_typing)
    .bind(db::now_text())
    .execute(&state.db)
    .await?;

    let op = if had_row.is_some() {
        ChangeOp::Update
    } else {
        ChangeOp::Insert
    };
    state.notify(Table::TypingStatus, op);
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn typing_peers(
    State(state): State<AppState>,
    Query(query): Query<TypingQuery>,
) -> Result<Json<Vec<TypingPeer>>, ApiError> {
    let except = query.except.map(|id| id.to_string()).unwrap_or_default();

    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT t.profile_id, p.username
        FROM typing_status t
        JOIN profiles p ON p.id = t.profile_id
        WHERE t.is_typing = 1 AND t.profile_id != ?
        ORDER BY p.username ASC
        "#,
    )
    .bind(&except)
    .fetch_all(&state.db)
    .await?;

    let peers = rows
        .into_iter()
        .map(|(profile_id, username)| {
            Ok(TypingPeer {
                profile_id: parse_uuid(&profile_id)?,
                username,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;
    Ok(Json(peers))
}
