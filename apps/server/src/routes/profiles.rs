use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use parlor_store::{ChangeOp, Profile, Table};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::routes::parse_uuid;
use crate::state::AppState;
use crate::validation::validate_username;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_profile))
        .route("/online", get(online_profiles))
        .route("/by-username/:username", get(profile_by_username))
        .route("/:id/online", put(set_online))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateProfileRequest {
    #[validate(custom(function = "validate_username"))]
    username: String,
}

#[derive(Debug, Deserialize)]
struct SetOnlineRequest {
    online: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: String,
    username: String,
    is_online: bool,
}

impl ProfileRow {
    fn into_profile(self) -> Result<Profile, ApiError> {
        Ok(Profile {
            id: parse_uuid(&self.id)?,
            username: self.username,
            is_online: self.is_online,
        })
    }
}

async fn create_profile(
    State(state): State<AppState>,
    Json(payload): Json<CreateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    payload.validate()?;
    let username = payload.username.trim().to_string();
    let id = Uuid::new_v4();

    let result = sqlx::query("INSERT INTO profiles (id, username, is_online) VALUES (?, ?, 1)")
        .bind(id.to_string())
        .bind(&username)
        .execute(&state.db)
        .await;

    if let Err(err) = result {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Err(ApiError::Conflict(format!(
                    "username already taken: {username}"
                )));
            }
        }
        return Err(err.into());
    }

    state.notify(Table::Profiles, ChangeOp::Insert);
    tracing::info!(%id, username = %username, "profile created");

    Ok(Json(Profile {
        id,
        username,
        is_online: true,
    }))
}

async fn profile_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT id, username, is_online FROM profiles WHERE username = ?",
    )
    .bind(&username)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(row.into_profile()?))
}

async fn set_online(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetOnlineRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = sqlx::query("UPDATE profiles SET is_online = ? WHERE id = ?")
        .bind(payload.online)
        .bind(id.to_string())
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    state.notify(Table::Profiles, ChangeOp::Update);
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn online_profiles(State(state): State<AppState>) -> Result<Json<Vec<Profile>>, ApiError> {
    let rows = sqlx::query_as::<_, ProfileRow>(
        "SELECT id, username, is_online FROM profiles WHERE is_online = 1 ORDER BY username ASC",
    )
    .fetch_all(&state.db)
    .await?;

    let profiles = rows
        .into_iter()
        .map(ProfileRow::into_profile)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(profiles))
}
