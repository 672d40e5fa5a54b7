pub mod feed;
pub mod messages;
pub mod profiles;
pub mod typing;

use axum::{routing::get, Router};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/profiles", profiles::router())
        .nest("/messages", messages::router())
        .nest("/typing", typing::router())
        .route("/ws", get(feed::ws_handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Ids are stored as TEXT; a row that does not parse is corrupt data.
pub(crate) fn parse_uuid(text: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(text).map_err(|e| ApiError::Internal(format!("bad id {text:?}: {e}")))
}
