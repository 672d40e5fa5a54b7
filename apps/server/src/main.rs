mod db;
mod error;
mod routes;
mod state;
mod validation;

use std::path::Path;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    let filter = std::env::var("PARLOR_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let db_path = std::env::var("PARLOR_DB").unwrap_or_else(|_| "parlor.db".to_string());
    let pool = db::connect(Path::new(&db_path))
        .await
        .expect("open database");

    let state = AppState::new(pool);
    let app = routes::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = std::env::var("PARLOR_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
