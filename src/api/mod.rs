use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<RwLock<AppState>>) -> Router {
    Router::new()
        .route("/api/bays", get(handlers::get_bays))
        .route("/api/health", get(handlers::get_health))
        .route("/api/status", get(handlers::get_status))
        .with_state(state)
}
