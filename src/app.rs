use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/upload/clear", post(handlers::clear_upload))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
