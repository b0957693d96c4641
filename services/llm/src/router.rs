use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{chat, state::AppState};

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat/completions", post(chat::chat_completions))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
