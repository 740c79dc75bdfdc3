pub mod cors;
pub mod handler;
pub mod types;

pub use handler::AppState;

use axum::routing::{get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::services::ServeDir;

/// `/` 返回前端入口页，`/static` 下提供整个前端构建目录。
pub fn router(state: Arc<AppState>) -> Router {
    let assets = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/", get(handler::handle_index))
        .route("/ask", post(handler::handle_ask))
        .route("/health", get(handler::handle_health))
        .route("/quota", get(handler::handle_quota))
        .nest_service("/static", assets)
        .with_state(state)
        .layer(middleware::from_fn(cors::cors_middleware))
}
