// src/lib.rs
pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod repository;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use types::ApiResponse;

use crate::api::handlers::permission_change_handler::user_permission_router;
use crate::api::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// 1リクエストの本文上限（最大バッチを十分に収める大きさ）
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// ミドルウェアを含むアプリケーション全体のルーター
pub fn app_router(app_state: AppState) -> Router {
    user_permission_router(app_state)
        .layer(axum::middleware::from_fn(logging::logging_middleware))
        .layer(axum::middleware::from_fn(logging::inject_request_context))
        .layer(middleware::cors::cors_layer())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
