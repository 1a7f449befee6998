// permission-backend/src/middleware/cors.rs

use crate::middleware::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use axum::http::{header, HeaderName, HeaderValue, Method};
use std::env;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// CORS ミドルウェア設定
pub fn cors_layer() -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_ROLE_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600)); // プリフライトリクエストのキャッシュ時間

    // CORS_ALLOWED_ORIGINS が未設定の場合はローカルのフロントエンドのみ許可
    let allowed_origin =
        env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());
    if allowed_origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!(origin = %allowed_origin, "Invalid CORS origin, allowing none");
            layer
        }
    }
}
