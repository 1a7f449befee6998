// tests/common/request.rs
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use permission_backend::domain::role_model::Role;
use permission_backend::domain::scope::Scope;
use permission_backend::middleware::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

/// 呼び出し元を指定した JSON リクエストを作成
pub fn json_request(method: &str, uri: &str, caller: Uuid, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::from_bytes(method.as_bytes()).unwrap())
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(USER_ID_HEADER, caller.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// システム管理者として JSON リクエストを作成
pub fn admin_json_request(method: &str, uri: &str, caller: Uuid, body: &Value) -> Request<Body> {
    let mut request = json_request(method, uri, caller, body);
    request
        .headers_mut()
        .insert(USER_ROLE_HEADER, "admin".parse().unwrap());
    request
}

/// 認証ヘッダー無しのリクエストを作成
pub fn anonymous_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::from_bytes(method.as_bytes()).unwrap())
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// 生の文字列ボディでリクエストを作成
pub fn raw_request(uri: &str, caller: Uuid, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(USER_ID_HEADER, caller.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str, caller: Uuid) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(USER_ID_HEADER, caller.to_string())
        .body(Body::empty())
        .unwrap()
}

/// リクエストを送信し、ステータスと JSON ボディを返す
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn scope_json(scope: Scope) -> Value {
    serde_json::to_value(scope).unwrap()
}

pub fn add_change(user_id: Uuid, scope: Scope, role: Role) -> Value {
    json!({
        "user_id": user_id,
        "scope": scope_json(scope),
        "action": "ADD",
        "requested_role": role.as_str(),
    })
}

pub fn change_role_change(user_id: Uuid, scope: Scope, role: Role) -> Value {
    json!({
        "user_id": user_id,
        "scope": scope_json(scope),
        "action": "CHANGE_ROLE",
        "requested_role": role.as_str(),
    })
}

pub fn remove_change(user_id: Uuid, scope: Scope) -> Value {
    json!({
        "user_id": user_id,
        "scope": scope_json(scope),
        "action": "REMOVE",
    })
}

pub fn changes_body(changes: Vec<Value>) -> Value {
    json!({ "changes": changes })
}

pub fn decision(user_id: Uuid, scope: Scope, decision: &str) -> Value {
    json!({
        "user_id": user_id,
        "scope": scope_json(scope),
        "decision": decision,
    })
}
