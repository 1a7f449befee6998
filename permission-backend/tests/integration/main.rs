// tests/integration/main.rs
//! HTTP エンドポイントと PostgreSQL プロバイダーの統合テスト

#[path = "../common/mod.rs"]
mod common;

mod permission_changes;
mod postgres;
