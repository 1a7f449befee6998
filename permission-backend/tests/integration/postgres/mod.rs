// tests/integration/postgres/mod.rs
//! PostgreSQL プロバイダー（Docker が必要なため既定では実行しない）
//!
//! `cargo test -- --ignored` で実行する。

mod provider_tests;
