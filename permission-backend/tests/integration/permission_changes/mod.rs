// tests/integration/permission_changes/mod.rs
//! /api/user-permissions 配下のエンドポイント

mod auto_resolve_tests;
mod execute_tests;

const VALIDATE: &str = "/api/user-permissions/validate-changes";
const COMPREHENSIVE: &str = "/api/user-permissions/comprehensive-validate";
const AUTO_RESOLVE: &str = "/api/user-permissions/auto-resolve-conflicts";
const BULK: &str = "/api/user-permissions/bulk-changes";
const CSV: &str = "/api/user-permissions/csv-execute";
