// permission-backend/src/domain/mod.rs
pub mod conflict;
pub mod execution_plan;
pub mod membership_snapshot;
pub mod organization_member_model;
pub mod organization_model;
pub mod permission_change;
pub mod permission_error;
pub mod project_member_model;
pub mod project_model;
pub mod role_model;
pub mod scope;
pub mod user_model;
pub mod user_permissions;
pub mod validation_report;
