// permission-backend/src/service/permission_engine/policy.rs
use crate::config::PermissionConfig;

/// 検出ルールの挙動を決める設定値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionPolicy {
    pub max_batch_size: usize,
    pub require_organization_membership: bool,
    pub exempt_independent_projects: bool,
    pub protect_last_project_manager: bool,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::from(&PermissionConfig::default())
    }
}

impl From<&PermissionConfig> for PermissionPolicy {
    fn from(config: &PermissionConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            require_organization_membership: config.require_organization_membership,
            exempt_independent_projects: config.exempt_independent_projects,
            protect_last_project_manager: config.protect_last_project_manager,
        }
    }
}
