// permission-backend/src/domain/user_permissions.rs
use crate::domain::membership_snapshot::{RoleAssignment, UserAccount};
use crate::domain::role_model::Role;
use crate::domain::scope::Scope;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedRole {
    pub scope: Scope,
    pub role: Role,
    pub granted_at: DateTime<Utc>,
}

impl From<&RoleAssignment> for ScopedRole {
    fn from(assignment: &RoleAssignment) -> Self {
        Self {
            scope: assignment.scope,
            role: assignment.role,
            granted_at: assignment.granted_at,
        }
    }
}

/// ユーザーが保持するすべての組織・プロジェクトロール
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPermissions {
    pub user_id: Uuid,
    pub is_active: bool,
    pub is_system_admin: bool,
    pub organization_memberships: Vec<ScopedRole>,
    pub project_memberships: Vec<ScopedRole>,
}

impl UserPermissions {
    pub fn new<'a>(
        account: &UserAccount,
        assignments: impl IntoIterator<Item = &'a RoleAssignment>,
    ) -> Self {
        let (organization_memberships, project_memberships) = assignments
            .into_iter()
            .filter(|assignment| assignment.user_id == account.id)
            .map(ScopedRole::from)
            .partition(|role| role.scope.is_organization());
        Self {
            user_id: account.id,
            is_active: account.is_active,
            is_system_admin: account.is_system_admin,
            organization_memberships,
            project_memberships,
        }
    }
}

/// スコープのメンバー1人分
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeMember {
    pub user_id: Uuid,
    pub role: Role,
    /// アカウントが見つからない場合は false
    pub is_active: bool,
    pub granted_at: DateTime<Utc>,
}
