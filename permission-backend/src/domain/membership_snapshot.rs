// permission-backend/src/domain/membership_snapshot.rs
use crate::domain::permission_change::IdentityKey;
use crate::domain::role_model::Role;
use crate::domain::scope::Scope;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// ユーザーがあるスコープで保持するロール（ユーザー×スコープで一意）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub scope: Scope,
    pub role: Role,
    pub granted_at: DateTime<Utc>,
}

impl RoleAssignment {
    pub fn new(user_id: Uuid, scope: Scope, role: Role) -> Self {
        Self {
            user_id,
            scope,
            role,
            granted_at: Utc::now(),
        }
    }

    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(self.user_id, self.scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub id: Uuid,
    /// 独立プロジェクトは組織を持たない
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub is_active: bool,
    pub is_system_admin: bool,
}

/// 変更を発行する主体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_system_admin: bool,
}

impl Actor {
    pub fn new(user_id: Uuid, is_system_admin: bool) -> Self {
        Self {
            user_id,
            is_system_admin,
        }
    }
}

/// スナップショットとして読み込む範囲
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub actor_id: Option<Uuid>,
    pub user_ids: BTreeSet<Uuid>,
    pub organization_ids: BTreeSet<Uuid>,
    pub project_ids: BTreeSet<Uuid>,
}

impl SnapshotRequest {
    pub fn for_actor(actor_id: Uuid) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Default::default()
        }
    }

    pub fn include(&mut self, key: &IdentityKey) {
        self.user_ids.insert(key.user_id);
        self.include_scope(key.scope);
    }

    /// スコープの全割り当てを読み込み対象にする
    pub fn include_scope(&mut self, scope: Scope) {
        match scope {
            Scope::Organization(id) => {
                self.organization_ids.insert(id);
            }
            Scope::Project(id) => {
                self.project_ids.insert(id);
            }
        }
    }
}

/// 1回の呼び出しの間だけ借用する読み取り専用のメンバーシップ状態
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    organizations: BTreeSet<Uuid>,
    projects: BTreeMap<Uuid, ProjectInfo>,
    users: BTreeMap<Uuid, UserAccount>,
    assignments: BTreeMap<IdentityKey, RoleAssignment>,
}

impl MembershipSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(mut self, id: Uuid) -> Self {
        self.insert_organization(id);
        self
    }

    pub fn with_project(mut self, id: Uuid, organization_id: Option<Uuid>) -> Self {
        self.insert_project(ProjectInfo {
            id,
            organization_id,
        });
        self
    }

    pub fn with_user(mut self, id: Uuid, is_active: bool) -> Self {
        self.insert_user(UserAccount {
            id,
            is_active,
            is_system_admin: false,
        });
        self
    }

    pub fn with_assignment(mut self, user_id: Uuid, scope: Scope, role: Role) -> Self {
        self.insert_assignment(RoleAssignment::new(user_id, scope, role));
        self
    }

    pub fn insert_organization(&mut self, id: Uuid) {
        self.organizations.insert(id);
    }

    pub fn insert_project(&mut self, project: ProjectInfo) {
        self.projects.insert(project.id, project);
    }

    pub fn insert_user(&mut self, user: UserAccount) {
        self.users.insert(user.id, user);
    }

    pub fn insert_assignment(&mut self, assignment: RoleAssignment) {
        self.assignments.insert(assignment.key(), assignment);
    }

    /// スコープが既知か（プロジェクトの所属組織も含めて解決できるか）
    pub fn has_scope(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Organization(id) => self.organizations.contains(id),
            Scope::Project(id) => match self.projects.get(id) {
                Some(project) => project
                    .organization_id
                    .is_none_or(|org_id| self.organizations.contains(&org_id)),
                None => false,
            },
        }
    }

    pub fn owning_organization(&self, project_id: Uuid) -> Option<Uuid> {
        self.projects
            .get(&project_id)
            .and_then(|project| project.organization_id)
    }

    pub fn role_of(&self, key: &IdentityKey) -> Option<Role> {
        self.assignments.get(key).map(|assignment| assignment.role)
    }

    pub fn user(&self, user_id: Uuid) -> Option<&UserAccount> {
        self.users.get(&user_id)
    }

    /// スコープ内で指定ロールを保持するユーザー
    pub fn holders(&self, scope: Scope, role: Role) -> BTreeSet<Uuid> {
        self.assignments
            .values()
            .filter(|assignment| assignment.scope == scope && assignment.role == role)
            .map(|assignment| assignment.user_id)
            .collect()
    }

    pub fn assignments_of(&self, user_id: Uuid) -> impl Iterator<Item = &RoleAssignment> {
        self.assignments
            .values()
            .filter(move |assignment| assignment.user_id == user_id)
    }

    pub fn assignments(&self) -> impl Iterator<Item = &RoleAssignment> {
        self.assignments.values()
    }
}
