// permission-backend/src/service/permission_engine/authority.rs
use crate::domain::conflict::{Conflict, ConflictKind, ConflictReason, SuggestedResolution};
use crate::domain::membership_snapshot::{Actor, MembershipSnapshot};
use crate::domain::permission_change::{ChangeAction, IdentityKey, NormalizedMutation};
use crate::domain::role_model::{OrganizationRole, ProjectRole, Role};
use crate::domain::scope::Scope;
use uuid::Uuid;

/// 呼び出し元がどこかで管理権限を持っているか
pub fn has_any_authority(actor: &Actor, snapshot: &MembershipSnapshot) -> bool {
    actor.is_system_admin
        || snapshot
            .assignments_of(actor.user_id)
            .any(|assignment| assignment.role.can_manage())
}

/// スコープのメンバー一覧を参照できるか
///
/// スコープ自体のメンバー、プロジェクトなら所属組織のメンバーも参照できる。
pub fn can_view_scope(actor: &Actor, scope: Scope, snapshot: &MembershipSnapshot) -> bool {
    if actor.is_system_admin
        || snapshot
            .role_of(&IdentityKey::new(actor.user_id, scope))
            .is_some()
    {
        return true;
    }
    match scope {
        Scope::Organization(_) => false,
        Scope::Project(project_id) => {
            snapshot
                .owning_organization(project_id)
                .is_some_and(|organization_id| {
                    snapshot
                        .role_of(&IdentityKey::new(
                            actor.user_id,
                            Scope::Organization(organization_id),
                        ))
                        .is_some()
                })
        }
    }
}

/// 変更を発行する権限を検査し、不足していれば PERMISSION_DENIED の競合を返す
pub fn check(
    actor: &Actor,
    mutation: &NormalizedMutation,
    snapshot: &MembershipSnapshot,
) -> Option<Conflict> {
    if actor.is_system_admin {
        return None;
    }
    // 自分自身の脱退は常に許可（最後のオーナー保護は別途適用される）
    if mutation.action == ChangeAction::Remove && mutation.key.user_id == actor.user_id {
        return None;
    }

    let denial = match mutation.key.scope {
        Scope::Organization(organization_id) => {
            check_organization(actor.user_id, organization_id, mutation, snapshot)
        }
        Scope::Project(project_id) => check_project(actor.user_id, project_id, mutation, snapshot),
    }?;

    Some(Conflict::blocking(
        ConflictKind::PermissionDenied,
        denial.reason,
        mutation.key,
        Some(SuggestedResolution::RequestHigherAuthority),
        denial.message,
    ))
}

struct Denial {
    reason: ConflictReason,
    message: String,
}

impl Denial {
    fn new(reason: ConflictReason, message: String) -> Self {
        Self { reason, message }
    }
}

fn check_organization(
    actor_id: Uuid,
    organization_id: Uuid,
    mutation: &NormalizedMutation,
    snapshot: &MembershipSnapshot,
) -> Option<Denial> {
    let scope = Scope::Organization(organization_id);
    let actor_role = match snapshot.role_of(&IdentityKey::new(actor_id, scope)) {
        Some(role) if role.can_manage() => role,
        _ => {
            return Some(Denial::new(
                ConflictReason::InsufficientAuthority,
                format!("Managing members of {} requires ADMIN or OWNER", scope),
            ))
        }
    };

    let owner = Role::Organization(OrganizationRole::Owner);
    if mutation.target_role() == Some(owner) && actor_role != owner {
        return Some(Denial::new(
            ConflictReason::OwnerGrantRequiresOwner,
            format!("Only an OWNER can grant OWNER in {}", scope),
        ));
    }

    check_precedence(actor_role, mutation, snapshot)
}

fn check_project(
    actor_id: Uuid,
    project_id: Uuid,
    mutation: &NormalizedMutation,
    snapshot: &MembershipSnapshot,
) -> Option<Denial> {
    // 所属組織の ADMIN 以上はプロジェクトを無条件に管理できる
    if let Some(organization_id) = snapshot.owning_organization(project_id) {
        let organization_key = IdentityKey::new(actor_id, Scope::Organization(organization_id));
        if snapshot
            .role_of(&organization_key)
            .is_some_and(|role| role.can_manage())
        {
            return None;
        }
    }

    let scope = Scope::Project(project_id);
    let actor_role = match snapshot.role_of(&IdentityKey::new(actor_id, scope)) {
        Some(role) if role.can_manage() => role,
        _ => {
            return Some(Denial::new(
                ConflictReason::InsufficientAuthority,
                format!(
                    "Managing members of {} requires a project management role or organization ADMIN",
                    scope
                ),
            ))
        }
    };

    let manager = Role::Project(ProjectRole::ProjectManager);
    if mutation.target_role() == Some(manager) && actor_role != manager {
        return Some(Denial::new(
            ConflictReason::ManagerGrantRequiresManager,
            format!("Only a PROJECT_MANAGER can grant PROJECT_MANAGER in {}", scope),
        ));
    }

    check_precedence(actor_role, mutation, snapshot)
}

fn check_precedence(
    actor_role: Role,
    mutation: &NormalizedMutation,
    snapshot: &MembershipSnapshot,
) -> Option<Denial> {
    if let Some(current) = snapshot.role_of(&mutation.key) {
        if current.outranks(&actor_role) {
            return Some(Denial::new(
                ConflictReason::TargetOutranksActor,
                format!(
                    "{} holds {} which outranks the caller's {}",
                    mutation.key, current, actor_role
                ),
            ));
        }
    }
    if let Some(target) = mutation.target_role() {
        if target.outranks(&actor_role) {
            return Some(Denial::new(
                ConflictReason::RoleAboveActor,
                format!("Cannot grant {} above the caller's {}", target, actor_role),
            ));
        }
    }
    None
}
