// permission-backend/src/service/permission_engine/conflict_detector.rs
use super::authority;
use super::policy::PermissionPolicy;
use crate::domain::conflict::{
    Conflict, ConflictKind, ConflictReason, Severity, SuggestedResolution,
};
use crate::domain::membership_snapshot::{Actor, MembershipSnapshot};
use crate::domain::permission_change::{ChangeAction, IdentityKey, NormalizedMutation};
use crate::domain::role_model::Role;
use crate::domain::scope::{Scope, ScopeKind};
use std::collections::{BTreeSet, HashMap};

/// 正規化済みの変更と現在の状態から競合を検出する
///
/// 1件の変更が複数の規則に該当した場合はすべて報告する。出力は変更の順序、
/// 同一変更内では規則の評価順に並ぶ。
pub fn detect(
    mutations: &[NormalizedMutation],
    snapshot: &MembershipSnapshot,
    actor: &Actor,
    policy: &PermissionPolicy,
) -> Vec<Conflict> {
    let detector = Detector::new(mutations, snapshot, policy);
    let mut conflicts = Vec::new();

    for mutation in mutations {
        if let Some(conflict) = detector.batch_duplicate(mutation) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = authority::check(actor, mutation, snapshot) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = detector.system_admin_target(mutation, actor) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = detector.account_state(mutation) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = detector.membership_state(mutation) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = detector.last_holder(mutation) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = detector.hierarchy(mutation) {
            conflicts.push(conflict);
        }
    }

    conflicts
}

struct Detector<'a> {
    snapshot: &'a MembershipSnapshot,
    policy: &'a PermissionPolicy,
    by_key: HashMap<IdentityKey, &'a NormalizedMutation>,
    mutations: &'a [NormalizedMutation],
}

impl<'a> Detector<'a> {
    fn new(
        mutations: &'a [NormalizedMutation],
        snapshot: &'a MembershipSnapshot,
        policy: &'a PermissionPolicy,
    ) -> Self {
        let by_key = mutations
            .iter()
            .map(|mutation| (mutation.key, mutation))
            .collect();
        Self {
            snapshot,
            policy,
            by_key,
            mutations,
        }
    }

    fn batch_duplicate(&self, mutation: &NormalizedMutation) -> Option<Conflict> {
        if mutation.superseded_count == 0 {
            return None;
        }
        Some(Conflict::auto(
            ConflictKind::Duplicate,
            ConflictReason::BatchDuplicate,
            Severity::Info,
            mutation.key,
            SuggestedResolution::AlreadyMerged,
            format!(
                "{} entries for {} were merged into one {}",
                mutation.superseded_count + 1,
                mutation.key,
                mutation.action
            ),
        ))
    }

    fn system_admin_target(
        &self,
        mutation: &NormalizedMutation,
        actor: &Actor,
    ) -> Option<Conflict> {
        if actor.is_system_admin {
            return None;
        }
        let account = self.snapshot.user(mutation.key.user_id)?;
        if !account.is_system_admin {
            return None;
        }
        Some(Conflict::blocking(
            ConflictKind::PermissionDenied,
            ConflictReason::SystemAdminTarget,
            mutation.key,
            Some(SuggestedResolution::RequestHigherAuthority),
            format!(
                "User {} is a system administrator; only system administrators may change their memberships",
                mutation.key.user_id
            ),
        ))
    }

    fn account_state(&self, mutation: &NormalizedMutation) -> Option<Conflict> {
        if mutation.action == ChangeAction::Remove {
            return None;
        }
        match self.snapshot.user(mutation.key.user_id) {
            None => Some(Conflict::blocking(
                ConflictKind::Contradictory,
                ConflictReason::UnknownUser,
                mutation.key,
                Some(SuggestedResolution::DropMutation),
                format!("User {} does not exist", mutation.key.user_id),
            )),
            Some(account) if !account.is_active => Some(Conflict::auto(
                ConflictKind::Contradictory,
                ConflictReason::InactiveUser,
                Severity::Warning,
                mutation.key,
                SuggestedResolution::DropMutation,
                format!(
                    "User {} is deactivated and cannot receive roles",
                    mutation.key.user_id
                ),
            )),
            Some(_) => None,
        }
    }

    fn membership_state(&self, mutation: &NormalizedMutation) -> Option<Conflict> {
        let current = self.snapshot.role_of(&mutation.key);
        match (mutation.action, current, mutation.role) {
            (ChangeAction::Add | ChangeAction::ChangeRole, Some(current), Some(requested))
                if current == requested =>
            {
                Some(Conflict::auto(
                    ConflictKind::Redundant,
                    ConflictReason::AlreadyHoldsRole,
                    Severity::Info,
                    mutation.key,
                    SuggestedResolution::DropMutation,
                    format!("{} already holds {}", mutation.key, current),
                ))
            }
            (ChangeAction::Add, Some(current), Some(requested)) => Some(Conflict::auto(
                ConflictKind::Duplicate,
                ConflictReason::MembershipExists,
                Severity::Warning,
                mutation.key,
                SuggestedResolution::ConvertToRoleChange,
                format!(
                    "{} is already a member with {}; the grant of {} becomes a role change",
                    mutation.key, current, requested
                ),
            )),
            (ChangeAction::ChangeRole, None, _) => Some(Conflict::auto(
                ConflictKind::Contradictory,
                ConflictReason::NoMembershipToChange,
                Severity::Warning,
                mutation.key,
                SuggestedResolution::ConvertToAdd,
                format!(
                    "{} has no membership to change; the change becomes an addition",
                    mutation.key
                ),
            )),
            (ChangeAction::Remove, None, _) => Some(Conflict::auto(
                ConflictKind::Contradictory,
                ConflictReason::NoMembershipToRemove,
                Severity::Warning,
                mutation.key,
                SuggestedResolution::DropMutation,
                format!("{} has no membership to remove", mutation.key),
            )),
            _ => None,
        }
    }

    /// スコープ最上位ロールの最後の保持者を失わせる変更
    fn last_holder(&self, mutation: &NormalizedMutation) -> Option<Conflict> {
        let scope = mutation.key.scope;
        let highest = Role::highest_for(scope.kind());
        if scope.kind() == ScopeKind::Project && !self.policy.protect_last_project_manager {
            return None;
        }
        if self.snapshot.role_of(&mutation.key) != Some(highest)
            || mutation.target_role() == Some(highest)
        {
            return None;
        }

        let remaining: BTreeSet<_> = self
            .snapshot
            .holders(scope, highest)
            .into_iter()
            .filter(|user_id| !self.vacates(IdentityKey::new(*user_id, scope), highest))
            .collect();
        if !remaining.is_empty() {
            return None;
        }

        let reason = match scope.kind() {
            ScopeKind::Organization => ConflictReason::LastOwnerRemoval,
            ScopeKind::Project => ConflictReason::LastManagerRemoval,
        };
        let replacements = self.replacements(scope, highest);
        if replacements.is_empty() {
            return Some(Conflict::blocking(
                ConflictKind::Duplicate,
                reason,
                mutation.key,
                Some(SuggestedResolution::AppointReplacement),
                format!(
                    "{} would leave {} without any {}",
                    mutation.action, scope, highest
                ),
            ));
        }

        Some(Conflict::auto(
            ConflictKind::Duplicate,
            reason,
            Severity::Warning,
            mutation.key,
            SuggestedResolution::ExecuteAfter {
                prerequisites: replacements,
            },
            format!(
                "{} of the last {} in {} runs after the replacement is appointed",
                mutation.action, highest, scope
            ),
        ))
    }

    /// プロジェクトロールの前提となる組織メンバーシップ
    fn hierarchy(&self, mutation: &NormalizedMutation) -> Option<Conflict> {
        let Scope::Project(project_id) = mutation.key.scope else {
            return None;
        };
        if mutation.action == ChangeAction::Remove || !self.policy.require_organization_membership
        {
            return None;
        }

        let Some(organization_id) = self.snapshot.owning_organization(project_id) else {
            if self.policy.exempt_independent_projects {
                return None;
            }
            return Some(Conflict::blocking(
                ConflictKind::HierarchyViolation,
                ConflictReason::IndependentProject,
                mutation.key,
                None,
                format!(
                    "{} has no organization, so project roles cannot satisfy the membership prerequisite",
                    mutation.key.scope
                ),
            ));
        };

        let organization_key =
            IdentityKey::new(mutation.key.user_id, Scope::Organization(organization_id));
        let companion = self.by_key.get(&organization_key);

        if self.snapshot.role_of(&organization_key).is_some() {
            return match companion {
                Some(companion) if companion.action == ChangeAction::Remove => {
                    Some(Conflict::blocking(
                        ConflictKind::HierarchyViolation,
                        ConflictReason::OrganizationMembershipRemoved,
                        mutation.key,
                        Some(SuggestedResolution::DropMutation),
                        format!(
                            "The same batch removes {} from organization:{} which {} requires",
                            mutation.key.user_id, organization_id, mutation.key.scope
                        ),
                    ))
                }
                _ => None,
            };
        }

        match companion {
            Some(companion) if companion.action != ChangeAction::Remove => Some(Conflict::auto(
                ConflictKind::HierarchyViolation,
                ConflictReason::OrganizationMembershipRequired,
                Severity::Warning,
                mutation.key,
                SuggestedResolution::ExecuteAfter {
                    prerequisites: vec![organization_key],
                },
                format!(
                    "{} runs after {} joins organization:{}",
                    mutation.key, mutation.key.user_id, organization_id
                ),
            )),
            _ => Some(Conflict::blocking(
                ConflictKind::HierarchyViolation,
                ConflictReason::OrganizationMembershipRequired,
                mutation.key,
                Some(SuggestedResolution::GrantOrganizationMembership { organization_id }),
                format!(
                    "{} is not a member of organization:{} which owns {}",
                    mutation.key.user_id, organization_id, mutation.key.scope
                ),
            )),
        }
    }

    /// バッチ内の変更がこのキーから最上位ロールを外すか
    fn vacates(&self, key: IdentityKey, highest: Role) -> bool {
        self.by_key
            .get(&key)
            .is_some_and(|mutation| mutation.target_role() != Some(highest))
    }

    /// 同じスコープで最上位ロールを新たに付与する変更（バッチ内の順序）
    fn replacements(&self, scope: Scope, highest: Role) -> Vec<IdentityKey> {
        self.mutations
            .iter()
            .filter(|candidate| {
                candidate.key.scope == scope
                    && candidate.target_role() == Some(highest)
                    && self.snapshot.role_of(&candidate.key) != Some(highest)
            })
            .map(|candidate| candidate.key)
            .collect()
    }
}
