// permission-backend/src/repository/in_memory_membership_repository.rs

use crate::domain::execution_plan::{
    ApplyFailure, ApplyMode, ApplyReport, ExecutionPlan, PlannedMutation,
};
use crate::domain::membership_snapshot::{
    MembershipSnapshot, ProjectInfo, RoleAssignment, SnapshotRequest, UserAccount,
};
use crate::domain::permission_change::IdentityKey;
use crate::domain::role_model::Role;
use crate::domain::scope::Scope;
use crate::domain::validation_report::DirectoryTotals;
use crate::error::AppResult;
use crate::log_with_context;
use crate::repository::membership_state_provider::MembershipStateProvider;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MembershipState {
    users: BTreeMap<Uuid, UserAccount>,
    organizations: BTreeSet<Uuid>,
    projects: BTreeMap<Uuid, ProjectInfo>,
    assignments: BTreeMap<IdentityKey, RoleAssignment>,
}

/// プロセス内で状態を保持するプロバイダー（開発・テスト用）
#[derive(Clone, Default)]
pub struct InMemoryMembershipRepository {
    state: Arc<RwLock<MembershipState>>,
}

impl InMemoryMembershipRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: Uuid, is_active: bool) {
        self.insert_account(UserAccount {
            id: user_id,
            is_active,
            is_system_admin: false,
        })
        .await;
    }

    pub async fn insert_account(&self, account: UserAccount) {
        self.state.write().await.users.insert(account.id, account);
    }

    pub async fn insert_organization(&self, organization_id: Uuid) {
        self.state
            .write()
            .await
            .organizations
            .insert(organization_id);
    }

    pub async fn insert_project(&self, project_id: Uuid, organization_id: Option<Uuid>) {
        self.state.write().await.projects.insert(
            project_id,
            ProjectInfo {
                id: project_id,
                organization_id,
            },
        );
    }

    pub async fn insert_assignment(&self, user_id: Uuid, scope: Scope, role: Role) {
        let assignment = RoleAssignment::new(user_id, scope, role);
        self.state
            .write()
            .await
            .assignments
            .insert(assignment.key(), assignment);
    }

    /// 外部からの同時変更を再現するために割り当てを直接削除する
    pub async fn remove_assignment(&self, user_id: Uuid, scope: Scope) {
        self.state
            .write()
            .await
            .assignments
            .remove(&IdentityKey::new(user_id, scope));
    }

    pub async fn role_of(&self, user_id: Uuid, scope: Scope) -> Option<Role> {
        self.state
            .read()
            .await
            .assignments
            .get(&IdentityKey::new(user_id, scope))
            .map(|assignment| assignment.role)
    }
}

#[async_trait]
impl MembershipStateProvider for InMemoryMembershipRepository {
    async fn snapshot(&self, request: &SnapshotRequest) -> AppResult<MembershipSnapshot> {
        let state = self.state.read().await;
        let mut snapshot = MembershipSnapshot::new();

        let mut organizations = request.organization_ids.clone();
        for project_id in &request.project_ids {
            if let Some(project) = state.projects.get(project_id) {
                snapshot.insert_project(*project);
                if let Some(organization_id) = project.organization_id {
                    organizations.insert(organization_id);
                }
            }
        }
        for organization_id in &organizations {
            if state.organizations.contains(organization_id) {
                snapshot.insert_organization(*organization_id);
            }
        }

        let mut users = request.user_ids.clone();
        users.extend(request.actor_id);
        for user_id in &users {
            if let Some(account) = state.users.get(user_id) {
                snapshot.insert_user(*account);
            }
        }

        for assignment in state.assignments.values() {
            let in_scope = match assignment.scope {
                Scope::Organization(id) => organizations.contains(&id),
                Scope::Project(id) => request.project_ids.contains(&id),
            };
            if in_scope || Some(assignment.user_id) == request.actor_id {
                snapshot.insert_assignment(assignment.clone());
            }
        }

        Ok(snapshot)
    }

    async fn apply(&self, plan: &ExecutionPlan, mode: ApplyMode) -> AppResult<ApplyReport> {
        let mut state = self.state.write().await;

        let report = match mode {
            ApplyMode::BestEffort => {
                let mut report = ApplyReport::default();
                let mut failed_keys = BTreeSet::new();
                for step in &plan.steps {
                    if step.prerequisites_failed(&failed_keys) {
                        failed_keys.insert(step.mutation.key);
                        report
                            .failed
                            .push(ApplyFailure::prerequisite_failed(step.mutation.clone()));
                        continue;
                    }
                    match apply_step(&mut state.assignments, step) {
                        Ok(()) => report.applied.push(step.mutation.clone()),
                        Err(failure) => {
                            failed_keys.insert(step.mutation.key);
                            report.failed.push(failure);
                        }
                    }
                }
                report
            }
            ApplyMode::Atomic => {
                let mut staged = state.assignments.clone();
                let mut failure = None;
                for step in &plan.steps {
                    if let Err(error) = apply_step(&mut staged, step) {
                        failure = Some(error);
                        break;
                    }
                }
                match failure {
                    Some(failure) => ApplyReport::rolled_back(plan, failure),
                    None => {
                        state.assignments = staged;
                        ApplyReport {
                            applied: plan.mutations().cloned().collect(),
                            failed: Vec::new(),
                        }
                    }
                }
            }
        };

        log_with_context!(
            tracing::Level::DEBUG,
            "Applied plan to in-memory state",
            "mode" => mode,
            "applied" => report.applied.len(),
            "failed" => report.failed.len()
        );

        Ok(report)
    }

    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .values()
            .cloned()
            .collect())
    }

    async fn directory_totals(&self) -> AppResult<DirectoryTotals> {
        let state = self.state.read().await;
        Ok(DirectoryTotals {
            users: state.users.len() as u64,
            active_users: state.users.values().filter(|user| user.is_active).count() as u64,
            organizations: state.organizations.len() as u64,
            projects: state.projects.len() as u64,
            independent_projects: state
                .projects
                .values()
                .filter(|project| project.organization_id.is_none())
                .count() as u64,
        })
    }
}

fn apply_step(
    assignments: &mut BTreeMap<IdentityKey, RoleAssignment>,
    step: &PlannedMutation,
) -> Result<(), ApplyFailure> {
    let key = step.mutation.key;
    let current = assignments.get(&key).map(|assignment| assignment.role);
    if !step.precondition.holds(current) {
        return Err(ApplyFailure::precondition_failed(
            step.mutation.clone(),
            step.precondition,
            current,
        ));
    }

    match step.mutation.target_role() {
        Some(role) => match assignments.get_mut(&key) {
            Some(existing) => existing.role = role,
            None => {
                assignments.insert(key, RoleAssignment::new(key.user_id, key.scope, role));
            }
        },
        None => {
            assignments.remove(&key);
        }
    }
    Ok(())
}
