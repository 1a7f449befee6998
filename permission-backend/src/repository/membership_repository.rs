// permission-backend/src/repository/membership_repository.rs

use crate::domain::execution_plan::{
    ApplyFailure, ApplyMode, ApplyReport, ExecutionPlan, PlannedMutation,
};
use crate::domain::membership_snapshot::{MembershipSnapshot, RoleAssignment, SnapshotRequest};
use crate::domain::organization_member_model::{
    self as organization_member, Entity as OrganizationMemberEntity,
};
use crate::domain::organization_model::{self as organization, Entity as OrganizationEntity};
use crate::domain::permission_change::IdentityKey;
use crate::domain::project_member_model::{self as project_member, Entity as ProjectMemberEntity};
use crate::domain::project_model::{self as project, Entity as ProjectEntity};
use crate::domain::role_model::Role;
use crate::domain::scope::Scope;
use crate::domain::user_model::{self as user, Entity as UserEntity};
use crate::domain::validation_report::DirectoryTotals;
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::repository::membership_state_provider::MembershipStateProvider;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use std::collections::BTreeSet;
use uuid::Uuid;

/// 行ロック付きで読み込んだ現在の所属行
enum MemberRow {
    Organization(organization_member::Model),
    Project(project_member::Model),
}

impl MemberRow {
    fn role(&self) -> AppResult<Role> {
        let assignment = match self {
            MemberRow::Organization(model) => model.to_assignment(),
            MemberRow::Project(model) => model.to_assignment(),
        };
        stored_assignment(assignment).map(|assignment| assignment.role)
    }
}

/// 保存済みのロール文字列が解釈できない行は不整合として扱う
fn stored_assignment(assignment: Option<RoleAssignment>) -> AppResult<RoleAssignment> {
    assignment.ok_or_else(|| {
        AppError::InternalServerError("Stored membership has an unknown role".to_string())
    })
}

fn collect_assignments(
    organization_members: &[organization_member::Model],
    project_members: &[project_member::Model],
) -> AppResult<Vec<RoleAssignment>> {
    organization_members
        .iter()
        .map(|model| stored_assignment(model.to_assignment()))
        .chain(
            project_members
                .iter()
                .map(|model| stored_assignment(model.to_assignment())),
        )
        .collect()
}

#[derive(Clone)]
pub struct MembershipRepository {
    db: DatabaseConnection,
}

impl MembershipRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// ユーザーを作成
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        is_system_admin: bool,
    ) -> AppResult<user::Model> {
        let now = Utc::now();
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            is_active: Set(true),
            is_system_admin: Set(is_system_admin),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(AppError::from)
    }

    /// 組織を作成
    pub async fn create_organization(&self, name: &str) -> AppResult<organization::Model> {
        let now = Utc::now();
        organization::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(AppError::from)
    }

    /// プロジェクトを作成（組織なしは独立プロジェクト）
    pub async fn create_project(
        &self,
        name: &str,
        organization_id: Option<Uuid>,
    ) -> AppResult<project::Model> {
        let now = Utc::now();
        project::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(AppError::from)
    }

    /// 検証を通さずにロールを直接付与する
    pub async fn grant(&self, user_id: Uuid, scope: Scope, role: Role) -> AppResult<()> {
        write_role(&self.db, &IdentityKey::new(user_id, scope), None, Some(role)).await
    }

    pub async fn role_of(&self, user_id: Uuid, scope: Scope) -> AppResult<Option<Role>> {
        let key = IdentityKey::new(user_id, scope);
        match find_row(&self.db, &key, false).await? {
            Some(row) => Ok(Some(row.role()?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MembershipStateProvider for MembershipRepository {
    async fn snapshot(&self, request: &SnapshotRequest) -> AppResult<MembershipSnapshot> {
        let mut snapshot = MembershipSnapshot::new();

        let projects = ProjectEntity::find()
            .filter(project::Column::Id.is_in(request.project_ids.iter().copied()))
            .all(&self.db)
            .await?;

        let mut organization_ids: BTreeSet<Uuid> = request.organization_ids.clone();
        for model in &projects {
            organization_ids.extend(model.organization_id);
            snapshot.insert_project(model.to_info());
        }

        let organizations = OrganizationEntity::find()
            .filter(organization::Column::Id.is_in(organization_ids.iter().copied()))
            .all(&self.db)
            .await?;
        for model in &organizations {
            snapshot.insert_organization(model.id);
        }

        let mut user_ids = request.user_ids.clone();
        user_ids.extend(request.actor_id);
        let users = UserEntity::find()
            .filter(user::Column::Id.is_in(user_ids.iter().copied()))
            .all(&self.db)
            .await?;
        for model in &users {
            snapshot.insert_user(model.to_account());
        }

        let mut organization_condition = Condition::any().add(
            organization_member::Column::OrganizationId.is_in(organization_ids.iter().copied()),
        );
        let mut project_condition = Condition::any().add(
            project_member::Column::ProjectId.is_in(request.project_ids.iter().copied()),
        );
        if let Some(actor_id) = request.actor_id {
            organization_condition =
                organization_condition.add(organization_member::Column::UserId.eq(actor_id));
            project_condition = project_condition.add(project_member::Column::UserId.eq(actor_id));
        }

        let organization_members = OrganizationMemberEntity::find()
            .filter(organization_condition)
            .all(&self.db)
            .await?;
        let project_members = ProjectMemberEntity::find()
            .filter(project_condition)
            .all(&self.db)
            .await?;

        for assignment in collect_assignments(&organization_members, &project_members)? {
            snapshot.insert_assignment(assignment);
        }

        Ok(snapshot)
    }

    async fn apply(&self, plan: &ExecutionPlan, mode: ApplyMode) -> AppResult<ApplyReport> {
        let report = match mode {
            ApplyMode::BestEffort => {
                let mut report = ApplyReport::default();
                let mut failed_keys = BTreeSet::new();
                // 変更ごとに独立したトランザクション
                for step in &plan.steps {
                    if step.prerequisites_failed(&failed_keys) {
                        failed_keys.insert(step.mutation.key);
                        report
                            .failed
                            .push(ApplyFailure::prerequisite_failed(step.mutation.clone()));
                        continue;
                    }
                    let txn = self.db.begin().await?;
                    match apply_step(&txn, step).await? {
                        Ok(()) => {
                            txn.commit().await?;
                            report.applied.push(step.mutation.clone());
                        }
                        Err(failure) => {
                            txn.rollback().await?;
                            failed_keys.insert(step.mutation.key);
                            report.failed.push(failure);
                        }
                    }
                }
                report
            }
            ApplyMode::Atomic => {
                let txn = self.db.begin().await?;
                let mut failure = None;
                for step in &plan.steps {
                    if let Err(error) = apply_step(&txn, step).await? {
                        failure = Some(error);
                        break;
                    }
                }
                match failure {
                    Some(failure) => {
                        txn.rollback().await?;
                        ApplyReport::rolled_back(plan, failure)
                    }
                    None => {
                        txn.commit().await?;
                        ApplyReport {
                            applied: plan.mutations().cloned().collect(),
                            failed: Vec::new(),
                        }
                    }
                }
            }
        };

        log_with_context!(
            tracing::Level::INFO,
            "Applied execution plan",
            "mode" => mode,
            "applied" => report.applied.len(),
            "failed" => report.failed.len()
        );

        Ok(report)
    }

    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>> {
        let organization_members = OrganizationMemberEntity::find().all(&self.db).await?;
        let project_members = ProjectMemberEntity::find().all(&self.db).await?;

        collect_assignments(&organization_members, &project_members)
    }

    async fn directory_totals(&self) -> AppResult<DirectoryTotals> {
        let users = UserEntity::find().count(&self.db).await?;
        let active_users = UserEntity::find()
            .filter(user::Column::IsActive.eq(true))
            .count(&self.db)
            .await?;
        let organizations = OrganizationEntity::find().count(&self.db).await?;
        let projects = ProjectEntity::find().count(&self.db).await?;
        let independent_projects = ProjectEntity::find()
            .filter(project::Column::OrganizationId.is_null())
            .count(&self.db)
            .await?;

        Ok(DirectoryTotals {
            users,
            active_users,
            organizations,
            projects,
            independent_projects,
        })
    }
}

async fn find_row<C: ConnectionTrait>(
    conn: &C,
    key: &IdentityKey,
    for_update: bool,
) -> AppResult<Option<MemberRow>> {
    match key.scope {
        Scope::Organization(organization_id) => {
            let mut query = OrganizationMemberEntity::find()
                .filter(organization_member::Column::OrganizationId.eq(organization_id))
                .filter(organization_member::Column::UserId.eq(key.user_id));
            if for_update {
                query = query.lock_exclusive();
            }
            let row = query.one(conn).await?;
            Ok(row.map(MemberRow::Organization))
        }
        Scope::Project(project_id) => {
            let mut query = ProjectMemberEntity::find()
                .filter(project_member::Column::ProjectId.eq(project_id))
                .filter(project_member::Column::UserId.eq(key.user_id));
            if for_update {
                query = query.lock_exclusive();
            }
            let row = query.one(conn).await?;
            Ok(row.map(MemberRow::Project))
        }
    }
}

/// 前提条件を確認してから1件を書き込む
///
/// 外側の `Result` はデータベース障害、内側は前提条件の不一致。
async fn apply_step<C: ConnectionTrait>(
    conn: &C,
    step: &PlannedMutation,
) -> AppResult<Result<(), ApplyFailure>> {
    let key = step.mutation.key;
    let row = find_row(conn, &key, true).await?;
    let current = match &row {
        Some(row) => Some(row.role()?),
        None => None,
    };
    if !step.precondition.holds(current) {
        return Ok(Err(ApplyFailure::precondition_failed(
            step.mutation.clone(),
            step.precondition,
            current,
        )));
    }

    write_role(conn, &key, row, step.mutation.target_role()).await?;
    Ok(Ok(()))
}

async fn write_role<C: ConnectionTrait>(
    conn: &C,
    key: &IdentityKey,
    row: Option<MemberRow>,
    role: Option<Role>,
) -> AppResult<()> {
    let now = Utc::now();
    match (row, role) {
        (Some(MemberRow::Organization(model)), Some(role)) => {
            let mut active: organization_member::ActiveModel = model.into();
            active.role = Set(role.as_str().to_string());
            active.updated_at = Set(now);
            active.update(conn).await?;
        }
        (Some(MemberRow::Project(model)), Some(role)) => {
            let mut active: project_member::ActiveModel = model.into();
            active.role = Set(role.as_str().to_string());
            active.updated_at = Set(now);
            active.update(conn).await?;
        }
        (Some(MemberRow::Organization(model)), None) => {
            OrganizationMemberEntity::delete_by_id(model.id).exec(conn).await?;
        }
        (Some(MemberRow::Project(model)), None) => {
            ProjectMemberEntity::delete_by_id(model.id).exec(conn).await?;
        }
        (None, Some(role)) => match key.scope {
            Scope::Organization(organization_id) => {
                organization_member::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    organization_id: Set(organization_id),
                    user_id: Set(key.user_id),
                    role: Set(role.as_str().to_string()),
                    joined_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(conn)
                .await?;
            }
            Scope::Project(project_id) => {
                project_member::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    project_id: Set(project_id),
                    user_id: Set(key.user_id),
                    role: Set(role.as_str().to_string()),
                    joined_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(conn)
                .await?;
            }
        },
        (None, None) => {}
    }
    Ok(())
}
