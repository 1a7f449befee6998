// permission-backend/src/service/permission_change_service.rs

use crate::domain::conflict::{Conflict, ConflictKind, ConflictReason};
use crate::domain::execution_plan::ApplyMode;
use crate::domain::membership_snapshot::{Actor, MembershipSnapshot, SnapshotRequest};
use crate::domain::permission_change::{CallerDecision, ChangeRequest, IdentityKey};
use crate::domain::permission_error::PermissionChangeError;
use crate::domain::scope::Scope;
use crate::domain::user_permissions::{ScopeMember, UserPermissions};
use crate::domain::validation_report::{
    ConflictAnalysis, ExecutionReport, MembershipStatistics, ValidationReport,
};
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::repository::membership_state_provider::MembershipStateProvider;
use crate::service::permission_engine::{
    authority, statistics, Evaluation, NormalizedBatch, PermissionChangeEngine,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// 実行要求の出所（ログ用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Bulk,
    Csv,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSource::Bulk => "bulk",
            ChangeSource::Csv => "csv",
        }
    }
}

/// 検証済みのバッチと、その評価に使ったスナップショット
struct PreparedBatch {
    actor: Actor,
    batch: NormalizedBatch,
    snapshot: MembershipSnapshot,
}

pub struct PermissionChangeService {
    engine: PermissionChangeEngine,
    provider: Arc<dyn MembershipStateProvider>,
    default_mode: ApplyMode,
}

impl PermissionChangeService {
    pub fn new(
        engine: PermissionChangeEngine,
        provider: Arc<dyn MembershipStateProvider>,
        default_mode: ApplyMode,
    ) -> Self {
        Self {
            engine,
            provider,
            default_mode,
        }
    }

    pub fn default_mode(&self) -> ApplyMode {
        self.default_mode
    }

    /// 変更を適用せずに検証する
    pub async fn validate_changes(
        &self,
        actor: Actor,
        requests: &[ChangeRequest],
        decisions: &[CallerDecision],
    ) -> AppResult<ValidationReport> {
        let prepared = self.prepare(actor, requests).await?;
        let evaluation = self.evaluate(prepared, decisions);
        let report = compact_report(evaluation);

        log_with_context!(
            tracing::Level::INFO,
            "Validated permission changes",
            "actor_id" => actor.user_id,
            "requests" => requests.len(),
            "conflicts" => report.conflicts.len(),
            "unresolved_blocking" => report.unresolved_blocking_count
        );

        Ok(report)
    }

    /// 競合の分類・重要度・解決内容を含めて検証する
    pub async fn comprehensive_validate(
        &self,
        actor: Actor,
        requests: &[ChangeRequest],
        decisions: &[CallerDecision],
    ) -> AppResult<ValidationReport> {
        let prepared = self.prepare(actor, requests).await?;
        let evaluation = self.evaluate(prepared, decisions);
        let report = self.detailed_report(evaluation);

        log_with_context!(
            tracing::Level::INFO,
            "Comprehensive validation completed",
            "actor_id" => actor.user_id,
            "requests" => requests.len(),
            "conflicts" => report.conflicts.len(),
            "unresolved_blocking" => report.unresolved_blocking_count
        );

        Ok(report)
    }

    /// 送信された競合は信用せず、サーバー側で再計算して解決する
    pub async fn auto_resolve_conflicts(
        &self,
        actor: Actor,
        mutations: &[ChangeRequest],
        submitted_conflicts: &[Conflict],
        decisions: &[CallerDecision],
    ) -> AppResult<ValidationReport> {
        let prepared = self.prepare(actor, mutations).await?;
        let evaluation = self.evaluate(prepared, decisions);
        let stale = conflicts_differ(submitted_conflicts, &evaluation.conflicts);
        if stale {
            log_with_context!(
                tracing::Level::WARN,
                "Submitted conflicts differ from recomputed conflicts",
                "actor_id" => actor.user_id,
                "submitted" => submitted_conflicts.len(),
                "recomputed" => evaluation.conflicts.len()
            );
        }

        let mut report = self.detailed_report(evaluation);
        report.stale_conflicts = Some(stale);

        log_with_context!(
            tracing::Level::INFO,
            "Auto-resolved conflicts",
            "actor_id" => actor.user_id,
            "resolved_mutations" => report.resolved_mutations.len(),
            "remaining_conflicts" => report.remaining_conflicts.len()
        );

        Ok(report)
    }

    /// 解決済みの計画を状態プロバイダーに適用する
    ///
    /// BLOCKING な競合が残っている場合は何も適用せずにバッチ全体を拒否する。
    pub async fn execute_changes(
        &self,
        actor: Actor,
        requests: &[ChangeRequest],
        decisions: &[CallerDecision],
        mode: Option<ApplyMode>,
        source: ChangeSource,
    ) -> AppResult<ExecutionReport> {
        let mode = mode.unwrap_or(self.default_mode);
        let prepared = self.prepare(actor, requests).await?;
        let evaluation = self.evaluate(prepared, decisions);

        let unresolved = evaluation.unresolved_blocking_count();
        if unresolved > 0 {
            let remaining = evaluation.resolution.remaining_conflicts;
            log_with_context!(
                tracing::Level::WARN,
                "Rejected permission changes with unresolved conflicts",
                "actor_id" => actor.user_id,
                "source" => source.as_str(),
                "unresolved_blocking" => unresolved
            );
            let denied_only = remaining
                .iter()
                .all(|conflict| conflict.kind == ConflictKind::PermissionDenied);
            if denied_only {
                let message = remaining
                    .first()
                    .map(|conflict| conflict.message.clone())
                    .unwrap_or_default();
                return Err(PermissionChangeError::PermissionDenied(message).into());
            }
            return Err(
                PermissionChangeError::UnresolvedBlockingConflict(unresolved, remaining).into(),
            );
        }

        let outcome = self.provider.apply(&evaluation.plan, mode).await?;
        let statistics = self.engine.summarize(&outcome.applied);

        log_with_context!(
            tracing::Level::INFO,
            "Executed permission changes",
            "actor_id" => actor.user_id,
            "source" => source.as_str(),
            "mode" => mode,
            "planned" => evaluation.plan.len(),
            "applied" => outcome.applied.len(),
            "failed" => outcome.failed.len(),
            "skipped" => evaluation.resolution.skipped_mutations.len()
        );

        Ok(ExecutionReport {
            mode,
            applied: outcome.applied,
            failed: outcome.failed,
            skipped: evaluation.resolution.skipped_mutations,
            statistics,
            plan: evaluation.plan,
            resolved_conflicts: evaluation.resolution.resolved_conflicts,
        })
    }

    /// 現在の割り当て全体に対する統計
    pub async fn statistics(&self) -> AppResult<MembershipStatistics> {
        let assignments = self.provider.list_assignments().await?;
        let totals = self.provider.directory_totals().await?;

        log_with_context!(
            tracing::Level::DEBUG,
            "Computed membership statistics",
            "assignments" => assignments.len(),
            "users" => totals.users
        );

        Ok(MembershipStatistics {
            summary: statistics::summarize_assignments(&assignments),
            by_role: statistics::count_by_role(&assignments),
            totals,
        })
    }

    /// ユーザーの全ロール（本人またはシステム管理者のみ）
    pub async fn user_permissions(
        &self,
        actor: Actor,
        user_id: Uuid,
    ) -> AppResult<UserPermissions> {
        let mut request = SnapshotRequest::for_actor(user_id);
        request.user_ids.insert(actor.user_id);
        let snapshot = self.provider.snapshot(&request).await?;

        let actor = effective_actor(actor, &snapshot);
        if !actor.is_system_admin && actor.user_id != user_id {
            return Err(PermissionChangeError::PermissionDenied(format!(
                "Only the user or a system administrator may view the roles of {}",
                user_id
            ))
            .into());
        }
        let account = snapshot
            .user(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let permissions = UserPermissions::new(account, snapshot.assignments_of(user_id));

        log_with_context!(
            tracing::Level::DEBUG,
            "Loaded user permissions",
            "actor_id" => actor.user_id,
            "user_id" => user_id,
            "organizations" => permissions.organization_memberships.len(),
            "projects" => permissions.project_memberships.len()
        );

        Ok(permissions)
    }

    /// スコープのメンバー一覧（スコープの関係者またはシステム管理者のみ）
    pub async fn scope_members(&self, actor: Actor, scope: Scope) -> AppResult<Vec<ScopeMember>> {
        let mut request = SnapshotRequest::for_actor(actor.user_id);
        request.user_ids.insert(actor.user_id);
        request.include_scope(scope);
        let snapshot = self.provider.snapshot(&request).await?;

        if !snapshot.has_scope(&scope) {
            return Err(AppError::NotFound(format!("Scope {} not found", scope)));
        }
        let actor = effective_actor(actor, &snapshot);
        if !authority::can_view_scope(&actor, scope, &snapshot) {
            return Err(PermissionChangeError::PermissionDenied(format!(
                "Viewing members of {} requires a role in it",
                scope
            ))
            .into());
        }

        let assignments: Vec<_> = snapshot
            .assignments()
            .filter(|assignment| assignment.scope == scope)
            .cloned()
            .collect();
        let accounts = self
            .provider
            .snapshot(&SnapshotRequest {
                user_ids: assignments.iter().map(|a| a.user_id).collect(),
                ..Default::default()
            })
            .await?;

        let members: Vec<ScopeMember> = assignments
            .into_iter()
            .map(|assignment| ScopeMember {
                user_id: assignment.user_id,
                role: assignment.role,
                is_active: accounts
                    .user(assignment.user_id)
                    .is_some_and(|account| account.is_active),
                granted_at: assignment.granted_at,
            })
            .collect();

        log_with_context!(
            tracing::Level::DEBUG,
            "Listed scope members",
            "actor_id" => actor.user_id,
            "scope" => scope,
            "members" => members.len()
        );

        Ok(members)
    }

    /// 正規化 → スナップショット読み込み → スコープ確認 → 呼び出し元の資格確認
    async fn prepare(&self, actor: Actor, requests: &[ChangeRequest]) -> AppResult<PreparedBatch> {
        let batch = self.engine.normalize(requests)?;

        let mut request = SnapshotRequest::for_actor(actor.user_id);
        for change in requests {
            request.include(&change.identity_key());
        }
        let snapshot = self.provider.snapshot(&request).await?;

        self.engine.check_scopes(requests, &snapshot)?;

        let actor = effective_actor(actor, &snapshot);
        self.engine.check_caller(&actor, requests, &snapshot)?;

        log_with_context!(
            tracing::Level::DEBUG,
            "Prepared permission change batch",
            "actor_id" => actor.user_id,
            "requests" => requests.len(),
            "normalized" => batch.mutations.len(),
            "assignments_loaded" => snapshot.assignments().count()
        );

        Ok(PreparedBatch {
            actor,
            batch,
            snapshot,
        })
    }

    fn evaluate(&self, prepared: PreparedBatch, decisions: &[CallerDecision]) -> Evaluation {
        self.engine.evaluate(
            prepared.batch,
            &prepared.snapshot,
            &prepared.actor,
            decisions,
        )
    }

    fn detailed_report(&self, evaluation: Evaluation) -> ValidationReport {
        let (by_kind, by_severity) = ConflictAnalysis::count_conflicts(&evaluation.conflicts);
        let analysis = ConflictAnalysis {
            normalized_mutations: evaluation.mutations.clone(),
            resolved_conflicts: evaluation.resolution.resolved_conflicts.clone(),
            skipped_mutations: evaluation.resolution.skipped_mutations.clone(),
            by_kind,
            by_severity,
            statistics: self.engine.summarize(&evaluation.resolution.resolved_mutations),
            plan: evaluation.plan.clone(),
        };
        let mut report = compact_report(evaluation);
        report.analysis = Some(analysis);
        report
    }
}

/// アカウント側のシステム管理者フラグも有効
fn effective_actor(actor: Actor, snapshot: &MembershipSnapshot) -> Actor {
    Actor::new(
        actor.user_id,
        actor.is_system_admin
            || snapshot
                .user(actor.user_id)
                .is_some_and(|account| account.is_system_admin),
    )
}

fn compact_report(evaluation: Evaluation) -> ValidationReport {
    let unresolved_blocking_count = evaluation.unresolved_blocking_count();
    ValidationReport {
        valid: unresolved_blocking_count == 0,
        conflicts: evaluation.conflicts,
        resolved_mutations: evaluation.resolution.resolved_mutations,
        remaining_conflicts: evaluation.resolution.remaining_conflicts,
        unresolved_blocking_count,
        analysis: None,
        stale_conflicts: None,
    }
}

/// 競合集合を (種別, 理由, 主体) で比較する。バッチ内重複は入力形式に依存するため除外
fn conflicts_differ(submitted: &[Conflict], recomputed: &[Conflict]) -> bool {
    type Signature = (ConflictKind, ConflictReason, Option<IdentityKey>);

    fn signature(conflicts: &[Conflict]) -> HashSet<Signature> {
        conflicts
            .iter()
            .filter(|conflict| conflict.reason != ConflictReason::BatchDuplicate)
            .map(|conflict| (conflict.kind, conflict.reason, conflict.primary_key()))
            .collect()
    }
    signature(submitted) != signature(recomputed)
}
