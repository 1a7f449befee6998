// permission-backend/src/service/permission_engine/mod.rs

//! 権限変更の検証と競合解決
//!
//! 正規化 → 競合検出 → 解決 → 計画 → 集計の各段階は純粋関数で、
//! 1回の呼び出しの間は借用したスナップショットだけを参照する。

pub mod authority;
pub mod conflict_detector;
pub mod conflict_resolver;
pub mod execution_planner;
pub mod normalizer;
pub mod policy;
pub mod statistics;

pub use conflict_resolver::Resolution;
pub use normalizer::NormalizedBatch;
pub use policy::PermissionPolicy;

use crate::domain::conflict::Conflict;
use crate::domain::execution_plan::ExecutionPlan;
use crate::domain::membership_snapshot::{Actor, MembershipSnapshot};
use crate::domain::permission_change::{
    CallerDecision, ChangeAction, ChangeRequest, NormalizedMutation,
};
use crate::domain::permission_error::PermissionChangeError;
use crate::domain::validation_report::ChangeStatistics;

/// 1バッチ分の評価結果
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub mutations: Vec<NormalizedMutation>,
    /// 正規化段階の競合を先頭に、検出順で並ぶ
    pub conflicts: Vec<Conflict>,
    pub resolution: Resolution,
    pub plan: ExecutionPlan,
}

impl Evaluation {
    pub fn unresolved_blocking_count(&self) -> usize {
        self.resolution.unresolved_blocking_count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionChangeEngine {
    policy: PermissionPolicy,
}

impl PermissionChangeEngine {
    pub fn new(policy: PermissionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    pub fn normalize(
        &self,
        requests: &[ChangeRequest],
    ) -> Result<NormalizedBatch, PermissionChangeError> {
        normalizer::normalize(requests, &self.policy)
    }

    /// すべての要求のスコープがスナップショット上で解決できるか
    pub fn check_scopes(
        &self,
        requests: &[ChangeRequest],
        snapshot: &MembershipSnapshot,
    ) -> Result<(), PermissionChangeError> {
        match requests
            .iter()
            .position(|request| !snapshot.has_scope(&request.scope))
        {
            Some(index) => Err(PermissionChangeError::InvalidScope {
                index,
                scope: requests[index].scope,
            }),
            None => Ok(()),
        }
    }

    /// 呼び出し元に変更を提出する資格がそもそもあるか
    ///
    /// 管理権限を持たない呼び出し元でも、自分自身の脱退だけで構成されたバッチは提出できる。
    pub fn check_caller(
        &self,
        actor: &Actor,
        requests: &[ChangeRequest],
        snapshot: &MembershipSnapshot,
    ) -> Result<(), PermissionChangeError> {
        if authority::has_any_authority(actor, snapshot) {
            return Ok(());
        }
        let only_leaving = requests.iter().all(|request| {
            request.action == ChangeAction::Remove && request.user_id == actor.user_id
        });
        if only_leaving {
            Ok(())
        } else {
            Err(PermissionChangeError::PermissionDenied(format!(
                "User {} has no authority to manage memberships",
                actor.user_id
            )))
        }
    }

    pub fn detect(
        &self,
        batch: &NormalizedBatch,
        snapshot: &MembershipSnapshot,
        actor: &Actor,
    ) -> Vec<Conflict> {
        let mut conflicts = batch.conflicts.clone();
        conflicts.extend(conflict_detector::detect(
            &batch.mutations,
            snapshot,
            actor,
            &self.policy,
        ));
        conflicts
    }

    pub fn resolve(
        &self,
        conflicts: &[Conflict],
        mutations: &[NormalizedMutation],
        decisions: &[CallerDecision],
    ) -> Resolution {
        conflict_resolver::resolve(conflicts, mutations, decisions)
    }

    pub fn plan(
        &self,
        resolved: &[NormalizedMutation],
        snapshot: &MembershipSnapshot,
    ) -> ExecutionPlan {
        execution_planner::plan(resolved, snapshot)
    }

    pub fn summarize(&self, mutations: &[NormalizedMutation]) -> ChangeStatistics {
        statistics::summarize(mutations)
    }

    /// 正規化済みのバッチを検出・解決・計画まで通す
    pub fn evaluate(
        &self,
        batch: NormalizedBatch,
        snapshot: &MembershipSnapshot,
        actor: &Actor,
        decisions: &[CallerDecision],
    ) -> Evaluation {
        let conflicts = self.detect(&batch, snapshot, actor);
        let resolution = self.resolve(&conflicts, &batch.mutations, decisions);
        let plan = self.plan(&resolution.resolved_mutations, snapshot);
        Evaluation {
            mutations: batch.mutations,
            conflicts,
            resolution,
            plan,
        }
    }
}
