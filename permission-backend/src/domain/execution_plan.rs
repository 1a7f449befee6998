// permission-backend/src/domain/execution_plan.rs
use crate::domain::permission_change::{IdentityKey, NormalizedMutation};
use crate::domain::permission_error::ErrorKind;
use crate::domain::role_model::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 適用時に観測されるべき現在のロール（楽観的ロック）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Precondition {
    pub expected_role: Option<Role>,
}

impl Precondition {
    pub fn holds(&self, current: Option<Role>) -> bool {
        self.expected_role == current
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedMutation {
    pub step: usize,
    pub mutation: NormalizedMutation,
    pub precondition: Precondition,
}

impl PlannedMutation {
    /// 前提となる変更がすべて失敗している場合は適用してはならない
    ///
    /// 前提のうち1件でも適用されていれば順序付けは満たされる。
    pub fn prerequisites_failed(&self, failed: &BTreeSet<IdentityKey>) -> bool {
        !self.mutation.depends_on.is_empty()
            && self
                .mutation
                .depends_on
                .iter()
                .all(|prerequisite| failed.contains(prerequisite))
    }
}

/// 順序付けされた適用計画
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlannedMutation>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn mutations(&self) -> impl Iterator<Item = &NormalizedMutation> {
        self.steps.iter().map(|step| &step.mutation)
    }

    /// 計画内での位置（存在しない場合は None）
    pub fn position_of(&self, mutation: &NormalizedMutation) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| step.mutation.key == mutation.key)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyMode {
    /// 変更ごとに独立して検証・適用する
    #[default]
    BestEffort,
    /// 1件でも失敗したら全体をロールバックする
    Atomic,
}

impl ApplyMode {
    pub fn from_flag(atomic: bool) -> Self {
        if atomic {
            ApplyMode::Atomic
        } else {
            ApplyMode::BestEffort
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyFailure {
    pub mutation: NormalizedMutation,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl ApplyFailure {
    pub fn precondition_failed(
        mutation: NormalizedMutation,
        precondition: Precondition,
        observed: Option<Role>,
    ) -> Self {
        let message = format!(
            "{} {} expected {} but found {}",
            mutation.action,
            mutation.key,
            describe(precondition.expected_role),
            describe(observed)
        );
        Self {
            mutation,
            error_kind: ErrorKind::PreconditionFailed,
            message,
        }
    }

    /// 前提の変更が失敗したため適用しなかった
    pub fn prerequisite_failed(mutation: NormalizedMutation) -> Self {
        let prerequisites = mutation
            .depends_on
            .iter()
            .map(|key| key.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!(
            "{} {} skipped because its prerequisite changes failed: {}",
            mutation.action, mutation.key, prerequisites
        );
        Self {
            mutation,
            error_kind: ErrorKind::PreconditionFailed,
            message,
        }
    }

    pub fn rolled_back(mutation: NormalizedMutation) -> Self {
        let message = format!("{} {} rolled back", mutation.action, mutation.key);
        Self {
            mutation,
            error_kind: ErrorKind::RolledBack,
            message,
        }
    }
}

/// 状態プロバイダーから返される適用結果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<NormalizedMutation>,
    pub failed: Vec<ApplyFailure>,
}

impl ApplyReport {
    /// ATOMIC モードで失敗した計画の報告を組み立てる
    pub fn rolled_back(plan: &ExecutionPlan, failure: ApplyFailure) -> Self {
        let failed = plan
            .steps
            .iter()
            .map(|step| {
                if step.mutation.key == failure.mutation.key {
                    failure.clone()
                } else {
                    ApplyFailure::rolled_back(step.mutation.clone())
                }
            })
            .collect();
        Self {
            applied: Vec::new(),
            failed,
        }
    }
}

fn describe(role: Option<Role>) -> String {
    role.map_or_else(|| "no membership".to_string(), |role| role.to_string())
}
