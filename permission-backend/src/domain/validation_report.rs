// permission-backend/src/domain/validation_report.rs
use crate::domain::conflict::{Conflict, ConflictKind, ResolvedConflict, Severity};
use crate::domain::execution_plan::{ApplyFailure, ApplyMode, ExecutionPlan};
use crate::domain::permission_change::NormalizedMutation;
use serde::Serialize;
use std::collections::BTreeMap;

/// スコープごとの変更件数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeCounts {
    pub adds: usize,
    pub removes: usize,
    pub role_changes: usize,
    pub total: usize,
}

/// 変更集合の集計結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeStatistics {
    pub adds: usize,
    pub removes: usize,
    pub role_changes: usize,
    pub total: usize,
    /// キーはスコープの表示形式（`organization:<id>` / `project:<id>`）
    pub by_scope: BTreeMap<String, ScopeCounts>,
}

/// ドライラン・実行の両方で返す検証結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// BLOCKING な競合が残っていないか
    pub valid: bool,
    pub conflicts: Vec<Conflict>,
    pub resolved_mutations: Vec<NormalizedMutation>,
    pub remaining_conflicts: Vec<Conflict>,
    pub unresolved_blocking_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ConflictAnalysis>,
    /// 送信された競合一覧がサーバー側の再計算結果と異なるか
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_conflicts: Option<bool>,
}

/// comprehensive-validate で追加される詳細
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictAnalysis {
    pub normalized_mutations: Vec<NormalizedMutation>,
    pub resolved_conflicts: Vec<ResolvedConflict>,
    pub skipped_mutations: Vec<NormalizedMutation>,
    pub by_kind: BTreeMap<ConflictKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub statistics: ChangeStatistics,
    pub plan: ExecutionPlan,
}

impl ConflictAnalysis {
    pub fn count_conflicts(
        conflicts: &[Conflict],
    ) -> (BTreeMap<ConflictKind, usize>, BTreeMap<Severity, usize>) {
        let mut by_kind = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        for conflict in conflicts {
            *by_kind.entry(conflict.kind).or_insert(0) += 1;
            *by_severity.entry(conflict.severity).or_insert(0) += 1;
        }
        (by_kind, by_severity)
    }
}

/// bulk-changes / csv-execute の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub mode: ApplyMode,
    pub applied: Vec<NormalizedMutation>,
    pub failed: Vec<ApplyFailure>,
    /// 自動解決で破棄された変更
    pub skipped: Vec<NormalizedMutation>,
    /// `applied` の集計
    pub statistics: ChangeStatistics,
    pub plan: ExecutionPlan,
    pub resolved_conflicts: Vec<ResolvedConflict>,
}

/// 現在の状態に対する統計
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipStatistics {
    pub summary: ChangeStatistics,
    pub by_role: BTreeMap<String, usize>,
    pub totals: DirectoryTotals,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryTotals {
    pub users: u64,
    pub active_users: u64,
    pub organizations: u64,
    pub projects: u64,
    pub independent_projects: u64,
}
