// permission-backend/src/service/permission_engine/statistics.rs
use crate::domain::membership_snapshot::RoleAssignment;
use crate::domain::permission_change::{ChangeAction, NormalizedMutation};
use crate::domain::validation_report::{ChangeStatistics, ScopeCounts};
use std::collections::BTreeMap;

/// 変更集合を種類・スコープごとに集計する
pub fn summarize(mutations: &[NormalizedMutation]) -> ChangeStatistics {
    let mut statistics = ChangeStatistics::default();
    for mutation in mutations {
        let counts = statistics
            .by_scope
            .entry(mutation.key.scope.to_string())
            .or_default();
        match mutation.action {
            ChangeAction::Add => {
                statistics.adds += 1;
                counts.adds += 1;
            }
            ChangeAction::Remove => {
                statistics.removes += 1;
                counts.removes += 1;
            }
            ChangeAction::ChangeRole => {
                statistics.role_changes += 1;
                counts.role_changes += 1;
            }
        }
        counts.total += 1;
        statistics.total += 1;
    }
    statistics
}

/// 現在の割り当てを ADD とみなして集計する
pub fn summarize_assignments(assignments: &[RoleAssignment]) -> ChangeStatistics {
    let mut statistics = ChangeStatistics::default();
    for assignment in assignments {
        let counts: &mut ScopeCounts = statistics
            .by_scope
            .entry(assignment.scope.to_string())
            .or_default();
        counts.adds += 1;
        counts.total += 1;
        statistics.adds += 1;
        statistics.total += 1;
    }
    statistics
}

/// ロールごとの保持者数
pub fn count_by_role(assignments: &[RoleAssignment]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for assignment in assignments {
        *counts.entry(assignment.role.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}
