// permission-backend/src/service/permission_engine/execution_planner.rs
use crate::domain::execution_plan::{ExecutionPlan, PlannedMutation, Precondition};
use crate::domain::membership_snapshot::MembershipSnapshot;
use crate::domain::permission_change::{IdentityKey, NormalizedMutation};
use crate::log_with_context;
use std::collections::{BTreeSet, HashMap};

/// 解決済みの変更を依存関係を満たす順に並べる
///
/// 依存関係のない変更同士は正規化順を保つ（安定ソート）。これは予測可能性のため
/// の選択で、正しさには影響しない。
pub fn plan(resolved: &[NormalizedMutation], snapshot: &MembershipSnapshot) -> ExecutionPlan {
    let positions: HashMap<IdentityKey, usize> = resolved
        .iter()
        .enumerate()
        .map(|(index, mutation)| (mutation.key, index))
        .collect();

    let mut indegree = vec![0usize; resolved.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); resolved.len()];
    for (index, mutation) in resolved.iter().enumerate() {
        for prerequisite in &mutation.depends_on {
            if let Some(&before) = positions.get(prerequisite) {
                if before != index {
                    dependents[before].push(index);
                    indegree[index] += 1;
                }
            }
        }
    }

    // 実行可能な変更のうち正規化順で最も早いものを常に選ぶ
    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| index)
        .collect();
    let mut order = Vec::with_capacity(resolved.len());
    while let Some(index) = ready.pop_first() {
        order.push(index);
        for &dependent in &dependents[index] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < resolved.len() {
        let leftover: Vec<usize> = (0..resolved.len())
            .filter(|index| indegree[*index] > 0)
            .collect();
        log_with_context!(
            tracing::Level::WARN,
            "Dependency cycle in execution plan, keeping normalized order for the rest",
            "cycle_size" => leftover.len()
        );
        order.extend(leftover);
    }

    let steps = order
        .into_iter()
        .enumerate()
        .map(|(step, index)| {
            let mutation = resolved[index].clone();
            let precondition = Precondition {
                expected_role: snapshot.role_of(&mutation.key),
            };
            PlannedMutation {
                step,
                mutation,
                precondition,
            }
        })
        .collect();

    ExecutionPlan { steps }
}
