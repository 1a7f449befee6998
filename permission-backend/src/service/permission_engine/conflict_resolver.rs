// permission-backend/src/service/permission_engine/conflict_resolver.rs
use crate::domain::conflict::{
    Conflict, ConflictKind, ConflictResolution, ResolvedConflict, SuggestedResolution,
};
use crate::domain::permission_change::{
    CallerDecision, ChangeAction, Decision, IdentityKey, NormalizedMutation,
};
use std::collections::{BTreeMap, BTreeSet};

/// 解決後の変更集合と残った競合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// 適用対象となる変更（正規化順）
    pub resolved_mutations: Vec<NormalizedMutation>,
    /// 自動解決または呼び出し元の REJECT で取り下げられた変更
    pub skipped_mutations: Vec<NormalizedMutation>,
    pub resolved_conflicts: Vec<ResolvedConflict>,
    /// 呼び出し元の確認が必要な競合（すべて BLOCKING）
    pub remaining_conflicts: Vec<Conflict>,
}

impl Resolution {
    pub fn unresolved_blocking_count(&self) -> usize {
        self.remaining_conflicts
            .iter()
            .filter(|conflict| conflict.is_blocking())
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Included,
    Dropped,
    Rejected,
    Blocked,
}

/// 競合・変更・呼び出し元の判断から解決結果を求める純粋関数
///
/// 同じ入力からは常に同じ出力（競合の順序を含む）を返す。
pub fn resolve(
    conflicts: &[Conflict],
    mutations: &[NormalizedMutation],
    decisions: &[CallerDecision],
) -> Resolution {
    let decisions: BTreeMap<IdentityKey, Decision> = decisions
        .iter()
        .map(|decision| (decision.key, decision.decision))
        .collect();
    let mut working: Vec<NormalizedMutation> = mutations.to_vec();
    let positions: BTreeMap<IdentityKey, usize> = working
        .iter()
        .enumerate()
        .map(|(index, mutation)| (mutation.key, index))
        .collect();
    let mut status = vec![Status::Included; working.len()];
    let mut outcomes: Vec<Option<ConflictResolution>> = vec![None; conflicts.len()];
    let mut effective: Vec<Conflict> = conflicts.to_vec();

    // 1. 呼び出し元が取り下げた変更
    for (key, decision) in &decisions {
        if *decision == Decision::Reject {
            if let Some(&index) = positions.get(key) {
                status[index] = Status::Rejected;
            }
        }
    }
    for (index, conflict) in conflicts.iter().enumerate() {
        if conflict
            .primary_key()
            .is_some_and(|key| decisions.get(&key) == Some(&Decision::Reject))
        {
            outcomes[index] = Some(ConflictResolution::RejectedByCaller);
        }
    }

    // 2. 自動解決
    for (index, conflict) in conflicts.iter().enumerate() {
        if outcomes[index].is_some() || !conflict.can_auto_resolve {
            continue;
        }
        let Some(strategy) = &conflict.suggested_resolution else {
            continue;
        };
        let target = conflict
            .primary_key()
            .and_then(|key| positions.get(&key).copied());
        let Some(target) = target else {
            continue;
        };
        if status[target] == Status::Dropped && *strategy != SuggestedResolution::DropMutation {
            outcomes[index] = Some(ConflictResolution::MutationDropped);
            continue;
        }

        outcomes[index] = match strategy {
            SuggestedResolution::DropMutation => {
                status[target] = Status::Dropped;
                Some(ConflictResolution::AutoDropped)
            }
            SuggestedResolution::ConvertToRoleChange => {
                working[target].action = ChangeAction::ChangeRole;
                Some(ConflictResolution::AutoConverted)
            }
            SuggestedResolution::ConvertToAdd => {
                working[target].action = ChangeAction::Add;
                Some(ConflictResolution::AutoConverted)
            }
            SuggestedResolution::ExecuteAfter { prerequisites } => {
                for prerequisite in prerequisites {
                    if !working[target].depends_on.contains(prerequisite) {
                        working[target].depends_on.push(*prerequisite);
                    }
                }
                Some(ConflictResolution::AutoOrdered)
            }
            SuggestedResolution::AlreadyMerged => Some(ConflictResolution::AlreadyMerged),
            _ => None,
        };
    }

    // 3. 自動解決できない競合
    for (index, conflict) in conflicts.iter().enumerate() {
        if outcomes[index].is_some() {
            continue;
        }
        let key = conflict.primary_key();
        let target = key.and_then(|key| positions.get(&key).copied());
        let accepted = key.is_some_and(|key| decisions.get(&key) == Some(&Decision::Accept));

        outcomes[index] = match target {
            Some(target)
                if status[target] == Status::Dropped
                    && conflict.kind != ConflictKind::PermissionDenied =>
            {
                Some(ConflictResolution::MutationDropped)
            }
            _ if accepted && conflict.is_overridable() => {
                Some(ConflictResolution::ConfirmedByCaller)
            }
            Some(target) => {
                status[target] = Status::Blocked;
                None
            }
            None => None,
        };
    }

    // 4. 前提となる変更が失われた順序付けを不動点まで格上げする
    loop {
        let mut changed = false;
        for (index, conflict) in conflicts.iter().enumerate() {
            if outcomes[index] != Some(ConflictResolution::AutoOrdered) {
                continue;
            }
            let Some(SuggestedResolution::ExecuteAfter { prerequisites }) =
                &conflict.suggested_resolution
            else {
                continue;
            };
            let Some(key) = conflict.primary_key() else {
                continue;
            };
            let Some(&target) = positions.get(&key) else {
                continue;
            };
            if status[target] != Status::Included {
                continue;
            }
            let satisfied = prerequisites.iter().any(|prerequisite| {
                positions
                    .get(prerequisite)
                    .is_some_and(|&position| status[position] == Status::Included)
            });
            if satisfied {
                continue;
            }

            effective[index].escalate();
            if decisions.get(&key) == Some(&Decision::Accept) && conflict.is_overridable() {
                outcomes[index] = Some(ConflictResolution::ConfirmedByCaller);
            } else {
                outcomes[index] = None;
                status[target] = Status::Blocked;
            }
            changed = true;
        }
        if !changed {
            break;
        }
    }

    // 適用されない変更への依存は計画に持ち込まない
    let included: BTreeSet<IdentityKey> = working
        .iter()
        .zip(&status)
        .filter(|(_, status)| **status == Status::Included)
        .map(|(mutation, _)| mutation.key)
        .collect();
    for mutation in &mut working {
        mutation
            .depends_on
            .retain(|prerequisite| included.contains(prerequisite));
    }

    let mut resolution = Resolution::default();
    for (mutation, status) in working.into_iter().zip(status) {
        match status {
            Status::Included => resolution.resolved_mutations.push(mutation),
            Status::Dropped | Status::Rejected => resolution.skipped_mutations.push(mutation),
            Status::Blocked => {}
        }
    }
    for (conflict, outcome) in effective.into_iter().zip(outcomes) {
        match outcome {
            Some(resolution_kind) => resolution.resolved_conflicts.push(ResolvedConflict {
                conflict,
                resolution: resolution_kind,
            }),
            None => resolution.remaining_conflicts.push(conflict),
        }
    }
    resolution
}
