// permission-backend/src/service/permission_engine/normalizer.rs
use super::policy::PermissionPolicy;
use crate::domain::conflict::{Conflict, ConflictKind, ConflictReason, SuggestedResolution};
use crate::domain::permission_change::{
    ChangeAction, ChangeRequest, IdentityKey, NormalizedMutation,
};
use crate::domain::permission_error::PermissionChangeError;
use std::collections::HashMap;

/// 正規化の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    /// 初出順に並んだキーごとの変更
    pub mutations: Vec<NormalizedMutation>,
    /// 正規化から除外された要求の競合（ロール指定のない CHANGE_ROLE）
    pub conflicts: Vec<Conflict>,
}

/// 変更要求をキー（ユーザー × スコープ）ごとに1件へ畳み込む
///
/// 入力の構造的な誤りはバッチ全体の拒否として即座に返す。
pub fn normalize(
    requests: &[ChangeRequest],
    policy: &PermissionPolicy,
) -> Result<NormalizedBatch, PermissionChangeError> {
    if requests.len() > policy.max_batch_size {
        return Err(PermissionChangeError::BatchTooLarge {
            size: requests.len(),
            limit: policy.max_batch_size,
        });
    }

    let mut batch = NormalizedBatch::default();
    let mut positions: HashMap<IdentityKey, usize> = HashMap::new();

    for (index, request) in requests.iter().enumerate() {
        check_structure(index, request)?;

        if request.action == ChangeAction::ChangeRole && request.requested_role.is_none() {
            batch.conflicts.push(
                Conflict::blocking(
                    ConflictKind::Contradictory,
                    ConflictReason::MissingRole,
                    request.identity_key(),
                    Some(SuggestedResolution::ProvideRole),
                    format!(
                        "Change #{} for {} is a role change without a requested role",
                        index,
                        request.identity_key()
                    ),
                )
                .with_request_index(index),
            );
            continue;
        }

        let key = request.identity_key();
        match positions.get(&key) {
            Some(&position) => batch.mutations[position].absorb(request),
            None => {
                positions.insert(key, batch.mutations.len());
                batch
                    .mutations
                    .push(NormalizedMutation::from_request(request, index));
            }
        }
    }

    Ok(batch)
}

fn check_structure(index: usize, request: &ChangeRequest) -> Result<(), PermissionChangeError> {
    if request.action == ChangeAction::Add && request.requested_role.is_none() {
        return Err(PermissionChangeError::MissingRole { index });
    }
    if let Some(role) = request.requested_role {
        if request.action.requires_role() && role.kind() != request.scope.kind() {
            return Err(PermissionChangeError::InvalidRole {
                index,
                message: format!(
                    "role {} cannot be granted in {} scope",
                    role,
                    request.scope.kind()
                ),
            });
        }
    }
    Ok(())
}

/// 正規化済みの変更を1キー1要求の形に展開する
pub fn expand(mutations: &[NormalizedMutation]) -> Vec<ChangeRequest> {
    mutations.iter().map(NormalizedMutation::to_request).collect()
}
