// permission-backend/src/api/dto/permission_change_dto.rs

use crate::domain::conflict::Conflict;
use crate::domain::execution_plan::ApplyMode;
use crate::domain::permission_change::{CallerDecision, ChangeAction, ChangeRequest};
use crate::domain::permission_error::PermissionChangeError;
use crate::domain::role_model::Role;
use crate::domain::scope::Scope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 1件の変更要求
///
/// ロール名はスコープ種別が決まってから解釈するため文字列で受け取る。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangeRequestDto {
    pub user_id: Uuid,
    pub scope: Scope,
    pub action: ChangeAction,
    #[serde(default, alias = "role")]
    pub requested_role: Option<String>,
    #[validate(length(max = 500, message = "Reason cannot exceed 500 characters"))]
    #[serde(default)]
    pub reason: Option<String>,
}

impl ChangeRequestDto {
    pub fn into_change_request(
        self,
        index: usize,
    ) -> Result<ChangeRequest, PermissionChangeError> {
        let kind = self.scope.kind();
        // REMOVE に付いたロールは使われないため解釈しない
        let role_name = match self.action {
            ChangeAction::Remove => None,
            _ => self.requested_role.as_deref().map(str::trim),
        };
        let requested_role = match role_name {
            None | Some("") => None,
            Some(name) => Some(Role::parse(kind, name).ok_or_else(|| {
                PermissionChangeError::InvalidRole {
                    index,
                    message: format!("'{}' is not a valid {} role", name, kind),
                }
            })?),
        };
        Ok(ChangeRequest {
            user_id: self.user_id,
            scope: self.scope,
            action: self.action,
            requested_role,
            reason: self.reason,
        })
    }
}

/// 変更要求の配列そのもの、または判断・モードを含むオブジェクト
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChangeBatchBody<T> {
    Changes(Vec<ChangeRequestDto>),
    Wrapped(T),
}

impl<T: From<Vec<ChangeRequestDto>>> ChangeBatchBody<T> {
    pub fn into_request(self) -> T {
        match self {
            ChangeBatchBody::Changes(changes) => T::from(changes),
            ChangeBatchBody::Wrapped(request) => request,
        }
    }
}

/// validate-changes / comprehensive-validate のリクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ValidateChangesRequest {
    #[validate(nested)]
    pub changes: Vec<ChangeRequestDto>,
    #[serde(default)]
    pub decisions: Vec<CallerDecision>,
}

impl From<Vec<ChangeRequestDto>> for ValidateChangesRequest {
    fn from(changes: Vec<ChangeRequestDto>) -> Self {
        Self {
            changes,
            decisions: Vec::new(),
        }
    }
}

/// auto-resolve-conflicts のリクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AutoResolveConflictsRequest {
    #[validate(nested)]
    pub mutations: Vec<ChangeRequestDto>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default, alias = "caller_decisions")]
    pub decisions: Vec<CallerDecision>,
}

/// bulk-changes / csv-execute のリクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExecuteChangesRequest {
    #[validate(nested)]
    pub changes: Vec<ChangeRequestDto>,
    #[serde(default)]
    pub decisions: Vec<CallerDecision>,
    /// 省略時は設定の既定値
    #[serde(default)]
    pub mode: Option<ApplyMode>,
}

impl From<Vec<ChangeRequestDto>> for ExecuteChangesRequest {
    fn from(changes: Vec<ChangeRequestDto>) -> Self {
        Self {
            changes,
            decisions: Vec::new(),
            mode: None,
        }
    }
}

/// DTO の並びをドメインの変更要求に変換する（位置はエラー報告に使う）
///
/// 件数の上限はロール名の解釈より先に確認する。
pub fn into_change_requests(
    changes: Vec<ChangeRequestDto>,
    max_batch_size: usize,
) -> Result<Vec<ChangeRequest>, PermissionChangeError> {
    if changes.len() > max_batch_size {
        return Err(PermissionChangeError::BatchTooLarge {
            size: changes.len(),
            limit: max_batch_size,
        });
    }
    changes
        .into_iter()
        .enumerate()
        .map(|(index, change)| change.into_change_request(index))
        .collect()
}
