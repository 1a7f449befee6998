// permission-backend/src/domain/permission_change.rs
use crate::domain::role_model::Role;
use crate::domain::scope::Scope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 変更操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    Add,
    Remove,
    ChangeRole,
}

impl ChangeAction {
    pub fn requires_role(&self) -> bool {
        !matches!(self, ChangeAction::Remove)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Add => "ADD",
            ChangeAction::Remove => "REMOVE",
            ChangeAction::ChangeRole => "CHANGE_ROLE",
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 変更の同一性キー（ユーザー × スコープ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub user_id: Uuid,
    pub scope: Scope,
}

impl IdentityKey {
    pub fn new(user_id: Uuid, scope: Scope) -> Self {
        Self { user_id, scope }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user_id, self.scope)
    }
}

/// 呼び出し元が送信する1件の変更要求
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRequest {
    pub user_id: Uuid,
    pub scope: Scope,
    pub action: ChangeAction,
    pub requested_role: Option<Role>,
    pub reason: Option<String>,
}

impl ChangeRequest {
    pub fn new(
        user_id: Uuid,
        scope: Scope,
        action: ChangeAction,
        requested_role: Option<Role>,
    ) -> Self {
        Self {
            user_id,
            scope,
            action,
            requested_role,
            reason: None,
        }
    }

    pub fn add(user_id: Uuid, scope: Scope, role: Role) -> Self {
        Self::new(user_id, scope, ChangeAction::Add, Some(role))
    }

    pub fn change_role(user_id: Uuid, scope: Scope, role: Role) -> Self {
        Self::new(user_id, scope, ChangeAction::ChangeRole, Some(role))
    }

    pub fn remove(user_id: Uuid, scope: Scope) -> Self {
        Self::new(user_id, scope, ChangeAction::Remove, None)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(self.user_id, self.scope)
    }
}

/// 正規化済みの変更（同一キーの要求を1件に畳み込んだもの）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMutation {
    #[serde(flatten)]
    pub key: IdentityKey,
    pub action: ChangeAction,
    #[serde(rename = "requested_role")]
    pub role: Option<Role>,
    /// 畳み込まれた重複要求の件数
    pub superseded_count: usize,
    /// 最初に出現した要求の位置
    pub source_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// このキーより先に実行されなければならない変更
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<IdentityKey>,
}

impl NormalizedMutation {
    pub fn from_request(request: &ChangeRequest, source_index: usize) -> Self {
        Self {
            key: request.identity_key(),
            action: request.action,
            role: role_for(request.action, request.requested_role),
            superseded_count: 0,
            source_index,
            reason: request.reason.clone(),
            depends_on: Vec::new(),
        }
    }

    /// 同一キーの後続要求を取り込む
    ///
    /// REMOVE は常に優先し、ADD の後の CHANGE_ROLE は ADD のまま新しいロールを採用する。
    pub fn absorb(&mut self, request: &ChangeRequest) {
        self.superseded_count += 1;
        let action = match (self.action, request.action) {
            (_, ChangeAction::Remove) => ChangeAction::Remove,
            (ChangeAction::Add, ChangeAction::ChangeRole) => ChangeAction::Add,
            (_, next) => next,
        };
        self.action = action;
        self.role = role_for(action, request.requested_role);
        if request.reason.is_some() {
            self.reason = request.reason.clone();
        }
    }

    /// 1キー1要求の形に戻す
    pub fn to_request(&self) -> ChangeRequest {
        ChangeRequest {
            user_id: self.key.user_id,
            scope: self.key.scope,
            action: self.action,
            requested_role: self.role,
            reason: self.reason.clone(),
        }
    }

    /// 適用後にユーザーが保持するロール（REMOVE なら None）
    pub fn target_role(&self) -> Option<Role> {
        match self.action {
            ChangeAction::Remove => None,
            _ => self.role,
        }
    }

    pub fn net_effect(&self) -> (IdentityKey, ChangeAction, Option<Role>) {
        (self.key, self.action, self.role)
    }
}

fn role_for(action: ChangeAction, role: Option<Role>) -> Option<Role> {
    if action.requires_role() {
        role
    } else {
        None
    }
}

/// 二段階確認プロトコルにおける呼び出し元の判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// 自動解決できない競合を承知のうえで適用する
    Accept,
    /// 変更を取り下げる
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerDecision {
    #[serde(flatten)]
    pub key: IdentityKey,
    pub decision: Decision,
}

impl CallerDecision {
    pub fn accept(key: IdentityKey) -> Self {
        Self {
            key,
            decision: Decision::Accept,
        }
    }

    pub fn reject(key: IdentityKey) -> Self {
        Self {
            key,
            decision: Decision::Reject,
        }
    }
}
