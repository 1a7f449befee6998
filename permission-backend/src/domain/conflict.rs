// permission-backend/src/domain/conflict.rs
use crate::domain::permission_change::IdentityKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 競合の種類（閉じた集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    Duplicate,
    Contradictory,
    Redundant,
    HierarchyViolation,
    PermissionDenied,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Duplicate => "DUPLICATE",
            ConflictKind::Contradictory => "CONTRADICTORY",
            ConflictKind::Redundant => "REDUNDANT",
            ConflictKind::HierarchyViolation => "HIERARCHY_VIOLATION",
            ConflictKind::PermissionDenied => "PERMISSION_DENIED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Blocking,
}

/// 競合種別をさらに細分化した検出ルール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    BatchDuplicate,
    MembershipExists,
    LastOwnerRemoval,
    LastManagerRemoval,
    AlreadyHoldsRole,
    NoMembershipToRemove,
    NoMembershipToChange,
    MissingRole,
    UnknownUser,
    InactiveUser,
    OrganizationMembershipRequired,
    OrganizationMembershipRemoved,
    IndependentProject,
    InsufficientAuthority,
    OwnerGrantRequiresOwner,
    ManagerGrantRequiresManager,
    TargetOutranksActor,
    RoleAboveActor,
    /// システム管理者のメンバーシップはシステム管理者だけが変更できる
    SystemAdminTarget,
}

/// 提案される解決方法
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestedResolution {
    /// 変更を破棄する
    DropMutation,
    /// ADD を CHANGE_ROLE に変換する
    ConvertToRoleChange,
    /// CHANGE_ROLE を ADD に変換する
    ConvertToAdd,
    /// 前提となる変更のいずれかが残る限り、それらの後に実行する
    ExecuteAfter { prerequisites: Vec<IdentityKey> },
    /// 正規化の段階で畳み込み済み
    AlreadyMerged,
    /// 以下は呼び出し元への助言（自動適用されない）
    GrantOrganizationMembership { organization_id: Uuid },
    AppointReplacement,
    ProvideRole,
    RequestHigherAuthority,
}

/// 検出された競合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub reason: ConflictReason,
    pub severity: Severity,
    /// 関係する変更。先頭が競合の主体となる変更
    pub involved: Vec<IdentityKey>,
    pub can_auto_resolve: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggested_resolution: Option<SuggestedResolution>,
    pub message: String,
    /// 正規化前の要求位置（正規化段階で検出されたもののみ）
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_index: Option<usize>,
}

impl Conflict {
    /// 自動解決可能な競合
    pub fn auto(
        kind: ConflictKind,
        reason: ConflictReason,
        severity: Severity,
        key: IdentityKey,
        resolution: SuggestedResolution,
        message: impl Into<String>,
    ) -> Self {
        let mut involved = vec![key];
        if let SuggestedResolution::ExecuteAfter { prerequisites } = &resolution {
            involved.extend(prerequisites.iter().copied());
        }
        Self {
            kind,
            reason,
            severity,
            involved,
            can_auto_resolve: true,
            suggested_resolution: Some(resolution),
            message: message.into(),
            request_index: None,
        }
    }

    /// 呼び出し元の判断が必要な競合（常に BLOCKING）
    pub fn blocking(
        kind: ConflictKind,
        reason: ConflictReason,
        key: IdentityKey,
        advice: Option<SuggestedResolution>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            reason,
            severity: Severity::Blocking,
            involved: vec![key],
            can_auto_resolve: false,
            suggested_resolution: advice,
            message: message.into(),
            request_index: None,
        }
    }

    pub fn with_request_index(mut self, index: usize) -> Self {
        self.request_index = Some(index);
        self
    }

    pub fn primary_key(&self) -> Option<IdentityKey> {
        self.involved.first().copied()
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }

    /// 呼び出し元の ACCEPT で上書きできるか
    ///
    /// 権限不足と、入力そのものが不完全な競合は上書きできない。
    pub fn is_overridable(&self) -> bool {
        self.kind != ConflictKind::PermissionDenied
            && !matches!(
                self.reason,
                ConflictReason::MissingRole | ConflictReason::UnknownUser
            )
    }

    /// 前提変更が失われたため自動解決できなくなった競合に格上げする
    pub fn escalate(&mut self) {
        self.severity = Severity::Blocking;
        self.can_auto_resolve = false;
    }
}

/// 競合がどのように解決されたか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolution {
    AutoDropped,
    AutoConverted,
    AutoOrdered,
    AlreadyMerged,
    /// 主体の変更が別の自動解決で破棄されたため無関係になった
    MutationDropped,
    ConfirmedByCaller,
    RejectedByCaller,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConflict {
    #[serde(flatten)]
    pub conflict: Conflict,
    pub resolution: ConflictResolution,
}
