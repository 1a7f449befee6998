// permission-backend/src/repository/membership_state_provider.rs

use crate::domain::execution_plan::{ApplyMode, ApplyReport, ExecutionPlan};
use crate::domain::membership_snapshot::{MembershipSnapshot, RoleAssignment, SnapshotRequest};
use crate::domain::validation_report::DirectoryTotals;
use crate::error::AppResult;
use async_trait::async_trait;

/// メンバーシップの永続状態へのアクセスを抽象化するトレイト
///
/// エンジンは `snapshot` で読み込んだ状態だけを参照し、書き込みは `apply` に委ねる。
#[async_trait]
pub trait MembershipStateProvider: Send + Sync {
    /// バッチが触れるユーザー・スコープ（と呼び出し元）の読み取りスナップショット
    async fn snapshot(&self, request: &SnapshotRequest) -> AppResult<MembershipSnapshot>;

    /// 計画を前提条件を検証しながら適用する
    async fn apply(&self, plan: &ExecutionPlan, mode: ApplyMode) -> AppResult<ApplyReport>;

    /// 現在のすべてのロール割り当て
    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>>;

    async fn directory_totals(&self) -> AppResult<DirectoryTotals>;
}
