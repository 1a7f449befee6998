// permission-backend/src/api/handlers/permission_change_handler.rs

use crate::api::dto::permission_change_dto::{
    into_change_requests, AutoResolveConflictsRequest, ChangeBatchBody, ChangeRequestDto,
    ExecuteChangesRequest, ValidateChangesRequest,
};
use crate::api::AppState;
use crate::domain::role_model::{organization_role_catalog, project_role_catalog, RoleCatalogEntry};
use crate::domain::scope::Scope;
use crate::domain::user_permissions::{ScopeMember, UserPermissions};
use crate::domain::validation_report::{ExecutionReport, MembershipStatistics, ValidationReport};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::service::permission_change_service::ChangeSource;
use crate::types::ApiResponse;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

// ネストした検証エラーを "changes[0].reason: ..." 形式に平坦化する
fn handle_validation_error(err: ValidationErrors) -> AppError {
    fn collect(prefix: &str, errors: &ValidationErrors, messages: &mut Vec<String>) {
        for (field, kind) in errors.errors() {
            let path = if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{}.{}", prefix, field)
            };
            match kind {
                ValidationErrorsKind::Field(field_errors) => {
                    for error in field_errors {
                        let message = error
                            .message
                            .as_ref()
                            .map_or_else(|| "Invalid value".to_string(), |m| m.to_string());
                        messages.push(format!("{}: {}", path, message));
                    }
                }
                ValidationErrorsKind::Struct(nested) => collect(&path, nested, messages),
                ValidationErrorsKind::List(items) => {
                    for (index, nested) in items {
                        collect(&format!("{}[{}]", path, index), nested, messages);
                    }
                }
            }
        }
    }

    let mut messages = Vec::new();
    collect("", &err, &mut messages);
    messages.sort();

    if messages.is_empty() {
        AppError::ValidationError("Validation failed".to_string())
    } else {
        AppError::ValidationErrors(messages)
    }
}

// 必須項目の欠落などの構造エラーは 400 として返す
fn parse_body<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    let Json(body) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    body.validate().map_err(handle_validation_error)?;
    Ok(body)
}

// 変更要求の配列そのものも、オブジェクト形式も受け付ける
fn parse_batch_body<T>(payload: Result<Json<ChangeBatchBody<T>>, JsonRejection>) -> AppResult<T>
where
    T: Validate + From<Vec<ChangeRequestDto>>,
{
    let Json(body) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let body = body.into_request();
    body.validate().map_err(handle_validation_error)?;
    Ok(body)
}

/// 変更を適用せずに検証
pub async fn validate_changes_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ChangeBatchBody<ValidateChangesRequest>>, JsonRejection>,
) -> AppResult<ApiResponse<ValidationReport>> {
    let payload = parse_batch_body(payload)?;
    let requests = into_change_requests(payload.changes, max_batch_size(&app_state))?;

    let report = app_state
        .permission_change_service
        .validate_changes(user.actor(), &requests, &payload.decisions)
        .await?;

    Ok(ApiResponse::success(report).with_message("Changes validated"))
}

/// 競合の分類・重要度・提案を含めて検証
pub async fn comprehensive_validate_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ChangeBatchBody<ValidateChangesRequest>>, JsonRejection>,
) -> AppResult<ApiResponse<ValidationReport>> {
    let payload = parse_batch_body(payload)?;
    let requests = into_change_requests(payload.changes, max_batch_size(&app_state))?;

    let report = app_state
        .permission_change_service
        .comprehensive_validate(user.actor(), &requests, &payload.decisions)
        .await?;

    Ok(ApiResponse::success(report).with_message("Comprehensive validation completed"))
}

/// 競合を再計算して自動解決
pub async fn auto_resolve_conflicts_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<AutoResolveConflictsRequest>, JsonRejection>,
) -> AppResult<ApiResponse<ValidationReport>> {
    let payload = parse_body(payload)?;
    let requests = into_change_requests(payload.mutations, max_batch_size(&app_state))?;

    let report = app_state
        .permission_change_service
        .auto_resolve_conflicts(
            user.actor(),
            &requests,
            &payload.conflicts,
            &payload.decisions,
        )
        .await?;

    Ok(ApiResponse::success(report).with_message("Conflicts resolved"))
}

fn max_batch_size(app_state: &AppState) -> usize {
    app_state.config.permission.max_batch_size
}

async fn execute(
    app_state: AppState,
    user: AuthenticatedUser,
    payload: ExecuteChangesRequest,
    source: ChangeSource,
) -> AppResult<ApiResponse<ExecutionReport>> {
    let requests = into_change_requests(payload.changes, max_batch_size(&app_state))?;

    let report = app_state
        .permission_change_service
        .execute_changes(
            user.actor(),
            &requests,
            &payload.decisions,
            payload.mode,
            source,
        )
        .await?;

    let message = if report.failed.is_empty() {
        "Changes applied"
    } else {
        "Changes partially applied"
    };
    Ok(ApiResponse::success(report).with_message(message))
}

/// 一括変更を実行
pub async fn bulk_changes_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ChangeBatchBody<ExecuteChangesRequest>>, JsonRejection>,
) -> AppResult<ApiResponse<ExecutionReport>> {
    let payload = parse_batch_body(payload)?;
    execute(app_state, user, payload, ChangeSource::Bulk).await
}

/// CSV から読み込まれた変更を実行
pub async fn csv_execute_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ChangeBatchBody<ExecuteChangesRequest>>, JsonRejection>,
) -> AppResult<ApiResponse<ExecutionReport>> {
    let payload = parse_batch_body(payload)?;
    execute(app_state, user, payload, ChangeSource::Csv).await
}

/// 現在のメンバーシップ統計
pub async fn statistics_handler(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<ApiResponse<MembershipStatistics>> {
    let statistics = app_state.permission_change_service.statistics().await?;
    Ok(ApiResponse::success(statistics))
}

/// 指定ユーザーの全ロール
pub async fn user_permissions_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<ApiResponse<UserPermissions>> {
    let permissions = app_state
        .permission_change_service
        .user_permissions(user.actor(), user_id)
        .await?;
    Ok(ApiResponse::success(permissions))
}

/// 呼び出し元自身の全ロール
pub async fn my_permissions_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<ApiResponse<UserPermissions>> {
    let actor = user.actor();
    let permissions = app_state
        .permission_change_service
        .user_permissions(actor, actor.user_id)
        .await?;
    Ok(ApiResponse::success(permissions))
}

pub async fn organization_members_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(organization_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<ScopeMember>>> {
    let members = app_state
        .permission_change_service
        .scope_members(user.actor(), Scope::Organization(organization_id))
        .await?;
    Ok(ApiResponse::success(members))
}

pub async fn project_members_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<ScopeMember>>> {
    let members = app_state
        .permission_change_service
        .scope_members(user.actor(), Scope::Project(project_id))
        .await?;
    Ok(ApiResponse::success(members))
}

/// 組織ロール一覧
pub async fn organization_roles_handler() -> ApiResponse<Vec<RoleCatalogEntry>> {
    ApiResponse::success(organization_role_catalog())
}

/// プロジェクトロール一覧
pub async fn project_roles_handler() -> ApiResponse<Vec<RoleCatalogEntry>> {
    ApiResponse::success(project_role_catalog())
}

pub fn user_permission_router(app_state: AppState) -> Router {
    Router::new()
        // 検証（副作用なし）
        .route(
            "/api/user-permissions/validate-changes",
            post(validate_changes_handler),
        )
        .route(
            "/api/user-permissions/comprehensive-validate",
            post(comprehensive_validate_handler),
        )
        .route(
            "/api/user-permissions/auto-resolve-conflicts",
            post(auto_resolve_conflicts_handler),
        )
        // 実行
        .route(
            "/api/user-permissions/bulk-changes",
            post(bulk_changes_handler),
        )
        .route(
            "/api/user-permissions/csv-execute",
            post(csv_execute_handler),
        )
        // 参照
        .route(
            "/api/user-permissions/statistics",
            get(statistics_handler),
        )
        .route(
            "/api/user-permissions/organization-roles",
            get(organization_roles_handler),
        )
        .route(
            "/api/user-permissions/project-roles",
            get(project_roles_handler),
        )
        .route(
            "/api/user-permissions/my-permissions",
            get(my_permissions_handler),
        )
        .route(
            "/api/user-permissions/organizations/{organization_id}/members",
            get(organization_members_handler),
        )
        .route(
            "/api/user-permissions/projects/{project_id}/members",
            get(project_members_handler),
        )
        .route(
            "/api/user-permissions/{user_id}",
            get(user_permissions_handler),
        )
        .with_state(app_state)
}
