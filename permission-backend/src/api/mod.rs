// permission-backend/src/api/mod.rs
use crate::config::AppConfig;
use crate::domain::execution_plan::ApplyMode;
use crate::repository::MembershipStateProvider;
use crate::service::permission_change_service::PermissionChangeService;
use crate::service::permission_engine::{PermissionChangeEngine, PermissionPolicy};
use std::sync::Arc;

pub mod dto;
pub mod handlers;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub permission_change_service: Arc<PermissionChangeService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// 設定と状態プロバイダーからサービスを組み立てる
    pub fn new(config: AppConfig, provider: Arc<dyn MembershipStateProvider>) -> Self {
        let engine = PermissionChangeEngine::new(PermissionPolicy::from(&config.permission));
        let default_mode = ApplyMode::from_flag(config.permission.atomic_apply_default);
        let permission_change_service = Arc::new(PermissionChangeService::new(
            engine,
            provider,
            default_mode,
        ));
        Self {
            permission_change_service,
            config: Arc::new(config),
        }
    }
}
