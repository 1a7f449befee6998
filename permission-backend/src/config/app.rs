// permission-backend/src/config/app.rs
use std::env;

/// 権限変更エンジンの設定
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionConfig {
    pub max_batch_size: usize,
    /// プロジェクトロールの前提として組織メンバーシップを要求する
    pub require_organization_membership: bool,
    /// 組織に属さないプロジェクトを上記の前提から除外する
    pub exempt_independent_projects: bool,
    /// 最後のプロジェクトマネージャーの削除を禁止する
    pub protect_last_project_manager: bool,
    pub atomic_apply_default: bool,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            require_organization_membership: true,
            exempt_independent_projects: true,
            protect_last_project_manager: true,
            atomic_apply_default: false,
        }
    }
}

impl PermissionConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            max_batch_size: env::var("PERMISSION_MAX_BATCH_SIZE")
                .unwrap_or_else(|_| defaults.max_batch_size.to_string())
                .parse()
                .map_err(|_| "Invalid PERMISSION_MAX_BATCH_SIZE value")?,
            require_organization_membership: bool_var(
                "PERMISSION_REQUIRE_ORG_MEMBERSHIP",
                defaults.require_organization_membership,
            )?,
            exempt_independent_projects: bool_var(
                "PERMISSION_EXEMPT_INDEPENDENT_PROJECTS",
                defaults.exempt_independent_projects,
            )?,
            protect_last_project_manager: bool_var(
                "PERMISSION_PROTECT_LAST_PROJECT_MANAGER",
                defaults.protect_last_project_manager,
            )?,
            atomic_apply_default: bool_var(
                "PERMISSION_ATOMIC_APPLY_DEFAULT",
                defaults.atomic_apply_default,
            )?,
        })
    }
}

fn bool_var(name: &str, default: bool) -> Result<bool, String> {
    match env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(format!("Invalid {} value", name)),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    /// 未設定の場合はインメモリの状態プロバイダーで起動する
    pub database_url: Option<String>,
    pub permission: PermissionConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok(); // .env ファイルを読み込む (存在しなくてもエラーにしない)

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            environment,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| "Invalid PORT value")?,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            permission: PermissionConfig::from_env()?,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_test(&self) -> bool {
        self.environment == "test"
    }

    /// テスト用の設定を作成
    pub fn for_testing() -> Self {
        Self {
            environment: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5000,
            database_url: None,
            permission: PermissionConfig::default(),
        }
    }
}
