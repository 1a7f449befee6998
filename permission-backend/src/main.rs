// src/main.rs
use migration::{Migrator, MigratorTrait};
use permission_backend::api::AppState;
use permission_backend::app_router;
use permission_backend::config::AppConfig;
use permission_backend::db::create_db_pool;
use permission_backend::repository::{
    InMemoryMembershipRepository, MembershipRepository, MembershipStateProvider,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // トレーシングの設定
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "permission_backend=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    tracing::info!("Starting Permission Backend server...");

    // 設定を読み込む
    let app_config = AppConfig::from_env()?;
    tracing::info!(
        environment = %app_config.environment,
        permission = ?app_config.permission,
        "Configuration loaded"
    );

    // 状態プロバイダーを選択
    let provider: Arc<dyn MembershipStateProvider> = match &app_config.database_url {
        Some(database_url) => {
            let db_pool = create_db_pool(database_url).await?;
            Migrator::up(&db_pool, None).await?;
            tracing::info!("Database pool created and migrations applied.");
            Arc::new(MembershipRepository::new(db_pool))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using in-memory membership state");
            Arc::new(InMemoryMembershipRepository::new())
        }
    };

    let server_addr = app_config.server_addr();
    let app_router = app_router(AppState::new(app_config, provider));

    // サーバーの起動
    tracing::info!("Router configured. Server listening on {}", server_addr);

    let listener = TcpListener::bind(&server_addr).await?;
    axum::serve(listener, app_router.into_make_service()).await?;

    Ok(())
}
