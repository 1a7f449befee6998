// src/db.rs
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;

pub type DbPool = DatabaseConnection;

pub async fn create_db_pool(database_url: &str) -> Result<DbPool, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_string());

    // 接続オプションを設定
    opt.max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8 * 60))
        .sqlx_logging(false);

    Database::connect(opt).await
}
