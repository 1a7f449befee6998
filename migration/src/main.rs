// migration/src/main.rs
use sea_orm_migration::prelude::*;

// DATABASE_URL に対してマイグレーションを実行する CLI
#[async_std::main]
async fn main() {
    cli::run_cli(migration::Migrator).await;
}
