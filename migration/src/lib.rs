// migration/src/lib.rs
pub use sea_orm_migration::prelude::*;

// ディレクトリ（ユーザー・組織・プロジェクト）
mod m20250801_000001_create_users_table;
mod m20250801_000002_create_organizations_table;
mod m20250801_000003_create_projects_table;

// メンバーシップ（スコープ × ユーザーで一意）
mod m20250801_000004_create_organization_members_table;
mod m20250801_000005_create_project_members_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            // 1. 依存関係のないテーブル
            Box::new(m20250801_000001_create_users_table::Migration),
            Box::new(m20250801_000002_create_organizations_table::Migration),
            // 2. 組織に依存するテーブル
            Box::new(m20250801_000003_create_projects_table::Migration),
            // 3. メンバーシップ
            Box::new(m20250801_000004_create_organization_members_table::Migration),
            Box::new(m20250801_000005_create_project_members_table::Migration),
        ]
    }
}
