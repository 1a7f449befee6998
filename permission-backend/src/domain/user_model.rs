// permission-backend/src/domain/user_model.rs

use chrono::{DateTime, Utc};
use sea_orm::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub is_active: bool,
    pub is_system_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::organization_member_model::Entity")]
    OrganizationMembers,
    #[sea_orm(has_many = "super::project_member_model::Entity")]
    ProjectMembers,
}

impl Related<super::organization_member_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrganizationMembers.def()
    }
}

impl Related<super::project_member_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectMembers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_account(&self) -> crate::domain::membership_snapshot::UserAccount {
        crate::domain::membership_snapshot::UserAccount {
            id: self.id,
            is_active: self.is_active,
            is_system_admin: self.is_system_admin,
        }
    }
}
