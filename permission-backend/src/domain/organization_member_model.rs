// permission-backend/src/domain/organization_member_model.rs

use crate::domain::membership_snapshot::RoleAssignment;
use crate::domain::role_model::{OrganizationRole, Role};
use crate::domain::scope::Scope;
use chrono::{DateTime, Utc};
use sea_orm::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "organization_members")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::organization_model::Entity",
        from = "Column::OrganizationId",
        to = "super::organization_model::Column::Id"
    )]
    Organization,
    #[sea_orm(
        belongs_to = "super::user_model::Entity",
        from = "Column::UserId",
        to = "super::user_model::Column::Id"
    )]
    User,
}

impl Related<super::organization_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::user_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 保存されているロール名が不正な行は None
    pub fn to_assignment(&self) -> Option<RoleAssignment> {
        let role = OrganizationRole::from_str(&self.role)?;
        Some(RoleAssignment {
            user_id: self.user_id,
            scope: Scope::Organization(self.organization_id),
            role: Role::Organization(role),
            granted_at: self.joined_at,
        })
    }
}
