// permission-backend/src/domain/scope.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ロールが適用される認可境界
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Organization(Uuid),
    Project(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeKind {
    Organization,
    Project,
}

impl Scope {
    pub fn id(&self) -> Uuid {
        match self {
            Scope::Organization(id) | Scope::Project(id) => *id,
        }
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Organization(_) => ScopeKind::Organization,
            Scope::Project(_) => ScopeKind::Project,
        }
    }

    pub fn is_organization(&self) -> bool {
        matches!(self, Scope::Organization(_))
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Organization(id) => write!(f, "organization:{}", id),
            Scope::Project(id) => write!(f, "project:{}", id),
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKind::Organization => write!(f, "organization"),
            ScopeKind::Project => write!(f, "project"),
        }
    }
}
