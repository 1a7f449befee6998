// permission-backend/src/domain/role_model.rs
use crate::domain::scope::ScopeKind;
use serde::{Deserialize, Serialize, Serializer};

/// 組織内でのロール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizationRole {
    Owner,
    Admin,
    Member,
}

/// プロジェクト内でのロール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectRole {
    ProjectManager,
    LeadDeveloper,
    Developer,
    Tester,
    Contributor,
    Viewer,
}

impl OrganizationRole {
    pub const ALL: [OrganizationRole; 3] = [
        OrganizationRole::Owner,
        OrganizationRole::Admin,
        OrganizationRole::Member,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationRole::Owner => "OWNER",
            OrganizationRole::Admin => "ADMIN",
            OrganizationRole::Member => "MEMBER",
        }
    }

    /// 文字列からロールを解析（大文字小文字は区別しない）
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "OWNER" => Some(OrganizationRole::Owner),
            "ADMIN" => Some(OrganizationRole::Admin),
            "MEMBER" => Some(OrganizationRole::Member),
            _ => None,
        }
    }

    /// 権限レベル（高いほど強い）
    pub fn precedence(&self) -> u8 {
        match self {
            OrganizationRole::Owner => 3,
            OrganizationRole::Admin => 2,
            OrganizationRole::Member => 1,
        }
    }

    /// 組織管理権限を持つか
    pub fn can_manage(&self) -> bool {
        self.precedence() >= OrganizationRole::Admin.precedence()
    }

    fn label(&self) -> &'static str {
        match self {
            OrganizationRole::Owner => "Owner",
            OrganizationRole::Admin => "Administrator",
            OrganizationRole::Member => "Member",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            OrganizationRole::Owner => "Full control of the organization",
            OrganizationRole::Admin => "Manages the organization and its members",
            OrganizationRole::Member => "Basic membership",
        }
    }
}

impl ProjectRole {
    pub const ALL: [ProjectRole; 6] = [
        ProjectRole::ProjectManager,
        ProjectRole::LeadDeveloper,
        ProjectRole::Developer,
        ProjectRole::Tester,
        ProjectRole::Contributor,
        ProjectRole::Viewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::ProjectManager => "PROJECT_MANAGER",
            ProjectRole::LeadDeveloper => "LEAD_DEVELOPER",
            ProjectRole::Developer => "DEVELOPER",
            ProjectRole::Tester => "TESTER",
            ProjectRole::Contributor => "CONTRIBUTOR",
            ProjectRole::Viewer => "VIEWER",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PROJECT_MANAGER" => Some(ProjectRole::ProjectManager),
            "LEAD_DEVELOPER" => Some(ProjectRole::LeadDeveloper),
            "DEVELOPER" => Some(ProjectRole::Developer),
            "TESTER" => Some(ProjectRole::Tester),
            "CONTRIBUTOR" => Some(ProjectRole::Contributor),
            "VIEWER" => Some(ProjectRole::Viewer),
            _ => None,
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            ProjectRole::ProjectManager => 6,
            ProjectRole::LeadDeveloper => 5,
            ProjectRole::Developer => 4,
            ProjectRole::Tester => 3,
            ProjectRole::Contributor => 2,
            ProjectRole::Viewer => 1,
        }
    }

    /// プロジェクト管理ロール（PM・リード開発者）か
    pub fn can_manage(&self) -> bool {
        matches!(self, ProjectRole::ProjectManager | ProjectRole::LeadDeveloper)
    }

    fn label(&self) -> &'static str {
        match self {
            ProjectRole::ProjectManager => "Project manager",
            ProjectRole::LeadDeveloper => "Lead developer",
            ProjectRole::Developer => "Developer",
            ProjectRole::Tester => "Tester",
            ProjectRole::Contributor => "Contributor",
            ProjectRole::Viewer => "Viewer",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ProjectRole::ProjectManager => "Manages the whole project",
            ProjectRole::LeadDeveloper => "Technical lead and team management",
            ProjectRole::Developer => "Development access",
            ProjectRole::Tester => "Test execution access",
            ProjectRole::Contributor => "Contributor access",
            ProjectRole::Viewer => "Read-only access",
        }
    }
}

/// スコープ種別に紐づいたロール
///
/// 組織ロールとプロジェクトロールを継承ではなくタグ付きの値として扱い、
/// 優先順位は `precedence()` の表で判定する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Organization(OrganizationRole),
    Project(ProjectRole),
}

impl Role {
    /// スコープ種別に応じてロール名を解析
    pub fn parse(kind: ScopeKind, value: &str) -> Option<Self> {
        match kind {
            ScopeKind::Organization => OrganizationRole::from_str(value).map(Role::Organization),
            ScopeKind::Project => ProjectRole::from_str(value).map(Role::Project),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organization(role) => role.as_str(),
            Role::Project(role) => role.as_str(),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            Role::Organization(_) => ScopeKind::Organization,
            Role::Project(_) => ScopeKind::Project,
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            Role::Organization(role) => role.precedence(),
            Role::Project(role) => role.precedence(),
        }
    }

    pub fn can_manage(&self) -> bool {
        match self {
            Role::Organization(role) => role.can_manage(),
            Role::Project(role) => role.can_manage(),
        }
    }

    /// スコープ内で最上位のロール（最後の1人を失ってはならないロール）
    pub fn highest_for(kind: ScopeKind) -> Self {
        match kind {
            ScopeKind::Organization => Role::Organization(OrganizationRole::Owner),
            ScopeKind::Project => Role::Project(ProjectRole::ProjectManager),
        }
    }

    pub fn is_highest(&self) -> bool {
        *self == Role::highest_for(self.kind())
    }

    pub fn outranks(&self, other: &Role) -> bool {
        self.kind() == other.kind() && self.precedence() > other.precedence()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ロールはスコープ無しでは解釈できないため、文字列としてのみシリアライズする
impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// ロール一覧APIで返すカタログ項目
#[derive(Debug, Clone, Serialize)]
pub struct RoleCatalogEntry {
    pub value: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub precedence: u8,
    pub can_manage: bool,
}

pub fn organization_role_catalog() -> Vec<RoleCatalogEntry> {
    OrganizationRole::ALL
        .iter()
        .map(|role| RoleCatalogEntry {
            value: role.as_str(),
            label: role.label(),
            description: role.description(),
            precedence: role.precedence(),
            can_manage: role.can_manage(),
        })
        .collect()
}

pub fn project_role_catalog() -> Vec<RoleCatalogEntry> {
    ProjectRole::ALL
        .iter()
        .map(|role| RoleCatalogEntry {
            value: role.as_str(),
            label: role.label(),
            description: role.description(),
            precedence: role.precedence(),
            can_manage: role.can_manage(),
        })
        .collect()
}
