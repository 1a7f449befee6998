// permission-backend/src/middleware/auth.rs

use crate::domain::membership_snapshot::Actor;
use crate::error::AppError;
use axum::http::{request::Parts, HeaderMap};
use tracing::warn;
use uuid::Uuid;

/// 上流の認証基盤が付与する呼び出し元ユーザーID
pub const USER_ID_HEADER: &str = "x-user-id";
/// `admin` の場合はシステム管理者
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// 認証済みの呼び出し元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub is_system_admin: bool,
}

impl AuthenticatedUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.is_system_admin)
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let raw = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
        let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
            warn!(header = USER_ID_HEADER, "Invalid caller identity");
            AppError::Unauthorized("Invalid caller identity".to_string())
        })?;
        let is_system_admin = headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        Ok(Self {
            user_id,
            is_system_admin,
        })
    }
}

// --- Axum Extractors ---

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(*user);
        }
        let user = AuthenticatedUser::from_headers(&parts.headers)?;
        parts.extensions.insert(user);
        Ok(user)
    }
}
