use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::jwt::Claims;
use crate::state::AppState;

/// 認証済みユーザーを表すエクストラクター
///
/// Authorization: Bearer ヘッダーのJWTを検証し、クレームをハンドラーに
/// 明示的な引数として渡す（グローバルなカレントユーザーは持たない）。
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.0.sub).map_err(|_| {
            AppError::Authentication("トークンのユーザーIDが不正です".to_string())
        })
    }

    pub fn is_admin(&self) -> bool {
        self.0.role.is_admin()
    }

    /// 管理者権限を要求
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AppError::Authentication("Authorizationヘッダーがありません".to_string())
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Authentication("Authorizationヘッダーの形式が不正です".to_string())
        })?;

        let claims = state.jwt_service.verify(token)?;

        Ok(AuthUser(claims))
    }
}
