use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{User, UserRole};
use crate::state::AppState;

/// ユーザー情報レスポンス
///
/// password_hash は含めない
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub email_confirmed: bool,
    pub is_active: bool,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            email_confirmed: user.email_confirmed,
            is_active: user.is_active,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: user.created_at,
        }
    }
}

/// 全ユーザー取得ハンドラー（管理者のみ）
///
/// GET /api/users
pub async fn list_users(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    auth.require_admin()?;

    let users = state.user_repo.list_all().await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// ユーザー取得ハンドラー（本人または管理者）
///
/// GET /api/users/{id}
pub async fn get_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    if !auth.is_admin() && auth.user_id()? != id {
        return Err(AppError::Forbidden);
    }

    let user = state
        .user_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("ユーザーが見つかりません".to_string()))?;

    Ok(Json(user.into()))
}

/// ロール別ユーザー取得ハンドラー（管理者のみ）
///
/// GET /api/users/role/{role}
pub async fn list_users_by_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    auth.require_admin()?;

    let role: UserRole = role
        .parse()
        .map_err(|_| AppError::Validation("不明なロールです".to_string()))?;

    let users = state.user_repo.list_by_role(role).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub last_name: String,
}

/// プロフィール更新ハンドラー（本人または管理者）
///
/// PUT /api/users/{id}/profile
pub async fn update_profile(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if !auth.is_admin() && auth.user_id()? != id {
        return Err(AppError::Forbidden);
    }

    validate_update_profile_request(&request)?;

    let user = state
        .user_repo
        .update_profile(id, &request.first_name, &request.last_name)
        .await?
        .ok_or_else(|| AppError::NotFound("ユーザーが見つかりません".to_string()))?;

    tracing::info!(user_id = %id, "プロフィール更新");

    Ok(Json(user.into()))
}

/// ユーザー無効化ハンドラー（管理者のみ）
///
/// POST /api/users/{id}/deactivate
///
/// ソフトデリート。無効化されたユーザーはログインできなくなる。
pub async fn deactivate_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    if !state.user_repo.deactivate(id).await? {
        return Err(AppError::NotFound("ユーザーが見つかりません".to_string()));
    }

    tracing::info!(user_id = %id, "ユーザー無効化");

    Ok(StatusCode::NO_CONTENT)
}

/// ユーザー削除ハンドラー（管理者のみ）
///
/// DELETE /api/users/{id}
pub async fn delete_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    if !state.user_repo.delete(id).await? {
        return Err(AppError::NotFound("ユーザーが見つかりません".to_string()));
    }

    tracing::info!(user_id = %id, "ユーザー削除");

    Ok(StatusCode::NO_CONTENT)
}

/// プロフィール更新リクエストのバリデーション
fn validate_update_profile_request(request: &UpdateProfileRequest) -> Result<(), AppError> {
    if request.first_name.trim().is_empty() {
        return Err(AppError::Validation("名は必須です".to_string()));
    }
    if request.last_name.trim().is_empty() {
        return Err(AppError::Validation("姓は必須です".to_string()));
    }
    Ok(())
}
