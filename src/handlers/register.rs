use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::TokenAssignment;
use crate::services::password::hash_password;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String, // SecretBox不要（Deserialize後すぐハッシュ化）
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// ユーザー登録ハンドラー
///
/// POST /api/auth/register
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. ユーザー名の重複チェック
/// 3. パスワードハッシュ化・ユーザー作成
/// 4. メール確認トークン発行（既定24時間有効）
/// 5. 確認メール送信
///
/// # Security
/// - パスワードはログに出力しない
/// - パスワードは即座にハッシュ化
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    validate_register_request(&request)?;

    if state
        .user_repo
        .find_by_username(&request.username)
        .await?
        .is_some()
    {
        return Err(AppError::UsernameAlreadyExists);
    }

    let password_hash = hash_password(&request.password)?;

    let user = state
        .user_repo
        .create_user(
            &request.username,
            &request.email,
            &password_hash,
            &request.first_name,
            &request.last_name,
        )
        .await
        .map_err(|e| {
            // UNIQUE制約違反チェック（重複チェックとの間の競合もここで拾う）
            if let sqlx::Error::Database(db_err) = &e {
                match db_err.constraint() {
                    Some("users_username_key") => return AppError::UsernameAlreadyExists,
                    Some("users_email_key") => return AppError::EmailAlreadyExists,
                    _ => {}
                }
            }
            AppError::Database(e)
        })?;

    let ttl = Duration::seconds(state.config.email_confirmation_token_ttl_secs);
    let confirmation_token = state
        .token_service
        .generate_and_save(user.id, TokenAssignment::EmailConfirmation, ttl)
        .await?;

    state
        .email_service
        .send_email_confirmation(&user, &confirmation_token)
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "ユーザー登録成功");

    Ok(Json(RegisterResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        created_at: user.created_at,
    }))
}

/// 登録リクエストのバリデーション
fn validate_register_request(request: &RegisterRequest) -> Result<(), AppError> {
    // username: 必須
    if request.username.trim().is_empty() {
        return Err(AppError::Validation("ユーザー名は必須です".to_string()));
    }
    // email: 必須、メール形式
    if request.email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }
    if !request.email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    // password: 8文字以上
    if request.password.len() < 8 {
        return Err(AppError::Validation(
            "パスワードは8文字以上で入力してください".to_string(),
        ));
    }
    Ok(())
}
