use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::AppError;
use crate::models::TokenAssignment;
use crate::services::password::hash_password;
use crate::state::AppState;

// === リセットリクエスト ===

#[derive(Debug, Deserialize)]
pub struct ResetRequestRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ResetRequestResponse {
    pub message: String,
}

/// パスワードリセット要求ハンドラー
///
/// POST /api/auth/reset-password
///
/// # Security
/// 常に成功形のレスポンスを返す（メールアドレスの存在有無を漏洩しない）。
/// ユーザーが存在する場合のみトークンを発行してメールを送る。
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequestRequest>,
) -> Result<Json<ResetRequestResponse>, AppError> {
    validate_email(&request.email)?;

    if let Some(user) = state.user_repo.find_by_email(&request.email).await? {
        let ttl = Duration::seconds(state.config.password_reset_token_ttl_secs);
        let reset_token = state
            .token_service
            .generate_and_save(user.id, TokenAssignment::PasswordReset, ttl)
            .await?;

        state
            .email_service
            .send_password_reset_email(&user, &reset_token)
            .await?;

        tracing::info!(user_id = %user.id, "パスワードリセットメール送信完了");
    } else {
        tracing::info!("パスワードリセット: ユーザー不在（成功レスポンス返却）");
    }

    Ok(Json(ResetRequestResponse {
        message: "パスワードリセット手順をメールで送信しました".to_string(),
    }))
}

// === パスワードリセット実行 ===

#[derive(Debug, Deserialize)]
pub struct ResetPasswordConfirmRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// パスワードリセット実行の結果
///
/// トークン不正はHTTPエラーではなく結果オブジェクトで返す
#[derive(Debug, Serialize)]
pub struct ResetPasswordConfirmResponse {
    pub success: bool,
    pub message: String,
}

impl ResetPasswordConfirmResponse {
    fn successful(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }

    fn failed(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}

/// パスワードリセット実行ハンドラー
///
/// POST /api/auth/reset-password-confirm
///
/// 処理フロー:
/// 1. リクエストバリデーション（確認用パスワードの一致もここで）
/// 2. ユーザー検索
/// 3. トークン検証（消費しない）
/// 4. 新パスワードをハッシュ化して更新
/// 5. トークン消費
///
/// # Security
/// - token, new_password はログに出力しない
/// - ユーザー不在とトークン不正は同じ失敗メッセージに寄せる
pub async fn reset_password_confirm(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordConfirmRequest>,
) -> Result<Json<ResetPasswordConfirmResponse>, AppError> {
    validate_reset_password_confirm_request(&request)?;

    let Some(user) = state.user_repo.find_by_email(&request.email).await? else {
        return Ok(Json(ResetPasswordConfirmResponse::failed(
            "無効なトークンまたはメールアドレスです",
        )));
    };

    let is_valid = state
        .token_service
        .validate(user.id, &request.token, TokenAssignment::PasswordReset)
        .await?;

    if !is_valid {
        return Ok(Json(ResetPasswordConfirmResponse::failed(
            "無効または期限切れのトークンです",
        )));
    }

    let password_hash = hash_password(&request.new_password)?;
    state
        .user_repo
        .update_password(user.id, &password_hash)
        .await?;

    state
        .token_service
        .invalidate(user.id, &request.token, TokenAssignment::PasswordReset)
        .await?;

    tracing::info!(user_id = %user.id, "パスワードリセット完了");

    Ok(Json(ResetPasswordConfirmResponse::successful(
        "パスワードを変更しました",
    )))
}

/// メールアドレスのバリデーション
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    Ok(())
}

/// リセット実行リクエストのバリデーション
fn validate_reset_password_confirm_request(
    request: &ResetPasswordConfirmRequest,
) -> Result<(), AppError> {
    validate_email(&request.email)?;

    if request.token.trim().is_empty() {
        return Err(AppError::Validation("トークンは必須です".to_string()));
    }
    if request.new_password.len() < 8 {
        return Err(AppError::Validation(
            "パスワードは8文字以上で入力してください".to_string(),
        ));
    }
    if request.new_password != request.confirm_password {
        return Err(AppError::Validation(
            "新しいパスワードと確認用パスワードが一致しません".to_string(),
        ));
    }
    Ok(())
}
