use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::TokenAssignment;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailRequest {
    pub email: String,
    pub token: String,
}

/// メールアドレス確認の結果
///
/// トークン不正はHTTPエラーではなく結果オブジェクトで返す。
/// 不正の理由（不在・期限切れ・使用済み）は区別せず同一メッセージにする。
#[derive(Debug, Serialize)]
pub struct ConfirmEmailResponse {
    pub success: bool,
    pub message: String,
}

impl ConfirmEmailResponse {
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

/// メールアドレス確認ハンドラー
///
/// POST /api/auth/confirm-email
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. ユーザー検索・確認済みチェック
/// 3. トークン検証（消費しない）
/// 4. メール確認フラグ更新
/// 5. トークン消費
///
/// 検証と消費を分離しているため、フラグ更新の失敗は
/// 「無効なトークン」とは別のエラーとして報告される
pub async fn confirm_email(
    State(state): State<AppState>,
    Json(request): Json<ConfirmEmailRequest>,
) -> Result<Json<ConfirmEmailResponse>, AppError> {
    validate_confirm_email_request(&request)?;

    let Some(user) = state.user_repo.find_by_email(&request.email).await? else {
        return Ok(Json(ConfirmEmailResponse::failed(
            "ユーザーが見つかりません",
        )));
    };

    if user.email_confirmed {
        return Ok(Json(ConfirmEmailResponse::failed(
            "メールアドレスは既に確認済みです",
        )));
    }

    let is_valid = state
        .token_service
        .validate(user.id, &request.token, TokenAssignment::EmailConfirmation)
        .await?;

    if !is_valid {
        return Ok(Json(ConfirmEmailResponse::failed(
            "無効または期限切れのトークンです",
        )));
    }

    state.user_repo.set_email_confirmed(user.id, true).await?;

    state
        .token_service
        .invalidate(user.id, &request.token, TokenAssignment::EmailConfirmation)
        .await?;

    tracing::info!(user_id = %user.id, "メールアドレス確認完了");

    Ok(Json(ConfirmEmailResponse::successful(
        "メールアドレスを確認しました",
    )))
}

/// 確認リクエストのバリデーション
fn validate_confirm_email_request(request: &ConfirmEmailRequest) -> Result<(), AppError> {
    if request.email.trim().is_empty() || !request.email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    if request.token.trim().is_empty() {
        return Err(AppError::Validation("トークンは必須です".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_request() {
        let request = ConfirmEmailRequest {
            email: "alice@example.com".to_string(),
            token: "some-token".to_string(),
        };
        assert!(validate_confirm_email_request(&request).is_ok());
    }

    #[test]
    fn test_validate_invalid_email() {
        let request = ConfirmEmailRequest {
            email: "invalid-email".to_string(),
            token: "some-token".to_string(),
        };
        assert!(validate_confirm_email_request(&request).is_err());
    }

    #[test]
    fn test_validate_empty_token() {
        let request = ConfirmEmailRequest {
            email: "alice@example.com".to_string(),
            token: "".to_string(),
        };
        assert!(validate_confirm_email_request(&request).is_err());
    }
}
