use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// トークンの用途
///
/// 用途が異なるトークンは相互に流用できない
/// （メール確認用トークンでパスワードリセットはできない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "token_assignment", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenAssignment {
    EmailConfirmation,
    PasswordReset,
}

/// 用途スコープ付きワンタイムトークン
///
/// トークン自体はハッシュ化してDBに保存（token_hash）
/// 平文トークンはユーザーにメールで送信し、DBには保存しない
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Token {
    pub id: Uuid,
    pub user_id: Uuid,
    pub assignment: TokenAssignment,
    #[serde(skip)]
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub is_used: bool,
}

impl Token {
    /// 未使用かつ有効期限内かどうか
    ///
    /// 一度使用済みになったトークンが有効に戻ることはない
    pub fn is_valid(&self) -> bool {
        !self.is_used && self.expires_at > OffsetDateTime::now_utc()
    }
}
