use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{Token, TokenAssignment};

const TOKEN_COLUMNS: &str = "id, user_id, assignment, token_hash, expires_at, created_at, is_used";

/// トークン永続化の抽象
///
/// 本番実装は `TokenRepository`（PostgreSQL）。
/// TokenService の状態遷移をDBなしでテストできるようにするための境界。
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// (user_id, token_hash, assignment) に一致する有効なトークンを検索
    ///
    /// 有効性（未使用かつ期限内）の判定はクエリ側で行う。
    /// アプリケーション側での後判定だと並行する失効処理と競合するため。
    async fn find_valid(
        &self,
        user_id: Uuid,
        token_hash: &str,
        assignment: TokenAssignment,
    ) -> Result<Option<Token>, sqlx::Error>;

    /// 既存の未使用トークンを失効させた上で新しいトークンを保存
    ///
    /// 失効と挿入は単一トランザクションで実行すること。
    /// ユーザー×用途ごとの有効トークンを常に1つ以下に保つ。
    async fn insert_superseding(
        &self,
        user_id: Uuid,
        assignment: TokenAssignment,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<Token, sqlx::Error>;

    /// トークンを使用済みにマーク
    async fn mark_used(&self, id: Uuid) -> Result<(), sqlx::Error>;

    /// ユーザー×用途の未使用トークンを一括で使用済みにする
    ///
    /// # Returns
    /// 失効させた行数
    async fn invalidate_all(
        &self,
        user_id: Uuid,
        assignment: TokenAssignment,
    ) -> Result<u64, sqlx::Error>;

    /// 期限切れトークンを削除
    ///
    /// # Returns
    /// 削除された行数
    async fn delete_expired(&self) -> Result<u64, sqlx::Error>;
}

#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for TokenRepository {
    async fn find_valid(
        &self,
        user_id: Uuid,
        token_hash: &str,
        assignment: TokenAssignment,
    ) -> Result<Option<Token>, sqlx::Error> {
        sqlx::query_as::<_, Token>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS}
            FROM tokens
            WHERE user_id = $1
              AND token_hash = $2
              AND assignment = $3
              AND is_used = FALSE
              AND expires_at > NOW()
            "#
        ))
        .bind(user_id)
        .bind(token_hash)
        .bind(assignment)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert_superseding(
        &self,
        user_id: Uuid,
        assignment: TokenAssignment,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<Token, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE tokens
            SET is_used = TRUE
            WHERE user_id = $1 AND assignment = $2 AND is_used = FALSE
            "#,
        )
        .bind(user_id)
        .bind(assignment)
        .execute(&mut *tx)
        .await?;

        let token = sqlx::query_as::<_, Token>(&format!(
            r#"
            INSERT INTO tokens (user_id, assignment, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(assignment)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(token)
    }

    async fn mark_used(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tokens
            SET is_used = TRUE
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn invalidate_all(
        &self,
        user_id: Uuid,
        assignment: TokenAssignment,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tokens
            SET is_used = TRUE
            WHERE user_id = $1 AND assignment = $2 AND is_used = FALSE
            "#,
        )
        .bind(user_id)
        .bind(assignment)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
