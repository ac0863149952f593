use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Token, TokenAssignment};
use crate::repositories::TokenStore;

/// 用途スコープ付きワンタイムトークンの発行・検証・失効を担うサービス
///
/// ユーザー×用途ごとの状態遷移:
/// なし → 発行済み → {消費済み | 期限切れ | 再発行により失効}
#[derive(Clone)]
pub struct TokenService<S> {
    store: S,
}

impl<S: TokenStore> TokenService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// トークンを発行して保存し、平文を返す
    ///
    /// 同一ユーザー×用途の既存トークンは挿入と同じトランザクション内で
    /// 失効する（有効トークンは常に1つ以下）。
    ///
    /// # Security
    /// 平文トークンはこの戻り値にしか存在しない。DBにはハッシュのみを
    /// 保存し、ログにも出力しないこと。
    pub async fn generate_and_save(
        &self,
        user_id: Uuid,
        assignment: TokenAssignment,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let token = generate_token();
        let token_hash = hash_token(&token);
        let expires_at = OffsetDateTime::now_utc() + ttl;

        self.store
            .insert_superseding(user_id, assignment, &token_hash, expires_at)
            .await?;

        tracing::debug!(user_id = %user_id, assignment = ?assignment, "トークン発行");

        Ok(token)
    }

    /// トークンを検証（副作用なし）
    ///
    /// トークンは消費しない。検証と消費を分離しているため、呼び出し側は
    /// 「検証→本処理→消費」の順で進められ、本処理の失敗を
    /// 「無効なトークン」と区別して報告できる。
    pub async fn validate(
        &self,
        user_id: Uuid,
        token: &str,
        assignment: TokenAssignment,
    ) -> Result<bool, AppError> {
        Ok(self
            .get_valid_token(user_id, token, assignment)
            .await?
            .is_some())
    }

    /// 平文トークンに対応する有効なトークン行を取得
    pub async fn get_valid_token(
        &self,
        user_id: Uuid,
        token: &str,
        assignment: TokenAssignment,
    ) -> Result<Option<Token>, AppError> {
        let token_hash = hash_token(token);
        Ok(self
            .store
            .find_valid(user_id, &token_hash, assignment)
            .await?)
    }

    /// トークンを消費（使用済みにする）
    ///
    /// 一致する有効なトークンがなければ何もしない（冪等）。
    pub async fn invalidate(
        &self,
        user_id: Uuid,
        token: &str,
        assignment: TokenAssignment,
    ) -> Result<(), AppError> {
        let token_hash = hash_token(token);

        if let Some(found) = self.store.find_valid(user_id, &token_hash, assignment).await? {
            self.store.mark_used(found.id).await?;
            tracing::debug!(token_id = %found.id, "トークン消費");
        }

        Ok(())
    }

    /// ユーザー×用途の未使用トークンを一括失効
    pub async fn invalidate_all(
        &self,
        user_id: Uuid,
        assignment: TokenAssignment,
    ) -> Result<u64, AppError> {
        let count = self.store.invalidate_all(user_id, assignment).await?;
        if count > 0 {
            tracing::info!(user_id = %user_id, count = count, "トークン一括失効");
        }
        Ok(count)
    }

    /// 期限切れトークンの掃除
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        Ok(self.store.delete_expired().await?)
    }
}

/// 32バイトのランダムトークンを生成（base64url、パディングなし）
///
/// CSPRNGから256ビットを取るため、衝突・推測の確率は無視できる
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// トークンをSHA256でハッシュ化（保存・検索用）
///
/// トークン自体が高エントロピーなのでパスワードと違いソルトは不要
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;

    /// テスト用インメモリストア
    ///
    /// 本番のPostgreSQL実装と同じ可視性ルール（有効性はストア側で判定）
    #[derive(Clone, Default)]
    struct MemoryTokenStore {
        tokens: Arc<Mutex<Vec<Token>>>,
    }

    #[async_trait]
    impl TokenStore for MemoryTokenStore {
        async fn find_valid(
            &self,
            user_id: Uuid,
            token_hash: &str,
            assignment: TokenAssignment,
        ) -> Result<Option<Token>, sqlx::Error> {
            let tokens = self.tokens.lock().unwrap();
            Ok(tokens
                .iter()
                .find(|t| {
                    t.user_id == user_id
                        && t.assignment == assignment
                        && t.token_hash == token_hash
                        && t.is_valid()
                })
                .cloned())
        }

        async fn insert_superseding(
            &self,
            user_id: Uuid,
            assignment: TokenAssignment,
            token_hash: &str,
            expires_at: OffsetDateTime,
        ) -> Result<Token, sqlx::Error> {
            let mut tokens = self.tokens.lock().unwrap();
            for t in tokens
                .iter_mut()
                .filter(|t| t.user_id == user_id && t.assignment == assignment && !t.is_used)
            {
                t.is_used = true;
            }

            let token = Token {
                id: Uuid::new_v4(),
                user_id,
                assignment,
                token_hash: token_hash.to_string(),
                expires_at,
                created_at: OffsetDateTime::now_utc(),
                is_used: false,
            };
            tokens.push(token.clone());
            Ok(token)
        }

        async fn mark_used(&self, id: Uuid) -> Result<(), sqlx::Error> {
            let mut tokens = self.tokens.lock().unwrap();
            if let Some(t) = tokens.iter_mut().find(|t| t.id == id) {
                t.is_used = true;
            }
            Ok(())
        }

        async fn invalidate_all(
            &self,
            user_id: Uuid,
            assignment: TokenAssignment,
        ) -> Result<u64, sqlx::Error> {
            let mut tokens = self.tokens.lock().unwrap();
            let mut count = 0;
            for t in tokens
                .iter_mut()
                .filter(|t| t.user_id == user_id && t.assignment == assignment && !t.is_used)
            {
                t.is_used = true;
                count += 1;
            }
            Ok(count)
        }

        async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
            let mut tokens = self.tokens.lock().unwrap();
            let now = OffsetDateTime::now_utc();
            let before = tokens.len();
            tokens.retain(|t| t.expires_at >= now);
            Ok((before - tokens.len()) as u64)
        }
    }

    fn service() -> TokenService<MemoryTokenStore> {
        TokenService::new(MemoryTokenStore::default())
    }

    const TTL: Duration = Duration::hours(24);

    #[tokio::test]
    async fn test_issued_token_validates_immediately() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_and_save(user_id, TokenAssignment::EmailConfirmation, TTL)
            .await
            .unwrap();

        assert!(
            service
                .validate(user_id, &token, TokenAssignment::EmailConfirmation)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_issued_plaintexts_are_distinct() {
        let service = service();
        let user_id = Uuid::new_v4();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..8 {
            let token = service
                .generate_and_save(user_id, TokenAssignment::PasswordReset, TTL)
                .await
                .unwrap();
            assert!(seen.insert(token));
        }
    }

    #[tokio::test]
    async fn test_validate_does_not_consume() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, TTL)
            .await
            .unwrap();

        // 何度検証しても有効なまま
        for _ in 0..3 {
            assert!(
                service
                    .validate(user_id, &token, TokenAssignment::PasswordReset)
                    .await
                    .unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_invalidated_token_fails_validation() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, TTL)
            .await
            .unwrap();

        service
            .invalidate(user_id, &token, TokenAssignment::PasswordReset)
            .await
            .unwrap();

        assert!(
            !service
                .validate(user_id, &token, TokenAssignment::PasswordReset)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, TTL)
            .await
            .unwrap();

        service
            .invalidate(user_id, &token, TokenAssignment::PasswordReset)
            .await
            .unwrap();
        // 2度目・存在しないトークンでもエラーにならない
        service
            .invalidate(user_id, &token, TokenAssignment::PasswordReset)
            .await
            .unwrap();
        service
            .invalidate(user_id, "no-such-token", TokenAssignment::PasswordReset)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_token_fails_validation() {
        let service = service();
        let user_id = Uuid::new_v4();

        // 発行時点で期限切れ
        let token = service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, Duration::seconds(-1))
            .await
            .unwrap();

        assert!(
            !service
                .validate(user_id, &token, TokenAssignment::PasswordReset)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_reissue_supersedes_previous_token() {
        let service = service();
        let user_id = Uuid::new_v4();

        let first = service
            .generate_and_save(user_id, TokenAssignment::EmailConfirmation, TTL)
            .await
            .unwrap();
        let second = service
            .generate_and_save(user_id, TokenAssignment::EmailConfirmation, TTL)
            .await
            .unwrap();

        assert!(
            !service
                .validate(user_id, &first, TokenAssignment::EmailConfirmation)
                .await
                .unwrap()
        );
        assert!(
            service
                .validate(user_id, &second, TokenAssignment::EmailConfirmation)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_reissue_does_not_touch_other_assignments() {
        let service = service();
        let user_id = Uuid::new_v4();

        let reset = service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, TTL)
            .await
            .unwrap();
        service
            .generate_and_save(user_id, TokenAssignment::EmailConfirmation, TTL)
            .await
            .unwrap();

        // 別用途の再発行では失効しない
        assert!(
            service
                .validate(user_id, &reset, TokenAssignment::PasswordReset)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_assignment_scoping() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, TTL)
            .await
            .unwrap();

        // 用途が違えば同じ平文でも無効
        assert!(
            !service
                .validate(user_id, &token, TokenAssignment::EmailConfirmation)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_token_is_scoped_to_user() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, TTL)
            .await
            .unwrap();

        assert!(
            !service
                .validate(Uuid::new_v4(), &token, TokenAssignment::PasswordReset)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, TTL)
            .await
            .unwrap();

        let count = service
            .invalidate_all(user_id, TokenAssignment::PasswordReset)
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert!(
            !service
                .validate(user_id, &token, TokenAssignment::PasswordReset)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_sweep_expired_keeps_valid_tokens() {
        let service = service();
        let user_id = Uuid::new_v4();

        service
            .generate_and_save(user_id, TokenAssignment::PasswordReset, Duration::seconds(-10))
            .await
            .unwrap();
        let valid = service
            .generate_and_save(user_id, TokenAssignment::EmailConfirmation, TTL)
            .await
            .unwrap();

        let removed = service.sweep_expired().await.unwrap();

        assert_eq!(removed, 1);
        assert!(
            service
                .validate(user_id, &valid, TokenAssignment::EmailConfirmation)
                .await
                .unwrap()
        );
    }

    #[test]
    fn test_generate_token_encoding() {
        let token = generate_token();
        // 32バイト → base64url 43文字、パディングなし
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_hash_token_is_deterministic() {
        let token = generate_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), hash_token(&generate_token()));
        // SHA256 → hex 64文字
        assert_eq!(hash_token(&token).len(), 64);
    }
}
