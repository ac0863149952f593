use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::{User, UserRole};

/// JWTクレーム
///
/// 下流の認可判定に必要な情報（ユーザーID・ロール）を含む。
/// 失効リストは持たない（自然失効までステートレスに信頼する）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// ユーザーID
    pub sub: String,
    /// ユーザー名
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

/// セッション用JWT（HS256）の発行・検証サービス
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    expiry_secs: i64,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String, audience: String, expiry_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            expiry_secs,
        }
    }

    /// ユーザーに対して署名付きセッショントークンを発行
    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let claims = Claims {
            sub: user.id.to_string(),
            name: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now as usize,
            exp: (now + self.expiry_secs) as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = ?e, "JWT発行エラー");
            AppError::Internal(anyhow::anyhow!("failed to encode jwt"))
        })
    }

    /// トークンを検証してクレームを取り出す
    ///
    /// 署名・有効期限・issuer・audienceをすべて検証する
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| {
                AppError::Authentication("無効または期限切れのトークンです".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn service(secret: &str, expiry_secs: i64) -> JwtService {
        JwtService::new(
            secret,
            "idgate".to_string(),
            "idgate-api".to_string(),
            expiry_secs,
        )
    }

    fn user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            email_confirmed: true,
            password_hash: "unused".to_string(),
            is_active: true,
            role: UserRole::Admin,
            first_name: "Alice".to_string(),
            last_name: "Example".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let service = service("test-secret", 3600);
        let user = user();

        let token = service.issue(&user).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.name, "alice");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.exp, claims.iat + 3600);
    }

    #[test]
    fn test_wrong_secret_fails_verification() {
        let token = service("secret-a", 3600).issue(&user()).unwrap();
        assert!(service("secret-b", 3600).verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_fails_verification() {
        // デフォルトのleeway（60秒）を超えて過去にする
        let token = service("test-secret", -3600).issue(&user()).unwrap();
        assert!(service("test-secret", 3600).verify(&token).is_err());
    }

    #[test]
    fn test_wrong_audience_fails_verification() {
        let issuer_service = JwtService::new(
            "test-secret",
            "idgate".to_string(),
            "other-api".to_string(),
            3600,
        );
        let token = issuer_service.issue(&user()).unwrap();
        assert!(service("test-secret", 3600).verify(&token).is_err());
    }

    #[test]
    fn test_garbage_token_fails_verification() {
        assert!(service("test-secret", 3600).verify("not.a.jwt").is_err());
    }
}
