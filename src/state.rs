use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::repositories::{TokenRepository, UserRepository};
use crate::services::{AuthService, EmailService, JwtService, TokenService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// ユーザーリポジトリ
    pub user_repo: UserRepository,
    /// トークンサービス（発行・検証・失効）
    pub token_service: TokenService<TokenRepository>,
    /// 認証サービス
    pub auth_service: AuthService,
    /// JWT発行・検証サービス
    pub jwt_service: JwtService,
    /// メールサービス
    pub email_service: EmailService,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: Config) -> Self {
        let config = Arc::new(config);
        let user_repo = UserRepository::new(db_pool.clone());
        let token_service = TokenService::new(TokenRepository::new(db_pool.clone()));
        let auth_service = AuthService::new(user_repo.clone());
        let jwt_service = JwtService::new(
            config.jwt_secret.expose_secret(),
            config.jwt_issuer.clone(),
            config.jwt_audience.clone(),
            config.jwt_expiry_secs,
        );
        let email_service = EmailService::new(config.clone());

        Self {
            db_pool,
            config,
            user_repo,
            token_service,
            auth_service,
            jwt_service,
            email_service,
        }
    }
}
