use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // JWT設定
    pub jwt_secret: SecretBox<String>,
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,
    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,
    #[serde(default = "default_jwt_expiry_secs")]
    pub jwt_expiry_secs: i64,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,

    // メール内リンクのベースURL
    #[serde(default)]
    pub email_base_url: Option<String>,

    // トークンTTL設定（既定は24時間）
    #[serde(default = "default_token_ttl_secs")]
    pub email_confirmation_token_ttl_secs: i64,
    #[serde(default = "default_token_ttl_secs")]
    pub password_reset_token_ttl_secs: i64,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_JWT_EXPIRY_SECS: i64 = 3600;
const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 3600;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_jwt_issuer() -> String {
    "idgate".to_string()
}

fn default_jwt_audience() -> String {
    "idgate-api".to_string()
}

fn default_jwt_expiry_secs() -> i64 {
    DEFAULT_JWT_EXPIRY_SECS
}

fn default_token_ttl_secs() -> i64 {
    DEFAULT_TOKEN_TTL_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
