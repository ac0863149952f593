use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::models::User;

/// メール送信サービス
///
/// `email` フィーチャー有効時はlettreでSMTP送信する。
/// 無効時はリンクをログ出力するだけ（開発モード）。
#[derive(Clone)]
pub struct EmailService {
    config: Arc<Config>,
}

impl EmailService {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// メールアドレス確認メールを送信
    ///
    /// リンクには平文トークンとメールアドレスを埋め込む
    pub async fn send_email_confirmation(&self, user: &User, token: &str) -> Result<(), AppError> {
        let link = format!(
            "{}/confirm-email?email={}&token={}",
            self.base_url(),
            user.email,
            token
        );
        let hours = self.config.email_confirmation_token_ttl_secs / 3600;
        let body = format!(
            "{} {} 様\n\n\
             ご登録ありがとうございます。以下のリンクからメールアドレスを確認してください:\n\
             {}\n\n\
             リンクの有効期限は{}時間です。",
            user.last_name, user.first_name, link, hours
        );

        self.send(&user.email, "メールアドレスの確認", &body).await
    }

    /// パスワードリセットメールを送信
    pub async fn send_password_reset_email(&self, user: &User, token: &str) -> Result<(), AppError> {
        let link = format!(
            "{}/reset-password-confirm?email={}&token={}",
            self.base_url(),
            user.email,
            token
        );
        let hours = self.config.password_reset_token_ttl_secs / 3600;
        let body = format!(
            "{} {} 様\n\n\
             パスワードを再設定するには以下のリンクへアクセスしてください:\n\
             {}\n\n\
             リンクの有効期限は{}時間です。\n\
             心当たりがない場合はこのメールを無視してください。",
            user.last_name, user.first_name, link, hours
        );

        self.send(&user.email, "パスワードの再設定", &body).await
    }

    fn base_url(&self) -> &str {
        self.config
            .email_base_url
            .as_deref()
            .unwrap_or("http://localhost:3000")
    }

    #[cfg(feature = "email")]
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        use lettre::message::header::ContentType;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
        use secrecy::ExposeSecret;

        let (Some(host), Some(username), Some(password), Some(from)) = (
            self.config.smtp_host.as_deref(),
            self.config.smtp_username.as_ref(),
            self.config.smtp_password.as_ref(),
            self.config.smtp_from_address.as_deref(),
        ) else {
            tracing::warn!(to = %to, "SMTP未設定のためメールを送信できません");
            return Ok(());
        };

        let message = Message::builder()
            .from(from.parse().map_err(|e| {
                AppError::Internal(anyhow::anyhow!("invalid from address: {e}"))
            })?)
            .to(to
                .parse()
                .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build email: {e}")))?;

        let credentials = Credentials::new(
            username.expose_secret().clone(),
            password.expose_secret().clone(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("smtp relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(credentials)
            .build();

        mailer.send(message).await.map_err(|e| {
            tracing::error!(error = ?e, to = %to, "メール送信に失敗");
            AppError::Internal(anyhow::anyhow!("failed to send email"))
        })?;

        tracing::info!(to = %to, subject = %subject, "メール送信完了");
        Ok(())
    }

    #[cfg(not(feature = "email"))]
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        // 開発モード: メール送信せずログ出力のみ
        tracing::info!(to = %to, subject = %subject, "メール送信（開発モード）");
        tracing::info!("本文:\n{}", body);
        Ok(())
    }
}
