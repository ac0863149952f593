use crate::error::AppError;
use crate::models::User;
use crate::repositories::UserRepository;
use crate::services::password::verify_password;

/// タイミング攻撃対策のダミーハッシュ（検証は必ず失敗する）
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$RWh6";

/// 認証サービス
#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
}

impl AuthService {
    pub fn new(user_repo: UserRepository) -> Self {
        Self { user_repo }
    }

    /// ユーザー認証を実行
    ///
    /// タイミング攻撃対策: ユーザーが存在しない場合もダミーのパスワード検証を
    /// 実行し、存在有無を応答時間から推測できないようにする。
    /// 不在・無効化済みのいずれも同じメッセージを返す（NotFoundにはしない）。
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        let user = self.user_repo.find_by_username(username).await?;

        let Some(user) = user else {
            let _ = verify_password(password, DUMMY_HASH);
            tracing::warn!(username = %username, "認証失敗: ユーザー不在");
            return Err(AppError::Authentication(
                "ユーザー名またはパスワードが正しくありません".to_string(),
            ));
        };

        if !user.is_active {
            let _ = verify_password(password, DUMMY_HASH);
            tracing::warn!(username = %username, "認証失敗: 無効化されたアカウント");
            return Err(AppError::Authentication(
                "ユーザー名またはパスワードが正しくありません".to_string(),
            ));
        }

        if !verify_password(password, &user.password_hash) {
            tracing::warn!(username = %username, "認証失敗: パスワード不一致");
            return Err(AppError::Authentication(
                "パスワードが正しくありません".to_string(),
            ));
        }

        tracing::info!(username = %username, "認証成功");
        Ok(user)
    }
}
