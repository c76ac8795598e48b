use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::IdentityProvider;
use crate::error::AuthError;
use crate::models::UserId;
use crate::utils::{
    derive_user_id, generate_token, hash_password, normalize_email, validate_credentials,
    verify_password, verify_token,
};

#[derive(Debug, Clone)]
struct Account {
    user_id: UserId,
    password_hash: String,
}

/// 进程内身份服务
///
/// 保存 bcrypt 密码哈希，登录成功后签发 JWT 会话令牌；
/// 当前用户由令牌解析得出，令牌过期即视为未登录。
pub struct LocalIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    session: RwLock<Option<String>>,
    jwt_secret: String,
    session_ttl: Duration,
    bcrypt_cost: u32,
}

impl LocalIdentityProvider {
    pub fn new(jwt_secret: impl Into<String>, session_ttl: Duration, bcrypt_cost: u32) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            session: RwLock::new(None),
            jwt_secret: jwt_secret.into(),
            session_ttl,
            bcrypt_cost,
        }
    }

    /// 当前会话令牌
    pub async fn session_token(&self) -> Option<String> {
        self.session.read().await.clone()
    }

    fn ttl_secs(&self) -> i64 {
        i64::try_from(self.session_ttl.as_secs()).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        validate_credentials(email, password)?;
        let key = normalize_email(email);

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            warn!(email = %key, "account already exists");
            return Err(AuthError::EmailTaken(key));
        }

        let account = Account {
            user_id: derive_user_id(&key),
            password_hash: hash_password(password, self.bcrypt_cost)?,
        };
        let user_id = account.user_id.clone();
        accounts.insert(key, account);

        info!(user_id = %user_id, "account created");
        Ok(user_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        validate_credentials(email, password)?;
        let key = normalize_email(email);

        let account = self.accounts.read().await.get(&key).cloned();
        let Some(account) = account else {
            warn!(email = %key, "sign in failed: unknown account");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &account.password_hash)? {
            warn!(email = %key, "sign in failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let (token, expires_at) = generate_token(&account.user_id, &self.jwt_secret, self.ttl_secs())?;
        *self.session.write().await = Some(token);

        info!(user_id = %account.user_id, expires_at, "signed in");
        Ok(account.user_id)
    }

    async fn sign_out(&self) {
        if self.session.write().await.take().is_some() {
            info!("signed out");
        }
    }

    async fn current_user_id(&self) -> Option<UserId> {
        let token = self.session.read().await.clone()?;
        match verify_token(&token, &self.jwt_secret) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                debug!(error = %e, "session token rejected");
                None
            }
        }
    }
}
