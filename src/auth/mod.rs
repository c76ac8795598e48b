//! 身份认证
use async_trait::async_trait;

use crate::error::AuthError;
use crate::models::UserId;

pub mod local;

pub use local::LocalIdentityProvider;

/// 身份服务：认证用户并给出稳定的用户ID
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    async fn sign_out(&self);

    async fn current_user_id(&self) -> Option<UserId>;
}
