use std::sync::Arc;

use tracing::info;

use crate::auth::IdentityProvider;
use crate::error::AuthError;
use crate::models::{GeoPoint, UserId};
use crate::presence::{
    MapOverlay, ObservedUserTracker, PresenceNotifier, PresencePublisher, PresenceSynchronizer,
    RosterView, WriteAck,
};
use crate::store::RecordStore;

/// 登录会话上下文
///
/// 持有当前用户ID与外部服务句柄，代替全局的认证状态。
/// 进入时把本机用户标记为可用，`logout` / `dispose` 时标记为不可用。
pub struct SessionContext {
    user_id: UserId,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    publisher: PresencePublisher,
}

impl SessionContext {
    /// 登录并开始会话
    ///
    /// # Errors
    ///
    /// 凭据不合法或认证失败时返回 [`AuthError`]。
    pub async fn sign_in(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        email: &str,
        password: &str,
    ) -> Result<Self, AuthError> {
        let user_id = identity.sign_in(email.trim(), password).await?;
        Ok(Self::start(user_id, identity, store))
    }

    /// 恢复已登录用户的会话
    ///
    /// # Errors
    ///
    /// 没有有效会话时返回 [`AuthError::NotSignedIn`]。
    pub async fn resume(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, AuthError> {
        let user_id = identity
            .current_user_id()
            .await
            .ok_or(AuthError::NotSignedIn)?;
        Ok(Self::start(user_id, identity, store))
    }

    fn start(user_id: UserId, identity: Arc<dyn IdentityProvider>, store: Arc<dyn RecordStore>) -> Self {
        let publisher = PresencePublisher::new(user_id.clone(), Arc::clone(&store));
        info!(user_id = %user_id, "session started");
        publisher.set_availability(true);
        Self {
            user_id,
            identity,
            store,
            publisher,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn go_online(&self) -> WriteAck {
        self.publisher.set_availability(true)
    }

    pub fn go_offline(&self) -> WriteAck {
        self.publisher.set_availability(false)
    }

    pub fn publisher(&self) -> PresencePublisher {
        self.publisher.clone()
    }

    pub fn synchronizer(
        &self,
        view: Arc<dyn RosterView>,
        notifier: Arc<dyn PresenceNotifier>,
    ) -> Arc<PresenceSynchronizer> {
        Arc::new(PresenceSynchronizer::with_publisher(
            self.publisher.clone(),
            Arc::clone(&self.store),
            view,
            notifier,
        ))
    }

    pub fn tracker(
        &self,
        observed_id: &str,
        seed: Option<GeoPoint>,
        overlay: Arc<dyn MapOverlay>,
    ) -> Arc<ObservedUserTracker> {
        Arc::new(ObservedUserTracker::new(
            observed_id,
            seed,
            Arc::clone(&self.store),
            overlay,
        ))
    }

    /// 登出：先把本机用户标记为不可用，再结束身份会话
    pub async fn logout(self) -> WriteAck {
        let write = self.publisher.set_availability(false);
        self.identity.sign_out().await;
        info!(user_id = %self.user_id, "logged out");
        write
    }

    /// 界面销毁：标记为不可用，但保留身份会话
    pub fn dispose(self) -> WriteAck {
        info!(user_id = %self.user_id, "session disposed");
        self.publisher.set_availability(false)
    }
}
