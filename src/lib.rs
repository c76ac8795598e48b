use std::sync::Arc;

use config::{Config, StoreBackend};

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod presence;
pub mod registration;
pub mod session;
pub mod store;
pub mod utils;

pub use error::{AppError, AuthError, FeedError, StoreError, ValidationError};

use auth::{IdentityProvider, LocalIdentityProvider};
use store::{MemoryStore, RecordStore, RedisStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// 按配置构造存储后端与身份服务
    ///
    /// # Errors
    ///
    /// Redis 地址无效时返回错误。
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let store: Arc<dyn RecordStore> = match config.store_backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or(config::ConfigError::Missing("REDIS_URL"))?;
                Arc::new(RedisStore::open(url)?)
            }
        };

        let identity: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new(
            config.jwt_secret.clone(),
            config.session_expiration(),
            config.bcrypt_cost,
        ));

        Ok(Self {
            config,
            store,
            identity,
        })
    }
}
