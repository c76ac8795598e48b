//! 共享记录存储
//!
//! 远端的树形键值存储，按用户ID保存记录，支持字段级写入、
//! 一次性过滤读取，以及集合级和单条记录级的实时订阅。

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::error::{FeedError, StoreError};
use crate::models::{UserFields, UserId, UserRecord};

pub mod change;
pub mod keys;
pub mod memory;
pub mod redis_store;

pub use change::{ChangeKind, RecordChange};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// 用户集合的根路径
pub const USERS_PATH: &str = "users";

/// 集合订阅事件
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    Added { id: UserId, fields: UserFields },
    Changed { id: UserId, fields: UserFields },
    Removed { id: UserId },
    Error(FeedError),
}

/// 单条记录订阅事件；记录不存在时为 `Value(None)`
#[derive(Debug, Clone, PartialEq)]
pub enum ValueEvent {
    Value(Option<UserFields>),
    Error(FeedError),
}

pub type ChildFeed = BoxStream<'static, ChildEvent>;
pub type ValueFeed = BoxStream<'static, ValueEvent>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 写入 `users/{id}/{field}`
    async fn set_field(&self, id: &str, field: &str, value: Value) -> Result<(), StoreError>;

    /// 整条写入记录（注册时使用），覆盖已有字段
    async fn put_record(&self, id: &str, record: &UserRecord) -> Result<(), StoreError>;

    /// 一次性读取 `field == value` 的所有记录
    async fn read_where(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(UserId, UserFields)>, StoreError>;

    /// 订阅用户集合；先为每条已有记录发出 `Added`，之后推送增量变化
    async fn subscribe_children(&self) -> Result<ChildFeed, StoreError>;

    /// 订阅单条记录；先发出当前值，之后每次变化推送完整快照
    async fn subscribe_record(&self, id: &str) -> Result<ValueFeed, StoreError>;
}

/// 字段路径，仅用于日志
pub fn record_path(id: &str, field: &str) -> String {
    format!("{}/{}/{}", USERS_PATH, id, field)
}
