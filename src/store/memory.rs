use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::{RwLock, broadcast};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::{ChildEvent, ChildFeed, RecordChange, RecordStore, ValueEvent, ValueFeed};
use crate::error::{FeedError, StoreError};
use crate::models::{UserFields, UserId, UserRecord};

/// 订阅者可积压的变化数量
const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Signal {
    Change(RecordChange),
    Cancel(String),
}

/// 进程内的共享记录存储
///
/// 写入与变化广播在同一把写锁内完成，订阅时在读锁内取快照，
/// 因此快照与后续增量之间既不会遗漏也不会重复。
pub struct MemoryStore {
    records: RwLock<BTreeMap<UserId, Map<String, Value>>>,
    changes: broadcast::Sender<Signal>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            records: RwLock::new(BTreeMap::new()),
            changes,
            offline: AtomicBool::new(false),
        }
    }

    /// 模拟离线：之后的写入全部失败
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 模拟存储端取消所有订阅（例如权限被撤销）
    pub fn cancel_subscriptions(&self, reason: &str) {
        let _ = self.changes.send(Signal::Cancel(reason.to_owned()));
    }

    /// 删除整条记录
    pub async fn remove_record(&self, id: &str) -> bool {
        let mut records = self.records.write().await;
        let removed = records.remove(id).is_some();
        if removed {
            let _ = self.changes.send(Signal::Change(RecordChange::removed(id)));
        }
        removed
    }

    pub async fn get(&self, id: &str) -> Option<UserFields> {
        self.records.read().await.get(id).map(UserFields::from_map)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn set_field(&self, id: &str, field: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_online()?;

        let mut records = self.records.write().await;
        let existed = records.contains_key(id);
        let record = records.entry(id.to_owned()).or_default();
        record.insert(field.to_owned(), value);

        let change = RecordChange::new(existed, id, record.clone());
        let _ = self.changes.send(Signal::Change(change));
        Ok(())
    }

    async fn put_record(&self, id: &str, record: &UserRecord) -> Result<(), StoreError> {
        self.ensure_online()?;

        let fields = record.to_fields();
        let mut records = self.records.write().await;
        let existed = records.insert(id.to_owned(), fields.clone()).is_some();

        let _ = self
            .changes
            .send(Signal::Change(RecordChange::new(existed, id, fields)));
        Ok(())
    }

    async fn read_where(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(UserId, UserFields)>, StoreError> {
        self.ensure_online()?;

        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|(_, record)| record.get(field) == Some(value))
            .map(|(id, record)| (id.clone(), UserFields::from_map(record)))
            .collect())
    }

    async fn subscribe_children(&self) -> Result<ChildFeed, StoreError> {
        let records = self.records.read().await;
        let rx = self.changes.subscribe();
        let initial: Vec<ChildEvent> = records
            .iter()
            .map(|(id, record)| ChildEvent::Added {
                id: id.clone(),
                fields: UserFields::from_map(record),
            })
            .collect();
        drop(records);

        debug!(existing = initial.len(), "child feed subscribed");
        Ok(stream::iter(initial).chain(child_events(rx)).boxed())
    }

    async fn subscribe_record(&self, id: &str) -> Result<ValueFeed, StoreError> {
        let records = self.records.read().await;
        let rx = self.changes.subscribe();
        let current = ValueEvent::Value(records.get(id).map(UserFields::from_map));
        drop(records);

        debug!(user_id = %id, "record feed subscribed");
        Ok(stream::once(async move { current })
            .chain(record_events(rx, id.to_owned()))
            .boxed())
    }
}

fn child_events(
    rx: broadcast::Receiver<Signal>,
) -> impl futures_util::Stream<Item = ChildEvent> + Send + 'static {
    stream::unfold(Some(rx), |state| async move {
        let mut rx = state?;
        match rx.recv().await {
            Ok(Signal::Change(change)) => Some((change.to_child_event(), Some(rx))),
            Ok(Signal::Cancel(reason)) => {
                Some((ChildEvent::Error(FeedError::Cancelled(reason)), None))
            }
            Err(RecvError::Lagged(n)) => Some((ChildEvent::Error(FeedError::Lagged(n)), None)),
            Err(RecvError::Closed) => None,
        }
    })
}

fn record_events(
    rx: broadcast::Receiver<Signal>,
    id: UserId,
) -> impl futures_util::Stream<Item = ValueEvent> + Send + 'static {
    stream::unfold(Some((rx, id)), |state| async move {
        let (mut rx, id) = state?;
        loop {
            match rx.recv().await {
                Ok(Signal::Change(change)) if change.id == id => {
                    return Some((change.to_value_event(), Some((rx, id))));
                }
                Ok(Signal::Change(_)) => continue,
                Ok(Signal::Cancel(reason)) => {
                    return Some((ValueEvent::Error(FeedError::Cancelled(reason)), None));
                }
                Err(RecvError::Lagged(n)) => {
                    return Some((ValueEvent::Error(FeedError::Lagged(n)), None));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::fields;

    #[tokio::test]
    async fn read_where_filters_on_field_value() {
        let store = MemoryStore::new();
        store.set_field("u1", fields::AVAILABLE, json!(true)).await.unwrap();
        store.set_field("u2", fields::AVAILABLE, json!(false)).await.unwrap();
        store.set_field("u3", fields::NAME, json!("Eve")).await.unwrap();

        let found = store.read_where(fields::AVAILABLE, &json!(true)).await.unwrap();
        let ids: Vec<_> = found.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["u1"]);
    }

    #[tokio::test]
    async fn offline_writes_fail_without_changing_state() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.set_field("u1", fields::AVAILABLE, json!(true)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.len().await, 0);

        store.set_offline(false);
        store.set_field("u1", fields::AVAILABLE, json!(true)).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn child_feed_replays_existing_records_then_streams_changes() {
        let store = MemoryStore::new();
        store.set_field("u1", fields::NAME, json!("Ana")).await.unwrap();

        let mut feed = store.subscribe_children().await.unwrap();
        store.set_field("u1", fields::AVAILABLE, json!(true)).await.unwrap();
        store.set_field("u2", fields::NAME, json!("Bo")).await.unwrap();
        assert!(store.remove_record("u2").await);

        match feed.next().await.unwrap() {
            ChildEvent::Added { id, fields } => {
                assert_eq!(id, "u1");
                assert!(!fields.is_available());
            }
            other => panic!("unexpected {other:?}"),
        }
        match feed.next().await.unwrap() {
            ChildEvent::Changed { id, fields } => {
                assert_eq!(id, "u1");
                assert!(fields.is_available());
                assert_eq!(fields.name.as_deref(), Some("Ana"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(feed.next().await.unwrap(), ChildEvent::Added { id, .. } if id == "u2"));
        assert_eq!(feed.next().await.unwrap(), ChildEvent::Removed { id: "u2".into() });
    }

    #[tokio::test]
    async fn cancelled_feed_reports_error_and_ends() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe_children().await.unwrap();
        store.cancel_subscriptions("permission denied");

        assert_eq!(
            feed.next().await.unwrap(),
            ChildEvent::Error(FeedError::Cancelled("permission denied".into()))
        );
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn record_feed_only_sees_its_record() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe_record("u1").await.unwrap();
        assert_eq!(feed.next().await.unwrap(), ValueEvent::Value(None));

        store.set_field("u2", fields::LATITUDE, json!(1.0)).await.unwrap();
        store.set_field("u1", fields::LATITUDE, json!(4.6)).await.unwrap();

        match feed.next().await.unwrap() {
            ValueEvent::Value(Some(fields)) => assert_eq!(fields.latitude, Some(4.6)),
            other => panic!("unexpected {other:?}"),
        }

        store.remove_record("u1").await;
        assert_eq!(feed.next().await.unwrap(), ValueEvent::Value(None));
    }

    #[tokio::test]
    async fn put_record_replaces_fields() {
        let store = MemoryStore::new();
        store.set_field("u1", "extra", json!(1)).await.unwrap();
        let record = UserRecord {
            name: "Ana".into(),
            ..Default::default()
        };
        store.put_record("u1", &record).await.unwrap();

        let fields = store.get("u1").await.unwrap();
        assert_eq!(fields, UserFields::from(&record));
    }
}
