use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use redis::{AsyncCommands, Client as RedisClient, Script};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::keys::{USER_CHANGES_CHANNEL, USER_INDEX_KEY, user_record_key};
use super::{ChildEvent, ChildFeed, RecordChange, RecordStore, ValueEvent, ValueFeed};
use crate::error::{FeedError, StoreError};
use crate::models::{UserFields, UserId, UserRecord};

/// 写入脚本
///
/// KEYS: 记录哈希、索引集合、变化频道
/// ARGV: 用户ID、是否整条替换（"1"/"0"）、之后为字段名与 JSON 值交替排列
///
/// 返回发布出去的变化通知（与 [`RecordChange`] 的 JSON 格式一致）。
const WRITE_AND_PUBLISH: &str = r#"
local existed = redis.call('EXISTS', KEYS[1]) == 1
if ARGV[2] == '1' then
    redis.call('DEL', KEYS[1])
end
for i = 3, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
redis.call('SADD', KEYS[2], ARGV[1])

local raw = redis.call('HGETALL', KEYS[1])
local fields = {}
for i = 1, #raw, 2 do
    local ok, value = pcall(cjson.decode, raw[i + 1])
    if ok then
        fields[raw[i]] = value
    end
end

local kind = 'added'
if existed then
    kind = 'changed'
end
local payload = cjson.encode({ kind = kind, id = ARGV[1], fields = fields })
redis.call('PUBLISH', KEYS[3], payload)
return payload
"#;

/// 基于 Redis 的共享记录存储
///
/// 每个用户一个哈希 `users:{id}`，字段值以 JSON 编码保存；
/// 所有用户ID记录在 `index:users` 集合中；每次写入在同一个脚本里
/// 向 `changes:users` 频道发布携带完整快照的变化通知。
pub struct RedisStore {
    client: Arc<RedisClient>,
}

impl RedisStore {
    pub fn new(client: Arc<RedisClient>) -> Self {
        Self { client }
    }

    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = RedisClient::open(url)?;
        Ok(Self::new(Arc::new(client)))
    }

    /// 在一个脚本内完成写入、读取快照和发布，变化通知与写入顺序一致
    async fn write_and_publish(
        &self,
        id: &str,
        replace: bool,
        items: &[(String, String)],
    ) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = Script::new(WRITE_AND_PUBLISH);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(user_record_key(id))
            .key(USER_INDEX_KEY)
            .key(USER_CHANGES_CHANNEL)
            .arg(id)
            .arg(if replace { "1" } else { "0" });
        for (field, value) in items {
            invocation.arg(field).arg(value);
        }

        let payload: String = invocation.invoke_async(&mut conn).await?;
        debug!(user_id = %id, bytes = payload.len(), "record change published");
        Ok(())
    }

    async fn read_record(
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let raw: HashMap<String, String> = conn.hgetall(user_record_key(id)).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_hash(raw)))
    }

    async fn read_all(&self) -> Result<Vec<(UserId, Map<String, Value>)>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut ids: Vec<String> = conn.smembers(USER_INDEX_KEY).await?;
        ids.sort();

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = Self::read_record(&mut conn, &id).await? {
                records.push((id, record));
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn set_field(&self, id: &str, field: &str, value: Value) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&value)?;
        self.write_and_publish(id, false, &[(field.to_owned(), encoded)])
            .await
    }

    async fn put_record(&self, id: &str, record: &UserRecord) -> Result<(), StoreError> {
        let items = encode_fields(&record.to_fields())?;
        self.write_and_publish(id, true, &items).await
    }

    async fn read_where(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(UserId, UserFields)>, StoreError> {
        let records = self.read_all().await?;
        Ok(records
            .into_iter()
            .filter(|(_, record)| record.get(field) == Some(value))
            .map(|(id, record)| {
                let fields = UserFields::from_map(&record);
                (id, fields)
            })
            .collect())
    }

    async fn subscribe_children(&self) -> Result<ChildFeed, StoreError> {
        // 先订阅再读快照，避免遗漏；重复的 Added 由使用方按ID幂等处理
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(USER_CHANGES_CHANNEL).await?;

        let initial: Vec<ChildEvent> = self
            .read_all()
            .await?
            .into_iter()
            .map(|(id, record)| ChildEvent::Added {
                fields: UserFields::from_map(&record),
                id,
            })
            .collect();

        let live = pubsub
            .into_on_message()
            .filter_map(|msg| async move { decode_message(&msg) })
            .map(|change| change.to_child_event());
        let closed = stream::once(async {
            ChildEvent::Error(FeedError::Transport("pub/sub connection closed".into()))
        });

        Ok(stream::iter(initial).chain(live).chain(closed).boxed())
    }

    async fn subscribe_record(&self, id: &str) -> Result<ValueFeed, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(USER_CHANGES_CHANNEL).await?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let current = Self::read_record(&mut conn, id)
            .await?
            .map(|record| UserFields::from_map(&record));

        let id = id.to_owned();
        let live = pubsub
            .into_on_message()
            .filter_map(move |msg| {
                let id = id.clone();
                async move { decode_message(&msg).filter(|change| change.id == id) }
            })
            .map(|change| change.to_value_event());
        let closed = stream::once(async {
            ValueEvent::Error(FeedError::Transport("pub/sub connection closed".into()))
        });

        Ok(stream::once(async move { ValueEvent::Value(current) })
            .chain(live)
            .chain(closed)
            .boxed())
    }
}

fn decode_message(msg: &redis::Msg) -> Option<RecordChange> {
    let payload: String = match msg.get_payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "unreadable change payload");
            return None;
        }
    };
    match serde_json::from_str(&payload) {
        Ok(change) => Some(change),
        Err(e) => {
            warn!(error = %e, "malformed change message");
            None
        }
    }
}

/// 编码字段：每个值单独序列化为 JSON 文本
fn encode_fields(fields: &Map<String, Value>) -> Result<Vec<(String, String)>, serde_json::Error> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), serde_json::to_string(value)?)))
        .collect()
}

/// 解码哈希；无法解析的字段直接丢弃，由字段默认值兜底
fn decode_hash(raw: HashMap<String, String>) -> Map<String, Value> {
    raw.into_iter()
        .filter_map(|(name, text)| match serde_json::from_str::<Value>(&text) {
            Ok(value) => Some((name, value)),
            Err(_) => {
                debug!(field = %name, "dropping undecodable field");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn fields_survive_hash_encoding() {
        let record = UserRecord {
            name: "Ana".into(),
            latitude: 4.6,
            longitude: -74.0,
            available: true,
            ..Default::default()
        };
        let fields = record.to_fields();
        let raw: HashMap<String, String> = encode_fields(&fields).unwrap().into_iter().collect();

        assert_eq!(raw["nombre"], "\"Ana\"");
        assert_eq!(raw["available"], "true");
        assert_eq!(decode_hash(raw), fields);
    }

    #[test]
    fn undecodable_fields_are_dropped() {
        let raw = HashMap::from([
            ("nombre".to_string(), "\"Ana\"".to_string()),
            ("latitud".to_string(), "not json".to_string()),
        ]);

        let decoded = decode_hash(raw);
        assert_eq!(decoded.get("nombre"), Some(&json!("Ana")));
        assert!(!decoded.contains_key("latitud"));
    }

    #[test]
    fn script_publishes_the_snapshot_it_just_wrote() {
        let write = WRITE_AND_PUBLISH.find("'HSET'").unwrap();
        let snapshot = WRITE_AND_PUBLISH.find("'HGETALL'").unwrap();
        let publish = WRITE_AND_PUBLISH.find("'PUBLISH'").unwrap();
        assert!(write < snapshot && snapshot < publish);
    }

    #[test]
    fn script_payload_decodes_as_change() {
        let payload = r#"{"fields":{"latitud":4.61,"longitud":-74,"available":true},"id":"u1","kind":"changed"}"#;
        let change: RecordChange = serde_json::from_str(payload).unwrap();
        let event = change.to_child_event();
        match event {
            ChildEvent::Changed { id, fields } => {
                assert_eq!(id, "u1");
                assert_eq!(fields.latitude, Some(4.61));
                assert_eq!(fields.longitude, Some(-74.0));
                assert!(fields.is_available());
            }
            other => panic!("unexpected {other:?}"),
        }

        let empty: RecordChange = serde_json::from_str(r#"{"kind":"added","id":"u2","fields":{}}"#).unwrap();
        assert_eq!(empty.to_child_event(), ChildEvent::Added { id: "u2".into(), fields: UserFields::default() });
    }
}
