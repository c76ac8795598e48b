use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, warn};

use super::feed::FeedHandle;
use super::publisher::{PresencePublisher, WriteAck};
use super::roster::Roster;
use super::view::{PresenceNotice, PresenceNotifier, RosterView};
use crate::error::{FeedError, StoreError};
use crate::models::{RosterEntry, UserFields, UserId, fields};
use crate::store::{ChildEvent, RecordStore};

/// 在线状态同步器
///
/// 把共享记录存储中 `available == true` 的用户镜像到本地花名册，
/// 并驱动列表界面和上下线提示。本机用户永远不会出现在花名册中。
///
/// 判断"上线"依据的是该ID当前是否已在花名册中，而不是上一次看到的
/// `available` 值：本地并不总是知道上一次的值。
pub struct PresenceSynchronizer {
    local_id: UserId,
    store: Arc<dyn RecordStore>,
    publisher: PresencePublisher,
    roster: Mutex<Roster>,
    view: Arc<dyn RosterView>,
    notifier: Arc<dyn PresenceNotifier>,
    detached: Arc<AtomicBool>,
}

impl PresenceSynchronizer {
    pub fn new(
        local_id: impl Into<UserId>,
        store: Arc<dyn RecordStore>,
        view: Arc<dyn RosterView>,
        notifier: Arc<dyn PresenceNotifier>,
    ) -> Self {
        let publisher = PresencePublisher::new(local_id, Arc::clone(&store));
        Self::with_publisher(publisher, store, view, notifier)
    }

    /// 与其他组件共用同一个写入方，保证本机写入的先后顺序
    pub fn with_publisher(
        publisher: PresencePublisher,
        store: Arc<dyn RecordStore>,
        view: Arc<dyn RosterView>,
        notifier: Arc<dyn PresenceNotifier>,
    ) -> Self {
        Self {
            local_id: publisher.user_id().to_owned(),
            publisher,
            store,
            roster: Mutex::new(Roster::new()),
            view,
            notifier,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// 一次性读取所有可用用户，整体替换本地花名册并通知界面全量重绘
    ///
    /// 读取期间到达的实时事件可能被这次结果覆盖。
    ///
    /// # Errors
    ///
    /// 读取失败时返回存储错误，本地花名册保持不变。
    pub async fn load_initial(&self) -> Result<usize, StoreError> {
        let records = match self
            .store
            .read_where(fields::AVAILABLE, &Value::Bool(true))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "failed to load available users");
                return Err(e);
            }
        };

        let entries: Vec<RosterEntry> = records
            .iter()
            .filter(|(id, _)| *id != self.local_id)
            .map(|(id, fields)| RosterEntry::from_fields(id, fields))
            .collect();

        if self.is_detached() {
            return Ok(0);
        }

        let mut roster = self.roster.lock().await;
        roster.replace(entries);
        self.view.on_initial(roster.entries());
        info!(count = roster.len(), "roster loaded");
        Ok(roster.len())
    }

    pub async fn on_record_added(&self, id: &str, fields: &UserFields) {
        self.reconcile(id, fields).await;
    }

    pub async fn on_record_changed(&self, id: &str, fields: &UserFields) {
        self.reconcile(id, fields).await;
    }

    /// 记录被删除：静默移除，不发提示
    pub async fn on_record_removed(&self, id: &str) {
        if self.is_detached() {
            return;
        }
        let mut roster = self.roster.lock().await;
        if roster.remove(id).is_some() {
            self.view.on_removed(id);
            debug!(user_id = %id, "record removed from store");
        }
    }

    async fn reconcile(&self, id: &str, fields: &UserFields) {
        if self.is_detached() || id == self.local_id {
            return;
        }

        let mut roster = self.roster.lock().await;
        let present = roster.contains(id);

        match (fields.is_available(), present) {
            (true, false) => {
                let entry = RosterEntry::from_fields(id, fields);
                let name = entry.name.clone();
                roster.upsert(entry.clone());
                self.view.on_inserted(&entry);
                self.notifier.notify(PresenceNotice::Connected { name });
                info!(user_id = %id, "user connected");
            }
            (true, true) => {
                let entry = RosterEntry::from_fields(id, fields);
                roster.upsert(entry.clone());
                self.view.on_updated(&entry);
            }
            (false, true) => {
                let removed = roster.remove(id);
                let name = fields
                    .name
                    .clone()
                    .or_else(|| removed.map(|entry| entry.name))
                    .unwrap_or_default();
                self.view.on_removed(id);
                self.notifier.notify(PresenceNotice::Disconnected { name });
                info!(user_id = %id, "user disconnected");
            }
            (false, false) => {}
        }
    }

    /// 处理一条集合订阅事件
    ///
    /// # Errors
    ///
    /// 订阅出错时返回该错误；调用方应停止消费，订阅不会自动重建，
    /// 花名册保持最后已知状态。
    pub async fn handle(&self, event: ChildEvent) -> Result<(), FeedError> {
        match event {
            ChildEvent::Added { id, fields } => self.on_record_added(&id, &fields).await,
            ChildEvent::Changed { id, fields } => self.on_record_changed(&id, &fields).await,
            ChildEvent::Removed { id } => self.on_record_removed(&id).await,
            ChildEvent::Error(e) => {
                warn!(error = %e, "availability feed stopped");
                return Err(e);
            }
        }
        Ok(())
    }

    /// 订阅用户集合并在后台消费事件
    ///
    /// # Errors
    ///
    /// 订阅建立失败时返回存储错误。
    pub async fn attach(self: &Arc<Self>) -> Result<FeedHandle, StoreError> {
        let mut feed = self.store.subscribe_children().await?;
        let this = Arc::clone(self);

        let task = tokio::spawn(
            async move {
                while let Some(event) = feed.next().await {
                    if this.handle(event).await.is_err() {
                        break;
                    }
                }
                debug!("availability feed ended");
            }
            .in_current_span(),
        );

        Ok(FeedHandle::new(task, Arc::clone(&self.detached)))
    }

    /// 写入本机用户的可用状态；不影响本地花名册
    pub fn set_local_availability(&self, available: bool) -> WriteAck {
        self.publisher.set_availability(available)
    }

    /// 写入本机用户的位置；不影响本地花名册
    pub fn publish_location(&self, latitude: f64, longitude: f64) -> WriteAck {
        self.publisher.publish_location(latitude, longitude)
    }

    pub async fn entries(&self) -> Vec<RosterEntry> {
        self.roster.lock().await.entries().to_vec()
    }

    pub async fn get(&self, id: &str) -> Option<RosterEntry> {
        self.roster.lock().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.roster.lock().await.contains(id)
    }
}
