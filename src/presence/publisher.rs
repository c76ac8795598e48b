use std::sync::{Arc, OnceLock};

use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, error, info, warn};

use super::tracker::ObservedUserTracker;
use crate::models::{LocationFix, UserId, fields};
use crate::store::{RecordStore, record_path};

/// 写入完成通知；写入（无论成败）处理完后就绪，可以直接丢弃
pub type WriteAck = oneshot::Receiver<()>;

#[derive(Debug, Clone, Copy)]
enum Write {
    Availability(bool),
    Location { latitude: f64, longitude: f64 },
}

struct Job {
    write: Write,
    applied: oneshot::Sender<()>,
}

/// 本机用户记录的写入方
///
/// 所有写入都是发出即忘：调用方不等待结果，成功和失败分别记录日志，
/// 失败不重试，也不影响本地花名册。写入按发出顺序进入同一个队列，
/// 由一个后台任务逐条执行，所以后发出的写入总是后落地。
/// 克隆出的写入方共用同一个队列。
#[derive(Clone)]
pub struct PresencePublisher {
    user_id: UserId,
    store: Arc<dyn RecordStore>,
    queue: Arc<OnceLock<mpsc::UnboundedSender<Job>>>,
}

impl PresencePublisher {
    pub fn new(user_id: impl Into<UserId>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            queue: Arc::new(OnceLock::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// 写入本机用户的 `available` 字段
    pub fn set_availability(&self, available: bool) -> WriteAck {
        self.enqueue(Write::Availability(available))
    }

    /// 写入本机用户的经纬度；每次定位都写，不做合并或限流
    pub fn publish_location(&self, latitude: f64, longitude: f64) -> WriteAck {
        self.enqueue(Write::Location {
            latitude,
            longitude,
        })
    }

    /// 消费定位流：每次定位都发布，并转发给正在跟踪的地图
    pub async fn follow_fixes<S>(&self, fixes: S, tracker: Option<&ObservedUserTracker>)
    where
        S: Stream<Item = LocationFix>,
    {
        let mut fixes = std::pin::pin!(fixes);
        while let Some(fix) = fixes.next().await {
            let point = fix.point();
            if let LocationFix::FirstFix(_) = fix {
                info!(lat = point.latitude, lon = point.longitude, "first location fix");
            }
            self.publish_location(point.latitude, point.longitude);
            if let Some(tracker) = tracker {
                tracker.on_local_fix(point).await;
            }
        }
        debug!(user_id = %self.user_id, "location feed ended");
    }

    fn enqueue(&self, write: Write) -> WriteAck {
        let (applied, ack) = oneshot::channel();
        let queue = self.queue.get_or_init(|| self.spawn_writer());
        if queue.send(Job { write, applied }).is_err() {
            warn!(user_id = %self.user_id, ?write, "write queue closed, write dropped");
        }
        ack
    }

    /// 启动写入任务；所有发送端释放后，处理完剩余写入即退出
    fn spawn_writer(&self) -> mpsc::UnboundedSender<Job> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let store = Arc::clone(&self.store);
        let user_id = self.user_id.clone();

        tokio::spawn(
            async move {
                while let Some(job) = rx.recv().await {
                    apply(store.as_ref(), &user_id, job.write).await;
                    let _ = job.applied.send(());
                }
                debug!(user_id = %user_id, "write queue closed");
            }
            .in_current_span(),
        );
        tx
    }
}

async fn apply(store: &dyn RecordStore, user_id: &str, write: Write) {
    match write {
        Write::Availability(available) => {
            if write_field(store, user_id, fields::AVAILABLE, json!(available)).await {
                info!(user_id = %user_id, available, "availability updated");
            }
        }
        Write::Location {
            latitude,
            longitude,
        } => {
            // 两个坐标依次写入，订阅方看到的快照不会倒退
            write_field(store, user_id, fields::LATITUDE, json!(latitude)).await;
            write_field(store, user_id, fields::LONGITUDE, json!(longitude)).await;
        }
    }
}

async fn write_field(store: &dyn RecordStore, user_id: &str, field: &str, value: Value) -> bool {
    let path = record_path(user_id, field);
    match store.set_field(user_id, field, value).await {
        Ok(()) => {
            debug!(%path, "field write succeeded");
            true
        }
        Err(e) => {
            error!(%path, error = %e, "field write failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::models::GeoPoint;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn availability_write_reaches_the_store() {
        let store = Arc::new(MemoryStore::new());
        let publisher = PresencePublisher::new("me", store.clone());

        publisher.set_availability(true).await.unwrap();
        assert_eq!(store.get("me").await.unwrap().available, Some(true));

        publisher.set_availability(false).await.unwrap();
        assert_eq!(store.get("me").await.unwrap().available, Some(false));
    }

    #[tokio::test]
    async fn location_writes_both_coordinates() {
        let store = Arc::new(MemoryStore::new());
        let publisher = PresencePublisher::new("me", store.clone());

        publisher.publish_location(4.6, -74.0).await.unwrap();
        let fields = store.get("me").await.unwrap();
        assert_eq!(fields.latitude, Some(4.6));
        assert_eq!(fields.longitude, Some(-74.0));
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_write_is_logged_and_not_retried() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let publisher = PresencePublisher::new("me", store.clone());

        publisher.set_availability(true).await.unwrap();

        assert!(logs_contain("field write failed"));
        assert!(logs_contain("users/me/available"));
        assert!(!logs_contain("availability updated"));

        store.set_offline(false);
        assert!(store.get("me").await.is_none());
    }

    #[tokio::test]
    async fn first_fix_is_published() {
        let store = Arc::new(MemoryStore::new());
        let publisher = PresencePublisher::new("me", store.clone());
        let fixes = futures_util::stream::iter(vec![LocationFix::FirstFix(GeoPoint::new(2.0, 3.0))]);

        publisher.follow_fixes(fixes, None).await;

        // 队列按顺序执行，之后发出的写入完成时定位一定已写入
        publisher.set_availability(true).await.unwrap();
        let fields = store.get("me").await.unwrap();
        assert_eq!(fields.position(), Some(GeoPoint::new(2.0, 3.0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writes_land_in_issue_order() {
        let store = Arc::new(MemoryStore::new());
        let publisher = PresencePublisher::new("me", store.clone());

        for k in 0..20 {
            publisher.set_availability(k % 2 == 0);
            publisher.publish_location(f64::from(k), f64::from(k));
        }
        publisher.set_availability(false).await.unwrap();

        let fields = store.get("me").await.unwrap();
        assert_eq!(fields.available, Some(false));
        assert_eq!(fields.position(), Some(GeoPoint::new(19.0, 19.0)));
    }

    #[tokio::test]
    async fn clones_share_one_queue() {
        let store = Arc::new(MemoryStore::new());
        let publisher = PresencePublisher::new("me", store.clone());
        let other = publisher.clone();

        publisher.set_availability(true);
        other.set_availability(false).await.unwrap();
        assert_eq!(store.get("me").await.unwrap().available, Some(false));
    }
}
