use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, warn};

use super::feed::FeedHandle;
use super::view::MapOverlay;
use crate::error::{FeedError, StoreError};
use crate::models::{GeoPoint, UserId};
use crate::store::{RecordStore, ValueEvent};

#[derive(Debug, Default)]
struct TrackerState {
    local: Option<GeoPoint>,
    observed: Option<GeoPoint>,
}

/// 单用户跟踪
///
/// 跟随一个被观察用户的记录，在地图上移动其标记，并在任一方位置变化时
/// 重新计算本机与对方之间的直线距离。
pub struct ObservedUserTracker {
    observed_id: UserId,
    store: Arc<dyn RecordStore>,
    overlay: Arc<dyn MapOverlay>,
    state: Mutex<TrackerState>,
    detached: Arc<AtomicBool>,
}

impl ObservedUserTracker {
    /// `seed` 是花名册中已知的对方坐标
    pub fn new(
        observed_id: impl Into<UserId>,
        seed: Option<GeoPoint>,
        store: Arc<dyn RecordStore>,
        overlay: Arc<dyn MapOverlay>,
    ) -> Self {
        Self {
            observed_id: observed_id.into(),
            store,
            overlay,
            state: Mutex::new(TrackerState {
                local: None,
                observed: seed,
            }),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn observed_id(&self) -> &str {
        &self.observed_id
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// 本机定位更新
    pub async fn on_local_fix(&self, position: GeoPoint) {
        if self.is_detached() {
            return;
        }
        let mut state = self.state.lock().await;
        state.local = Some(position);
        self.overlay.on_local_moved(position);
        self.report_distance(&state);
    }

    /// 处理被观察用户记录的一次推送
    ///
    /// 缺少经度或纬度的快照直接忽略。
    ///
    /// # Errors
    ///
    /// 订阅出错时返回该错误，调用方应停止消费。
    pub async fn on_value(&self, event: ValueEvent) -> Result<(), FeedError> {
        if self.is_detached() {
            return Ok(());
        }
        match event {
            ValueEvent::Value(Some(fields)) => {
                let Some(position) = fields.position() else {
                    debug!(user_id = %self.observed_id, "observed record has no position");
                    return Ok(());
                };
                let mut state = self.state.lock().await;
                state.observed = Some(position);
                self.overlay.on_observed_moved(position);
                self.report_distance(&state);
            }
            ValueEvent::Value(None) => {
                debug!(user_id = %self.observed_id, "observed record is gone");
            }
            ValueEvent::Error(e) => {
                warn!(user_id = %self.observed_id, error = %e, "observed user feed stopped");
                self.overlay.on_feed_error(&e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn report_distance(&self, state: &TrackerState) {
        if let (Some(local), Some(observed)) = (state.local, state.observed) {
            self.overlay.on_distance(local.distance_to(&observed));
        }
    }

    pub async fn distance(&self) -> Option<f64> {
        let state = self.state.lock().await;
        Some(state.local?.distance_to(&state.observed?))
    }

    pub async fn observed_position(&self) -> Option<GeoPoint> {
        self.state.lock().await.observed
    }

    /// 显示初始标记并订阅被观察用户的记录
    ///
    /// # Errors
    ///
    /// 订阅建立失败时返回存储错误。
    pub async fn attach(self: &Arc<Self>) -> Result<FeedHandle, StoreError> {
        if let Some(seed) = self.observed_position().await {
            self.overlay.on_observed_moved(seed);
        }

        let mut feed = self.store.subscribe_record(&self.observed_id).await?;
        let this = Arc::clone(self);

        let task = tokio::spawn(
            async move {
                while let Some(event) = feed.next().await {
                    if this.on_value(event).await.is_err() {
                        break;
                    }
                }
                debug!(user_id = %this.observed_id, "observed user feed ended");
            }
            .in_current_span(),
        );

        Ok(FeedHandle::new(task, Arc::clone(&self.detached)))
    }
}
