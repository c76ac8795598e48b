use std::fmt;

use tracing::{info, warn};

use crate::error::FeedError;
use crate::models::{GeoPoint, RosterEntry};

/// 花名册列表界面
pub trait RosterView: Send + Sync {
    /// 全量重绘
    fn on_initial(&self, entries: &[RosterEntry]);
    fn on_inserted(&self, entry: &RosterEntry);
    fn on_removed(&self, id: &str);
    fn on_updated(&self, entry: &RosterEntry);
}

/// 上下线提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceNotice {
    Connected { name: String },
    Disconnected { name: String },
}

impl fmt::Display for PresenceNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceNotice::Connected { name } => write!(f, "{} connected", name),
            PresenceNotice::Disconnected { name } => write!(f, "{} disconnected", name),
        }
    }
}

/// 提示通道，尽力而为，不重试
pub trait PresenceNotifier: Send + Sync {
    fn notify(&self, notice: PresenceNotice);
}

/// 单用户跟踪地图
pub trait MapOverlay: Send + Sync {
    fn on_local_moved(&self, position: GeoPoint);
    fn on_observed_moved(&self, position: GeoPoint);
    /// 本机与被观察用户之间的直线距离（米）
    fn on_distance(&self, meters: f64);
    fn on_feed_error(&self, error: &FeedError);
}

/// 把所有界面回调写入日志的视图，供无界面客户端使用
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingView;

impl RosterView for LoggingView {
    fn on_initial(&self, entries: &[RosterEntry]) {
        info!(count = entries.len(), "roster loaded");
        for entry in entries {
            info!(user_id = %entry.id, name = %entry.name, lat = entry.latitude, lon = entry.longitude, "available user");
        }
    }

    fn on_inserted(&self, entry: &RosterEntry) {
        info!(user_id = %entry.id, name = %entry.name, "roster entry added");
    }

    fn on_removed(&self, id: &str) {
        info!(user_id = %id, "roster entry removed");
    }

    fn on_updated(&self, entry: &RosterEntry) {
        info!(user_id = %entry.id, lat = entry.latitude, lon = entry.longitude, "roster entry updated");
    }
}

impl PresenceNotifier for LoggingView {
    fn notify(&self, notice: PresenceNotice) {
        info!("{}", notice);
    }
}

impl MapOverlay for LoggingView {
    fn on_local_moved(&self, position: GeoPoint) {
        info!(lat = position.latitude, lon = position.longitude, "local marker moved");
    }

    fn on_observed_moved(&self, position: GeoPoint) {
        info!(lat = position.latitude, lon = position.longitude, "observed marker moved");
    }

    fn on_distance(&self, meters: f64) {
        info!("distance: {:.2} m", meters);
    }

    fn on_feed_error(&self, error: &FeedError) {
        warn!(error = %error, "failed to follow observed user");
    }
}
