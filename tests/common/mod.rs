#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use geopresence::FeedError;
use geopresence::models::{GeoPoint, RosterEntry, UserFields, UserRecord};
use geopresence::presence::{MapOverlay, PresenceNotice, PresenceNotifier, RosterView};

/// 记录所有界面回调的假视图
#[derive(Default)]
pub struct Recorder {
    pub initial: Mutex<Vec<Vec<RosterEntry>>>,
    pub inserted: Mutex<Vec<RosterEntry>>,
    pub removed: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<RosterEntry>>,
    pub notices: Mutex<Vec<PresenceNotice>>,
    pub local_moves: Mutex<Vec<GeoPoint>>,
    pub observed_moves: Mutex<Vec<GeoPoint>>,
    pub distances: Mutex<Vec<f64>>,
    pub feed_errors: Mutex<Vec<FeedError>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

impl RosterView for Recorder {
    fn on_initial(&self, entries: &[RosterEntry]) {
        self.initial.lock().unwrap().push(entries.to_vec());
    }

    fn on_inserted(&self, entry: &RosterEntry) {
        self.inserted.lock().unwrap().push(entry.clone());
    }

    fn on_removed(&self, id: &str) {
        self.removed.lock().unwrap().push(id.to_owned());
    }

    fn on_updated(&self, entry: &RosterEntry) {
        self.updated.lock().unwrap().push(entry.clone());
    }
}

impl PresenceNotifier for Recorder {
    fn notify(&self, notice: PresenceNotice) {
        self.notices.lock().unwrap().push(notice);
    }
}

impl MapOverlay for Recorder {
    fn on_local_moved(&self, position: GeoPoint) {
        self.local_moves.lock().unwrap().push(position);
    }

    fn on_observed_moved(&self, position: GeoPoint) {
        self.observed_moves.lock().unwrap().push(position);
    }

    fn on_distance(&self, meters: f64) {
        self.distances.lock().unwrap().push(meters);
    }

    fn on_feed_error(&self, error: &FeedError) {
        self.feed_errors.lock().unwrap().push(error.clone());
    }
}

pub fn user(name: &str, available: bool, latitude: f64, longitude: f64) -> UserFields {
    UserFields {
        name: Some(name.to_owned()),
        latitude: Some(latitude),
        longitude: Some(longitude),
        available: Some(available),
        ..Default::default()
    }
}

pub fn record(name: &str, available: bool, latitude: f64, longitude: f64) -> UserRecord {
    UserRecord {
        name: name.to_owned(),
        email: format!("{}@example.com", name.to_lowercase()),
        latitude,
        longitude,
        available,
        ..Default::default()
    }
}

/// 轮询直到条件成立，超时则测试失败；条件里可以使用 `.await`
macro_rules! eventually {
    ($cond:expr) => {{
        let mut reached = false;
        for _ in 0..200 {
            if $cond {
                reached = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(reached, "condition not reached in time: {}", stringify!($cond));
    }};
}
