//! 在线状态同步
//!
//! 数据流：本机定位 -> 共享记录存储 -> 实时订阅 -> 同步器 -> 界面。

pub mod feed;
pub mod publisher;
pub mod roster;
pub mod synchronizer;
pub mod tracker;
pub mod view;

pub use feed::FeedHandle;
pub use publisher::{PresencePublisher, WriteAck};
pub use roster::Roster;
pub use synchronizer::PresenceSynchronizer;
pub use tracker::ObservedUserTracker;
pub use view::{LoggingView, MapOverlay, PresenceNotice, PresenceNotifier, RosterView};
