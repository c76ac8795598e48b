/// 数据模型
pub mod location;
pub mod poi;
pub mod roster;
pub mod user;

// 重新导出常用类型
pub use location::{GeoPoint, LocationFix};
pub use poi::{PointOfInterest, PoiError, load_points_of_interest, parse_points_of_interest};
pub use roster::{RosterEntry, UNKNOWN_USER};
pub use user::{UserFields, UserId, UserRecord, fields};
