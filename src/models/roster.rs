use serde::Serialize;

use super::location::GeoPoint;
use super::user::{UserFields, UserId};

/// 记录缺少昵称时显示的名字
pub const UNKNOWN_USER: &str = "unknown user";

/// 花名册条目：当前可用的其他用户在本地的投影
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    pub id: UserId,
    pub name: String,
    pub image: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl RosterEntry {
    /// 按字段默认值构造：名字 "unknown user"，头像为空，坐标 (0, 0)
    pub fn from_fields(id: &str, fields: &UserFields) -> Self {
        Self {
            id: id.to_owned(),
            name: fields.name.clone().unwrap_or_else(|| UNKNOWN_USER.to_owned()),
            image: fields.profile_image.clone().unwrap_or_default(),
            latitude: fields.latitude.unwrap_or(0.0),
            longitude: fields.longitude.unwrap_or(0.0),
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}
