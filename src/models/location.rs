use serde::{Deserialize, Serialize};

/// 地球半径（米），与地图 SDK 的距离计算保持一致
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// 地理坐标点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// 计算两点间的大圆距离（米），使用 haversine 公式
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METERS * c
    }
}

/// 设备定位事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationFix {
    /// 定位服务启动后的第一次定位
    FirstFix(GeoPoint),
    Fix(GeoPoint),
}

impl LocationFix {
    pub fn point(&self) -> GeoPoint {
        match self {
            LocationFix::FirstFix(point) | LocationFix::Fix(point) => *point,
        }
    }

    /// 解析 "纬度,经度" 格式的文本
    pub fn parse_point(text: &str) -> Option<GeoPoint> {
        let (lat, lon) = text.split_once(',')?;
        let latitude = lat.trim().parse::<f64>().ok()?;
        let longitude = lon.trim().parse::<f64>().ok()?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(GeoPoint::new(latitude, longitude))
    }
}
