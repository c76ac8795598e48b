use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::location::GeoPoint;

#[derive(Debug, Error)]
pub enum PoiError {
    #[error("failed to read points of interest: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed points of interest document: {0}")]
    Json(#[from] serde_json::Error),
}

/// 地图上的固定兴趣点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl PointOfInterest {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Deserialize)]
struct PoiDocument {
    #[serde(rename = "locationsArray")]
    locations: Vec<PointOfInterest>,
}

pub fn parse_points_of_interest(json: &str) -> Result<Vec<PointOfInterest>, PoiError> {
    let document: PoiDocument = serde_json::from_str(json)?;
    Ok(document.locations)
}

pub async fn load_points_of_interest(path: &Path) -> Result<Vec<PointOfInterest>, PoiError> {
    let json = tokio::fs::read_to_string(path).await?;
    parse_points_of_interest(&json)
}
