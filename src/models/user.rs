use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::location::GeoPoint;

/// 用户唯一标识，注册时分配，之后不再变化
pub type UserId = String;

/// 远端存储中用户记录的字段名
pub mod fields {
    pub const NAME: &str = "nombre";
    pub const SURNAME: &str = "apellido";
    pub const ID_NUMBER: &str = "identificacion";
    pub const EMAIL: &str = "email";
    pub const PROFILE_IMAGE: &str = "profileImage";
    pub const LATITUDE: &str = "latitud";
    pub const LONGITUDE: &str = "longitud";
    pub const AVAILABLE: &str = "available";
}

/// 用户记录，存放在 `users/{id}` 下
///
/// 密码不在记录中保存，由身份服务负责。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "apellido")]
    pub surname: String,
    #[serde(rename = "identificacion")]
    pub id_number: i64,
    pub email: String,
    #[serde(rename = "profileImage")]
    pub profile_image: String,
    #[serde(rename = "latitud")]
    pub latitude: f64,
    #[serde(rename = "longitud")]
    pub longitude: f64,
    pub available: bool,
}

impl UserRecord {
    /// 转换为字段级写入使用的 JSON 对象
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(fields::NAME.into(), json!(self.name));
        map.insert(fields::SURNAME.into(), json!(self.surname));
        map.insert(fields::ID_NUMBER.into(), json!(self.id_number));
        map.insert(fields::EMAIL.into(), json!(self.email));
        map.insert(fields::PROFILE_IMAGE.into(), json!(self.profile_image));
        map.insert(fields::LATITUDE.into(), json!(self.latitude));
        map.insert(fields::LONGITUDE.into(), json!(self.longitude));
        map.insert(fields::AVAILABLE.into(), json!(self.available));
        map
    }
}

/// 记录快照的类型化视图
///
/// 每个字段都是可选的：缺失或类型不符的字段一律视为不存在，
/// 由使用方按字段默认值处理，不会当作错误。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserFields {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub id_number: Option<i64>,
    pub email: Option<String>,
    pub profile_image: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub available: Option<bool>,
}

impl UserFields {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_owned);
        let number = |key: &str| map.get(key).and_then(Value::as_f64);

        Self {
            name: text(fields::NAME),
            surname: text(fields::SURNAME),
            id_number: map.get(fields::ID_NUMBER).and_then(Value::as_i64),
            email: text(fields::EMAIL),
            profile_image: text(fields::PROFILE_IMAGE),
            latitude: number(fields::LATITUDE),
            longitude: number(fields::LONGITUDE),
            available: map.get(fields::AVAILABLE).and_then(Value::as_bool),
        }
    }

    /// 非对象的快照（例如 null）视为空记录
    pub fn from_value(value: &Value) -> Self {
        value.as_object().map(Self::from_map).unwrap_or_default()
    }

    pub fn is_available(&self) -> bool {
        self.available.unwrap_or(false)
    }

    /// 经纬度都存在时才返回位置
    pub fn position(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.latitude?, self.longitude?))
    }
}

impl From<&UserRecord> for UserFields {
    fn from(record: &UserRecord) -> Self {
        Self {
            name: Some(record.name.clone()),
            surname: Some(record.surname.clone()),
            id_number: Some(record.id_number),
            email: Some(record.email.clone()),
            profile_image: Some(record.profile_image.clone()),
            latitude: Some(record.latitude),
            longitude: Some(record.longitude),
            available: Some(record.available),
        }
    }
}
