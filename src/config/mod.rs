use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// 共享记录存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// 客户端登录使用的身份
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub email: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub id_number: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub session_expiration_secs: u64,
    pub bcrypt_cost: u32,
    pub poi_path: Option<PathBuf>,
    pub identity: Option<ClientIdentity>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置，便于测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("redis") => StoreBackend::Redis,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_owned(),
                });
            }
        };

        let redis_url = lookup("REDIS_URL");
        if store_backend == StoreBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }

        let session_expiration = match lookup("SESSION_EXPIRATION") {
            Some(value) => value
                .trim_end_matches('h')
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid {
                    key: "SESSION_EXPIRATION",
                    value,
                })?,
            None => 24,
        };

        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(value) => match value.parse::<u32>() {
                Ok(cost) if (4..=31).contains(&cost) => cost,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "BCRYPT_COST",
                        value,
                    });
                }
            },
            None => bcrypt::DEFAULT_COST,
        };

        let identity = match (lookup("PRESENCE_EMAIL"), lookup("PRESENCE_PASSWORD")) {
            (Some(email), Some(password)) => {
                let name = lookup("PRESENCE_NAME").unwrap_or_else(|| email.clone());
                Some(ClientIdentity {
                    surname: lookup("PRESENCE_SURNAME").unwrap_or_else(|| name.clone()),
                    id_number: lookup("PRESENCE_ID_NUMBER").unwrap_or_else(|| "0".into()),
                    name,
                    email,
                    password,
                })
            }
            _ => None,
        };

        Ok(Config {
            store_backend,
            redis_url,
            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            session_expiration_secs: session_expiration * 3600,
            bcrypt_cost,
            poi_path: lookup("POI_PATH").map(PathBuf::from),
            identity,
        })
    }

    pub fn session_expiration(&self) -> Duration {
        Duration::from_secs(self.session_expiration_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_memory_backend() {
        let config = Config::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.session_expiration(), Duration::from_secs(24 * 3600));
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(config.identity.is_none());
    }

    #[test]
    fn redis_backend_requires_url() {
        let err = Config::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("STORE_BACKEND", "redis"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("REDIS_URL")));
    }

    #[test]
    fn parses_full_configuration() {
        let config = Config::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("STORE_BACKEND", "redis"),
            ("REDIS_URL", "redis://127.0.0.1/"),
            ("SESSION_EXPIRATION", "2h"),
            ("BCRYPT_COST", "4"),
            ("POI_PATH", "assets/locations.json"),
            ("PRESENCE_EMAIL", "ana@example.com"),
            ("PRESENCE_PASSWORD", "secret1"),
        ]))
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.session_expiration_secs, 7200);
        assert_eq!(config.bcrypt_cost, 4);
        assert_eq!(config.poi_path, Some(PathBuf::from("assets/locations.json")));
        let identity = config.identity.unwrap();
        assert_eq!(identity.name, "ana@example.com");
        assert_eq!(identity.surname, "ana@example.com");
        assert_eq!(identity.id_number, "0");
    }

    #[test]
    fn rejects_unknown_backend_and_bad_cost() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("JWT_SECRET", "x"), ("STORE_BACKEND", "sqlite")])),
            Err(ConfigError::Invalid { key: "STORE_BACKEND", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("JWT_SECRET", "x"), ("BCRYPT_COST", "2")])),
            Err(ConfigError::Invalid { key: "BCRYPT_COST", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[])),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }
}
