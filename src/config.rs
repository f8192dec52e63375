use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

pub const ENV_BIND: &str = "SENSOR_DB_BIND";
pub const ENV_DATA_DIR: &str = "SENSOR_DB_DATA_DIR";
pub const ENV_JWT_SECRET: &str = "SENSOR_DB_JWT_SECRET";
pub const ENV_BCRYPT_COST: &str = "SENSOR_DB_BCRYPT_COST";
pub const ENV_LOG_FORMAT: &str = "SENSOR_DB_LOG_FORMAT";
pub const ENV_LOG_DIR: &str = "SENSOR_DB_LOG_DIR";

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_DATA_DIR: &str = "sensor_data";
const DEFAULT_BCRYPT_COST: u32 = 10;
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set to a non-empty value")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(".env file could not be loaded: {0}")]
    DotEnv(String),
}

/// A missing `.env` is fine; one that exists but fails to read or parse is not.
fn check_dotenv<T>(result: Result<T, dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ConfigError::DotEnv(e.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime configuration, read once at startup.
#[derive(Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    /// HS256 signing secret for session tokens
    pub jwt_secret: Vec<u8>,
    pub bcrypt_cost: u32,
    pub log_format: LogFormat,
    /// When set, logs are also written to a daily-rolling file here
    pub log_dir: Option<PathBuf>,
}

// Keeps the secret out of Debug output
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("data_dir", &self.data_dir)
            .field("jwt_secret", &"<redacted>")
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("log_format", &self.log_format)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl Config {
    /// Load from the process environment, after merging an optional `.env`.
    pub fn load() -> Result<Self, ConfigError> {
        check_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `load` passes the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse::<SocketAddr>().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            key: ENV_BIND,
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        let jwt_secret = get(ENV_JWT_SECRET)
            .ok_or(ConfigError::Missing(ENV_JWT_SECRET))?
            .into_bytes();

        let bcrypt_cost = match get(ENV_BCRYPT_COST) {
            None => DEFAULT_BCRYPT_COST,
            Some(raw) => {
                let cost = raw.parse::<u32>().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                    key: ENV_BCRYPT_COST,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
                if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
                    return Err(ConfigError::Invalid {
                        key: ENV_BCRYPT_COST,
                        value: raw,
                        reason: format!("must be between {} and {}", MIN_BCRYPT_COST, MAX_BCRYPT_COST),
                    });
                }
                cost
            }
        };

        let log_format = match get(ENV_LOG_FORMAT).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: ENV_LOG_FORMAT,
                    value: other.to_string(),
                    reason: "expected 'pretty' or 'json'".to_string(),
                })
            }
        };

        Ok(Self {
            bind,
            data_dir: PathBuf::from(get(ENV_DATA_DIR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            jwt_secret,
            bcrypt_cost,
            log_format,
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_only_secret() {
        let config = Config::from_lookup(lookup(&[(ENV_JWT_SECRET, "s3cret")])).unwrap();
        assert_eq!(config.bind, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("sensor_data"));
        assert_eq!(config.jwt_secret, b"s3cret".to_vec());
        assert_eq!(config.bcrypt_cost, 10);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_secret_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_JWT_SECRET)));

        let err = Config::from_lookup(lookup(&[(ENV_JWT_SECRET, "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_JWT_SECRET, "k"),
            (ENV_BIND, "127.0.0.1:8080"),
            (ENV_DATA_DIR, "/var/lib/sensors"),
            (ENV_BCRYPT_COST, "12"),
            (ENV_LOG_FORMAT, "json"),
            (ENV_LOG_DIR, "/var/log/sensor_db"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/sensors"));
        assert_eq!(config.bcrypt_cost, 12);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/sensor_db")));
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        for (key, value) in [
            (ENV_BIND, "not-an-addr"),
            (ENV_BCRYPT_COST, "ten"),
            (ENV_BCRYPT_COST, "99"),
            (ENV_LOG_FORMAT, "xml"),
        ] {
            let err = Config::from_lookup(lookup(&[(ENV_JWT_SECRET, "k"), (key, value)])).unwrap_err();
            assert!(err.to_string().contains(key), "{} not named in: {}", key, err);
        }
    }

    #[test]
    fn test_absent_dotenv_is_ignored() {
        let dir = std::env::temp_dir().join("sensor_db_test_dotenv_absent");
        assert!(check_dotenv(dotenvy::from_path(dir.join("missing.env"))).is_ok());
    }

    #[test]
    fn test_malformed_dotenv_is_an_error() {
        let dir = std::env::temp_dir().join("sensor_db_test_dotenv_broken");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".env");
        std::fs::write(&path, "SENSOR_DB_TEST_BROKEN='unterminated\n").unwrap();

        let err = check_dotenv(dotenvy::from_path(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::DotEnv(_)));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config::from_lookup(lookup(&[(ENV_JWT_SECRET, "topsecret")])).unwrap();
        assert!(!format!("{:?}", config).contains("topsecret"));
    }
}
