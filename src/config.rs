//! Runtime configuration read from the environment (and `.env` via dotenvy).

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEV_JWT_SECRET: &str = "risk-compass-development-secret";

/// Longest accepted token lifetime: one year.
pub const MAX_JWT_TTL_HOURS: u64 = 24 * 366;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl_hours: u64,
    /// When set, registered emails must belong to this domain.
    pub email_domain: Option<String>,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            data_dir: PathBuf::from("rmis_data"),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_ttl_hours: 24,
            email_domain: None,
            log_format: LogFormat::Pretty,
            log_dir: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Config {
    /// Load `.env` if present, then read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(v) => v.trim().parse::<u16>().map_err(|_| ConfigError::Invalid { key: "PORT", value: v })?,
            None => defaults.port,
        };
        let jwt_ttl_hours = match get("JWT_TTL_HOURS") {
            Some(v) => match v.trim().parse::<u64>() {
                Ok(hours) if (1..=MAX_JWT_TTL_HOURS).contains(&hours) => hours,
                _ => return Err(ConfigError::Invalid { key: "JWT_TTL_HOURS", value: v }),
            },
            None => defaults.jwt_ttl_hours,
        };
        let log_format = match get("RMIS_LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid { key: "RMIS_LOG_FORMAT", value: other.to_string() })
            }
        };

        Ok(Self {
            host: get("RMIS_HOST").unwrap_or(defaults.host),
            port,
            data_dir: get("RMIS_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            jwt_secret: get("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_ttl_hours,
            email_domain: get("RMIS_EMAIL_DOMAIN").map(|d| d.trim().trim_start_matches('@').to_ascii_lowercase()),
            log_format,
            log_dir: get("RMIS_LOG_DIR").map(PathBuf::from),
            admin_email: get("RMIS_ADMIN_EMAIL"),
            admin_password: get("RMIS_ADMIN_PASSWORD"),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid { key: "RMIS_HOST", value: self.host.clone() })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
