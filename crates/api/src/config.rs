//! Process configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use gatehouse_auth::SessionSettings;
use gatehouse_core::UserId;
use gatehouse_observability::LogFormat;

pub const BIND_ADDR: &str = "GATEHOUSE_BIND_ADDR";
pub const TOKEN_ISSUER: &str = "GATEHOUSE_TOKEN_ISSUER";
pub const TOKEN_AUDIENCE: &str = "GATEHOUSE_TOKEN_AUDIENCE";
pub const ROOT_USER: &str = "GATEHOUSE_ROOT_USER";
pub const DEFAULT_LOCALE: &str = "GATEHOUSE_DEFAULT_LOCALE";
pub const DEFAULT_ZONE: &str = "GATEHOUSE_DEFAULT_ZONE";
pub const PRIVATE_KEY_FILE: &str = "JWT_PRIVATE_KEY_FILE";
pub const PUBLIC_KEY_FILE: &str = "JWT_PUBLIC_KEY_FILE";
pub const REQUEST_TIMEOUT_MS: &str = "GATEHOUSE_REQUEST_TIMEOUT_MS";
pub const REVOCATION_SWEEP_SECS: &str = "GATEHOUSE_REVOCATION_SWEEP_SECS";
pub const LOG_FORMAT: &str = "GATEHOUSE_LOG_FORMAT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("JWT_PRIVATE_KEY_FILE and JWT_PUBLIC_KEY_FILE must be set together")]
    IncompleteKeyPair,
}

/// Where the signing/verification keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyConfig {
    /// Built-in development pair (insecure).
    Development,
    Files { private: PathBuf, public: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub issuer: String,
    pub audience: String,
    pub root_user: UserId,
    pub default_locale: String,
    pub default_zone: String,
    pub keys: KeyConfig,
    /// `None` disables the per-request deadline.
    pub request_timeout: Option<Duration>,
    pub revocation_sweep: Duration,
    pub log_format: LogFormat,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let mut config = Self {
            bind_addr: parse(BIND_ADDR, &or_default(BIND_ADDR, "0.0.0.0:8080"))?,
            issuer: or_default(TOKEN_ISSUER, "gatehouse"),
            audience: or_default(TOKEN_AUDIENCE, "gatehouse-api"),
            root_user: parse(ROOT_USER, &or_default(ROOT_USER, "root"))?,
            default_locale: or_default(DEFAULT_LOCALE, "en"),
            default_zone: or_default(DEFAULT_ZONE, "UTC"),
            keys: KeyConfig::Development,
            request_timeout: Some(Duration::from_millis(10_000)),
            revocation_sweep: Duration::from_secs(60),
            log_format: LogFormat::Json,
        };

        config.keys = match (get(PRIVATE_KEY_FILE), get(PUBLIC_KEY_FILE)) {
            (None, None) => KeyConfig::Development,
            (Some(private), Some(public)) => KeyConfig::Files {
                private: PathBuf::from(private),
                public: PathBuf::from(public),
            },
            _ => return Err(ConfigError::IncompleteKeyPair),
        };

        if let Some(raw) = get(REQUEST_TIMEOUT_MS) {
            let ms: u64 = parse(REQUEST_TIMEOUT_MS, &raw)?;
            config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(raw) = get(REVOCATION_SWEEP_SECS) {
            let secs: u64 = parse(REVOCATION_SWEEP_SECS, &raw)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: REVOCATION_SWEEP_SECS,
                    value: raw,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.revocation_sweep = Duration::from_secs(secs);
        }
        if let Some(raw) = get(LOG_FORMAT) {
            config.log_format = parse(LOG_FORMAT, &raw)?;
        }

        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            root_user_id: self.root_user.clone(),
            default_locale: self.default_locale.clone(),
            default_zone: self.default_zone.clone(),
        }
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
