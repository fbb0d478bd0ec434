//! Process configuration.
//!
//! Everything is read once at startup from the environment (after loading an
//! optional `.env`). Signing secrets are mandatory: a missing secret is a fatal
//! startup error rather than a per-request failure.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone)]
pub struct TokenSecrets {
    pub access: String,
    pub refresh: String,
    pub activation: String,
}

impl std::fmt::Debug for TokenSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSecrets { .. }")
    }
}

/// Settings for the HTTP transactional-mail API.
#[derive(Debug, Clone)]
pub struct MailApiConfig {
    pub url: String,
    pub api_key: String,
    pub sender: String,
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub secrets: TokenSecrets,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub activation_ttl_secs: i64,
    pub resend_cooldown_secs: i64,
    pub sweep_interval_secs: u64,
    pub cookie_secure: bool,
    /// Persist the in-process credential cache to `<data_dir>/cache.bin`.
    pub cache_snapshot: bool,
    pub redis_url: Option<String>,
    pub mail: Option<MailApiConfig>,
}

pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;
pub const DEFAULT_ACTIVATION_TTL_SECS: i64 = 120;
pub const DEFAULT_RESEND_COOLDOWN_SECS: i64 = 120;

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() { warn!(target: "startup", "ignoring unreadable .env: {}", e); }
        }
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; `load` passes the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secret = |k: &'static str| get(k).ok_or(ConfigError::Missing(k));

        let secrets = TokenSecrets {
            access: secret("ACCESS_TOKEN_SECRET")?,
            refresh: secret("REFRESH_TOKEN_SECRET")?,
            activation: secret("ACTIVATION_SECRET")?,
        };

        let mail = match (get("MAIL_API_URL"), get("MAIL_API_KEY"), get("MAIL_SENDER")) {
            (Some(url), Some(api_key), Some(sender)) => Some(MailApiConfig { url, api_key, sender, sender_name: get("MAIL_SENDER_NAME") }),
            (None, None, None) => None,
            _ => {
                warn!(target: "startup", "MAIL_API_URL, MAIL_API_KEY and MAIL_SENDER must all be set; mail will only be logged");
                None
            }
        };

        let cfg = Config {
            http_port: parse_or(&get, "BABYTRACK_HTTP_PORT", DEFAULT_HTTP_PORT)?,
            data_dir: get("BABYTRACK_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            secrets,
            access_ttl_secs: positive(parse_or(&get, "ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?, "ACCESS_TOKEN_TTL_SECS")?,
            refresh_ttl_secs: positive(parse_or(&get, "REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?, "REFRESH_TOKEN_TTL_SECS")?,
            activation_ttl_secs: positive(parse_or(&get, "ACTIVATION_TTL_SECS", DEFAULT_ACTIVATION_TTL_SECS)?, "ACTIVATION_TTL_SECS")?,
            resend_cooldown_secs: parse_or(&get, "ACTIVATION_RESEND_COOLDOWN_SECS", DEFAULT_RESEND_COOLDOWN_SECS)?.max(0),
            sweep_interval_secs: parse_or(&get, "SWEEP_INTERVAL_SECS", 60u64)?.max(1),
            cookie_secure: parse_bool(get("COOKIE_SECURE").as_deref()).unwrap_or(false),
            cache_snapshot: parse_bool(get("CACHE_SNAPSHOT").as_deref()).unwrap_or(false),
            redis_url: get("REDIS_URL"),
            mail,
        };
        if cfg.refresh_ttl_secs < cfg.access_ttl_secs {
            warn!(target: "startup", "REFRESH_TOKEN_TTL_SECS ({}) is shorter than ACCESS_TOKEN_TTL_SECS ({})", cfg.refresh_ttl_secs, cfg.access_ttl_secs);
        }
        Ok(cfg)
    }

    pub fn log_summary(&self) {
        info!(
            target: "startup",
            "config: http_port={}, data_dir={:?}, access_ttl={}s, refresh_ttl={}s, activation_ttl={}s, resend_cooldown={}s, cookie_secure={}, cache={}, mail={}",
            self.http_port,
            self.data_dir,
            self.access_ttl_secs,
            self.refresh_ttl_secs,
            self.activation_ttl_secs,
            self.resend_cooldown_secs,
            self.cookie_secure,
            if self.redis_url.is_some() { "redis" } else if self.cache_snapshot { "memory+snapshot" } else { "memory" },
            if self.mail.is_some() { "http" } else { "log" },
        );
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

fn positive(v: i64, key: &'static str) -> Result<i64, ConfigError> {
    if v > 0 { Ok(v) } else { Err(ConfigError::Invalid { key, value: v.to_string() }) }
}

pub fn parse_bool(v: Option<&str>) -> Option<bool> {
    let s = v?.to_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
