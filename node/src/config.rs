//! Process configuration: a YAML file, a few environment overrides, and an optional admin list.

use serde::Deserialize;
use socialcredit_execution::{EconomyConfig, EconomyConfigError};
use socialcredit_types::UserId;
use std::{
    collections::HashSet,
    fmt, fs,
    net::SocketAddr,
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use url::Url;

pub const GATEWAY_TOKEN_ENV: &str = "SOCIALCREDIT_GATEWAY_TOKEN";
pub const STORE_URL_ENV: &str = "SOCIALCREDIT_STORE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} URL scheme must be {expected}: {value}")]
    InvalidUrlScheme {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("price_feed.baseline must be a positive number (got {0})")]
    InvalidBaseline(f64),
    #[error("invalid admin id {value:?}: {reason}")]
    InvalidAdmin { value: String, reason: String },
    #[error("invalid economy settings: {0}")]
    Economy(#[from] EconomyConfigError),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_commands_per_minute")]
    pub per_minute: u32,
    #[serde(default = "default_command_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_commands_per_minute(),
            burst: default_command_burst(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceFeedConfig {
    pub url: String,
    /// JSON pointer to the rate inside the response body.
    #[serde(default = "default_rate_pointer")]
    pub pointer: String,
    /// Rate at which the price multiplier is exactly 1.0.
    pub baseline: f64,
    #[serde(default = "default_price_interval_secs")]
    pub interval_secs: u64,
}

/// Raw configuration as read from disk.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub gateway_token: Option<String>,
    #[serde(default)]
    pub store_url: Option<String>,
    #[serde(default = "default_store_prefix")]
    pub store_prefix: String,
    #[serde(default)]
    pub economy_channel: Option<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub admin_file: Option<PathBuf>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub price_feed: Option<PriceFeedConfig>,
    #[serde(default)]
    pub economy: EconomyConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9123))
}

fn default_store_prefix() -> String {
    "socialcredit:".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_commands_per_minute() -> u32 {
    30
}

fn default_command_burst() -> u32 {
    5
}

fn default_rate_pointer() -> String {
    "/rate".to_string()
}

fn default_price_interval_secs() -> u64 {
    300
}

#[derive(Clone, Debug)]
pub struct PriceFeedSettings {
    pub url: Url,
    pub pointer: String,
    pub baseline: f64,
    pub interval: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    pub per_minute: NonZeroU32,
    pub burst: NonZeroU32,
}

/// Configuration after every mandatory field and address has been checked.
#[derive(Clone)]
pub struct ValidatedConfig {
    pub listen: SocketAddr,
    pub gateway_token: String,
    pub store_url: String,
    pub store_prefix: String,
    pub economy_channel: String,
    pub admins: HashSet<UserId>,
    pub sweep_interval: Duration,
    pub rate_limit: RateLimit,
    pub price_feed: Option<PriceFeedSettings>,
    pub economy: EconomyConfig,
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("listen", &self.listen)
            .field("gateway_token", &"<redacted>")
            .field("store_url", &redact_url(&self.store_url))
            .field("store_prefix", &self.store_prefix)
            .field("economy_channel", &self.economy_channel)
            .field("admins", &self.admins.len())
            .field("sweep_interval", &self.sweep_interval)
            .field("rate_limit", &self.rate_limit)
            .field("price_feed", &self.price_feed)
            .finish_non_exhaustive()
    }
}

fn redact_url(value: &str) -> String {
    match Url::parse(value) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("redacted"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<invalid>".to_string(),
    }
}

impl Config {
    pub fn from_yaml(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `path` and applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(path, &raw)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overrides secrets from the environment. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(token) = non_blank(GATEWAY_TOKEN_ENV) {
            self.gateway_token = Some(token);
        }
        if let Some(url) = non_blank(STORE_URL_ENV) {
            self.store_url = Some(url);
        }
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let gateway_token = required("gateway_token", self.gateway_token)?;
        let store_url = required("store_url", self.store_url)?;
        validate_url("store_url", &store_url, &["redis", "rediss"], "redis or rediss")?;
        let economy_channel = required("economy_channel", self.economy_channel)?;
        ensure_nonzero("sweep_interval_secs", self.sweep_interval_secs)?;
        let rate_limit = RateLimit {
            per_minute: nonzero_u32("rate_limit.per_minute", self.rate_limit.per_minute)?,
            burst: nonzero_u32("rate_limit.burst", self.rate_limit.burst)?,
        };
        let price_feed = self.price_feed.map(validate_price_feed).transpose()?;
        self.economy.validate()?;

        let mut admins = HashSet::new();
        for raw in &self.admins {
            admins.insert(parse_admin(raw)?);
        }
        if let Some(path) = &self.admin_file {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            admins.extend(parse_admin_list(&raw)?);
        }

        Ok(ValidatedConfig {
            listen: self.listen,
            gateway_token,
            store_url,
            store_prefix: self.store_prefix,
            economy_channel,
            admins,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            rate_limit,
            price_feed,
            economy: self.economy,
        })
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing { field })
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn nonzero_u32(field: &'static str, value: u32) -> Result<NonZeroU32, ConfigError> {
    NonZeroU32::new(value).ok_or(ConfigError::InvalidNonZero { field, value: 0 })
}

fn validate_url(
    field: &'static str,
    value: &str,
    schemes: &[&str],
    expected: &'static str,
) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: redact_url(value),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrlScheme {
            field,
            expected,
            value: redact_url(value),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field,
            value: redact_url(value),
        });
    }
    Ok(url)
}

fn validate_price_feed(feed: PriceFeedConfig) -> Result<PriceFeedSettings, ConfigError> {
    let url = validate_url("price_feed.url", &feed.url, &["http", "https"], "http or https")?;
    ensure_nonzero("price_feed.interval_secs", feed.interval_secs)?;
    if !feed.baseline.is_finite() || feed.baseline <= 0.0 {
        return Err(ConfigError::InvalidBaseline(feed.baseline));
    }
    Ok(PriceFeedSettings {
        url,
        pointer: feed.pointer,
        baseline: feed.baseline,
        interval: Duration::from_secs(feed.interval_secs),
    })
}

fn parse_admin(raw: &str) -> Result<UserId, ConfigError> {
    raw.parse::<UserId>()
        .map_err(|err| ConfigError::InvalidAdmin {
            value: raw.to_string(),
            reason: err.to_string(),
        })
}

/// Parses an admin list: one user id per line, `#` starts a comment.
pub fn parse_admin_list(raw: &str) -> Result<Vec<UserId>, ConfigError> {
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(parse_admin)
        .collect()
}
