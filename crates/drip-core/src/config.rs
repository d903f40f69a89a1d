use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8820;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Safety margin added on top of the inter-request delay when arming the
/// wake-up timer, so an interrupted drain is only ever re-entered after the
/// in-flight step had time to finish.
pub const DEFAULT_GRACE_SECS: u64 = 5;
/// Fixed re-arm delay after an unexpected drain failure. Independent of the
/// per-job rate delay.
pub const DEFAULT_RETRY_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Top-level config (drip.toml + DRIP_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DripConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Where per-instance SQLite files live. One file per instance key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_dir")]
    pub dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

/// Tuning knobs for the drain loop. The per-job rate limit itself is part
/// of each job's submission, not server config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds added to the inter-request delay when arming the wake timer.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Seconds until retry after an unexpected drain failure.
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
    /// Timeout for a single outbound request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_secs: DEFAULT_GRACE_SECS,
            retry_secs: DEFAULT_RETRY_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.drip/instances", home)
}
fn default_grace_secs() -> u64 {
    DEFAULT_GRACE_SECS
}
fn default_retry_secs() -> u64 {
    DEFAULT_RETRY_SECS
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl DripConfig {
    /// Load config from a TOML file with DRIP_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.drip/drip.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: DripConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("DRIP_").split("_"))
            .extract()
            .map_err(|e| crate::error::DripError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.drip/drip.toml", home)
}
