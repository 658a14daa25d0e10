use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "curalink.toml",
    "config/curalink.toml",
    "crates/config/curalink.toml",
    "../curalink.toml",
    "../config/curalink.toml",
    "backend/curalink.toml",
    "backend/config/curalink.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub realtime: RealtimeConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://curalink.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Tuning for live delivery.
///
/// ```
/// use curalink_config::RealtimeConfig;
///
/// let realtime = RealtimeConfig::default();
/// assert_eq!(realtime.send_timeout().as_millis(), 2000);
/// assert_eq!(realtime.preview_length, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Upper bound for handing one event to a connection's outbound queue.
    #[serde(default = "RealtimeConfig::default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Capacity of each connection's outbound queue.
    #[serde(default = "RealtimeConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Characters of a chat message kept in its notification preview.
    #[serde(default = "RealtimeConfig::default_preview_length")]
    pub preview_length: usize,
    #[serde(default = "RealtimeConfig::default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
}

impl RealtimeConfig {
    const fn default_send_timeout_ms() -> u64 {
        2_000
    }

    const fn default_outbound_buffer() -> usize {
        64
    }

    const fn default_preview_length() -> usize {
        100
    }

    const fn default_heartbeat_interval() -> u64 {
        30
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: Self::default_send_timeout_ms(),
            outbound_buffer: Self::default_outbound_buffer(),
            preview_length: Self::default_preview_length(),
            heartbeat_interval_seconds: Self::default_heartbeat_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
        }
    }
}

impl AuthConfig {
    fn default_session_ttl() -> u64 {
        86_400
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use curalink_config::load;
///
/// std::env::remove_var("CURALINK_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default(
            "realtime.send_timeout_ms",
            clamp_i64(defaults.realtime.send_timeout_ms),
        )?
        .set_default(
            "realtime.outbound_buffer",
            clamp_i64(defaults.realtime.outbound_buffer as u64),
        )?
        .set_default(
            "realtime.preview_length",
            clamp_i64(defaults.realtime.preview_length as u64),
        )?
        .set_default(
            "realtime.heartbeat_interval_seconds",
            clamp_i64(defaults.realtime.heartbeat_interval_seconds),
        )?
        .set_default(
            "auth.session_ttl_seconds",
            clamp_i64(defaults.auth.session_ttl_seconds),
        )?;

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("CURALINK_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via CURALINK_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(config::Environment::with_prefix("CURALINK").separator("__"));

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    validate(&config).context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    debug!(?config, "loaded backend configuration");
    Ok(config)
}

fn validate(config: &AppConfig) -> anyhow::Result<()> {
    if config.realtime.outbound_buffer == 0 {
        bail!("realtime.outbound_buffer must be greater than zero");
    }
    if config.realtime.send_timeout_ms == 0 {
        bail!("realtime.send_timeout_ms must be greater than zero");
    }
    if config.realtime.heartbeat_interval_seconds == 0 {
        bail!("realtime.heartbeat_interval_seconds must be greater than zero");
    }
    if config.database.max_connections == 0 {
        bail!("database.max_connections must be greater than zero");
    }
    Ok(())
}
