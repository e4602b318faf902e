use clap::Parser;
use lib_simlink::core::{EmptyResponseShape, LinkSettings};
use lib_simlink::loggers::LogOptions;
use lib_simlink::sources::SyntheticConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "simbridge.conf";

pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 5000));
pub const DEFAULT_LOG_DIR: &str = "./logs";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Simulator telemetry to HTTP JSON bridge", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "SIMBRIDGE_LISTEN_ADDR", help = "Address the snapshot endpoint listens on.")]
    pub listen_addr: Option<SocketAddr>,

    #[clap(long, env = "SIMBRIDGE_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "SIMBRIDGE_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "SIMBRIDGE_LOG_LEVEL", help = "Logging level or filter (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "SIMBRIDGE_APPLICATION_NAME", help = "Name announced to the simulator when connecting.")]
    pub application_name: Option<String>,

    #[clap(long, env = "SIMBRIDGE_RETRY_INTERVAL_MS", help = "Delay in milliseconds between simulator connection attempts.")]
    pub retry_interval_ms: Option<u64>,

    #[clap(long, env = "SIMBRIDGE_CONNECT_TIMEOUT_MS", help = "Longest a single connection attempt may block, in milliseconds.")]
    pub connect_timeout_ms: Option<u64>,

    #[clap(long, env = "SIMBRIDGE_EMPTY_RESPONSE", help = "Body served before the first snapshot: legacy or uniform.")]
    pub empty_response: Option<EmptyResponseShape>,

    #[clap(long, env = "SIMBRIDGE_SYNTHETIC_TITLE", help = "Aircraft title reported by the synthetic engine.")]
    pub synthetic_title: Option<String>,

    #[clap(long, env = "SIMBRIDGE_SYNTHETIC_REFUSE_ATTEMPTS", help = "Connection attempts the synthetic engine refuses before accepting.")]
    pub synthetic_refuse_attempts: Option<u32>,

    #[clap(long, env = "SIMBRIDGE_SYNTHETIC_DROP_AFTER_SECS", help = "Seconds after which the synthetic engine drops each link.")]
    pub synthetic_drop_after_secs: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            listen_addr: other.listen_addr.or(self.listen_addr),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            application_name: other.application_name.or(self.application_name),
            retry_interval_ms: other.retry_interval_ms.or(self.retry_interval_ms),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
            empty_response: other.empty_response.or(self.empty_response),
            synthetic_title: other.synthetic_title.or(self.synthetic_title),
            synthetic_refuse_attempts: other.synthetic_refuse_attempts.or(self.synthetic_refuse_attempts),
            synthetic_drop_after_secs: other.synthetic_drop_after_secs.or(self.synthetic_drop_after_secs),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub empty_response: EmptyResponseShape,
    pub link: LinkSettings,
    pub synthetic: SyntheticConfig,
}

impl Settings {
    /// Fills unset keys with their defaults and validates the rest.
    fn from_config(config: Config) -> Result<Settings, ConfigError> {
        let link_defaults = LinkSettings::default();
        let synthetic_defaults = SyntheticConfig::default();

        Ok(Settings {
            listen_addr: config.listen_addr.unwrap_or(DEFAULT_LISTEN_ADDR),
            log_dir: config.log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            log_level: config.log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            empty_response: config.empty_response.unwrap_or_default(),
            link: LinkSettings {
                application_name: config.application_name.unwrap_or(link_defaults.application_name),
                retry_interval: positive_millis("retryIntervalMs", config.retry_interval_ms)?
                    .unwrap_or(link_defaults.retry_interval),
                connect_timeout: positive_millis("connectTimeoutMs", config.connect_timeout_ms)?
                    .unwrap_or(link_defaults.connect_timeout),
                ..link_defaults
            },
            synthetic: SyntheticConfig {
                title: config.synthetic_title.unwrap_or(synthetic_defaults.title),
                refuse_attempts: config.synthetic_refuse_attempts.unwrap_or(synthetic_defaults.refuse_attempts),
                drop_after: config.synthetic_drop_after_secs.map(Duration::from_secs),
                ..synthetic_defaults
            },
        })
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            file_prefix: "server_simbridge".to_string(),
            console: true,
        }
    }
}

// A zero interval would turn the connect loop into a busy loop.
fn positive_millis(key: &'static str, value: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than 0".to_string(),
        }),
        other => Ok(other.map(Duration::from_millis)),
    }
}

/// Loads the configuration from defaults, the config file, environment
/// variables and the command line, in increasing order of precedence.
pub fn load_config() -> Result<Settings, ConfigError> {
    resolve(Config::parse())
}

/// Layers `cli` (which already includes environment variables) over the
/// config file and the defaults.
pub fn resolve(cli: Config) -> Result<Settings, ConfigError> {
    let (config_file_path, explicit) = match &cli.config_path {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let mut current_config = Config::default();

    if config_file_path.exists() {
        let config_str = fs::read_to_string(&config_file_path).map_err(|source| ConfigError::Read {
            path: config_file_path.clone(),
            source,
        })?;
        let file_config = serde_json::from_str::<Config>(&config_str).map_err(|source| ConfigError::Parse {
            path: config_file_path.clone(),
            source,
        })?;
        current_config = current_config.merge(file_config);
    } else if explicit {
        return Err(ConfigError::Missing(config_file_path));
    }

    current_config = current_config.merge(cli);
    Settings::from_config(current_config)
}
