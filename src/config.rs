//! Configuration system for the WagWalk relay server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/wagwalk-relay/config.toml`)
//! 4. Compiled defaults
//!
//! The video provider API key has no compiled default — it must come from
//! the CLI, the `DAILY_API_KEY` environment variable, or the config file.
//! Secrets are never embedded in source.

use std::path::PathBuf;

/// Default port the relay listens on.
const DEFAULT_PORT: u16 = 3000;

/// Default maximum JSON request body size (10 MiB).
const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default base URL of the video provider REST API.
const DEFAULT_VIDEO_API_URL: &str = "https://api.daily.co/v1";

/// Default endpoint of the push provider's multicast send API.
const DEFAULT_PUSH_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// Default path of the push provider credential file.
const DEFAULT_PUSH_CREDENTIALS: &str = "service-account-key.json";

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// No video provider API key was supplied by any layer.
    #[error(
        "video provider API key is not configured \
         (set DAILY_API_KEY, --video-api-key, or [video].api_key)"
    )]
    MissingVideoApiKey,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the relay.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
    push: PushFileConfig,
    video: VideoFileConfig,
}

/// `[server]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
    max_body_size: Option<usize>,
}

/// `[push]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PushFileConfig {
    credentials_path: Option<PathBuf>,
    endpoint: Option<String>,
}

/// `[video]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct VideoFileConfig {
    api_key: Option<String>,
    api_url: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "WagWalk relay server")]
pub struct RelayCliArgs {
    /// Port to listen on.
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Host address to bind to.
    #[arg(long)]
    pub host: Option<String>,

    /// Path to config file (default: `~/.config/wagwalk-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum JSON request body size in bytes.
    #[arg(long)]
    pub max_body_size: Option<usize>,

    /// Video provider API key.
    #[arg(long, env = "DAILY_API_KEY", hide_env_values = true)]
    pub video_api_key: Option<String>,

    /// Base URL of the video provider REST API.
    #[arg(long)]
    pub video_api_url: Option<String>,

    /// Path to the push provider credential file.
    #[arg(long, env = "PUSH_CREDENTIALS")]
    pub push_credentials: Option<PathBuf>,

    /// Endpoint of the push provider's multicast send API.
    #[arg(long)]
    pub push_endpoint: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAY_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum allowed JSON request body size in bytes.
    pub max_body_size: usize,
    /// Video provider API key (bearer token).
    pub video_api_key: String,
    /// Base URL of the video provider REST API.
    pub video_api_url: String,
    /// Path to the push provider credential file.
    pub push_credentials: PathBuf,
    /// Endpoint of the push provider's multicast send API.
    pub push_endpoint: String,
    /// Log level filter string.
    pub log_level: String,
}

impl RelayConfig {
    /// The socket address the server binds to, e.g. `0.0.0.0:3000`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if no video API key is supplied by any layer.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `RelayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &RelayCliArgs, file: &RelayConfigFile) -> Result<Self, ConfigError> {
        let video_api_key = cli
            .video_api_key
            .clone()
            .or_else(|| file.video.api_key.clone())
            .ok_or(ConfigError::MissingVideoApiKey)?;

        Ok(Self {
            host: cli
                .host
                .clone()
                .or_else(|| file.server.host.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: cli.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
            max_body_size: cli
                .max_body_size
                .or(file.server.max_body_size)
                .unwrap_or(DEFAULT_MAX_BODY_SIZE),
            video_api_key,
            video_api_url: cli
                .video_api_url
                .clone()
                .or_else(|| file.video.api_url.clone())
                .unwrap_or_else(|| DEFAULT_VIDEO_API_URL.to_string()),
            push_credentials: cli
                .push_credentials
                .clone()
                .or_else(|| file.push.credentials_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PUSH_CREDENTIALS)),
            push_endpoint: cli
                .push_endpoint
                .clone()
                .or_else(|| file.push.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_PUSH_ENDPOINT.to_string()),
            log_level: cli.log_level.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the relay.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(RelayConfigFile::default());
        };
        config_dir.join("wagwalk-relay").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
