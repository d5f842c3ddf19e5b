use config::{Config as ConfigBuilder, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "podtail.yaml";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "PODTAIL_CONFIG_PATH";

/// Relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route serving the log WebSocket
    pub path: String,
    /// How long shutdown waits for open sessions to close
    pub shutdown_drain_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            path: "/logs".to_string(),
            shutdown_drain_seconds: 10,
        }
    }
}

/// Per-session relay tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upper bound of one source read, and so of one message
    pub chunk_size: usize,
    /// Chunks buffered between the source reader and the socket writer
    pub queue_capacity: usize,
    /// Optional delay between forwarded chunks (0 = no rate limit)
    pub chunk_interval_ms: u64,
    /// Close the session after this long without log data (0 = never)
    pub idle_timeout_seconds: u64,
    /// Upper bound on opening the log source
    pub open_timeout_seconds: u64,
    /// How long to wait for the viewer to acknowledge the close frame
    pub close_timeout_seconds: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            queue_capacity: 16,
            chunk_interval_ms: 0,
            idle_timeout_seconds: 600,
            open_timeout_seconds: 30,
            close_timeout_seconds: 5,
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub const fn chunk_interval(&self) -> Option<Duration> {
        non_zero_duration(Duration::from_millis(self.chunk_interval_ms))
    }

    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        non_zero_duration(Duration::from_secs(self.idle_timeout_seconds))
    }

    #[must_use]
    pub const fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_seconds)
    }

    #[must_use]
    pub const fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_seconds)
    }
}

const fn non_zero_duration(d: Duration) -> Option<Duration> {
    if d.is_zero() {
        None
    } else {
        Some(d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Kubernetes pod logs through the API server
    #[default]
    Kubernetes,
    /// Standard output of a spawned local command
    Command,
}

/// Log source selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub namespace: String,
    /// Container used when the viewer does not name one
    pub default_container: Option<String>,
    /// Lines of history sent before following (None = all)
    pub tail_lines: Option<i64>,
    pub timestamps: bool,
    pub command: CommandConfig,
    /// Kubeconfig file for the `kubernetes` source; the in-cluster or
    /// default kubeconfig is used when unset
    pub kubeconfig: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Kubernetes,
            namespace: "default".to_string(),
            default_container: None,
            tail_lines: None,
            timestamps: false,
            command: CommandConfig::default(),
            kubeconfig: None,
        }
    }
}

/// Program run by the `command` source.
///
/// `{workload}` and `{container}` in `args` are replaced per session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_file, None)
    }

    /// Like [`Config::load`], reading variables from `env` instead of the
    /// process environment when it is given
    fn load_with_env(
        config_file: Option<&str>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path));
        }

        // PODTAIL_SERVER__PORT, PODTAIL_RELAY__CHUNK_SIZE, ...
        builder = builder.add_source(
            Environment::with_prefix("PODTAIL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("source.command.args")
                .source(env),
        );

        builder.build()?.try_deserialize()
    }

    /// Check settings that would otherwise fail at runtime.
    ///
    /// Returns every problem found rather than the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.server.path.starts_with('/') {
            errors.push(format!(
                "server.path must start with '/': {}",
                self.server.path
            ));
        }
        if self.server.path == "/health" {
            errors.push("server.path must not shadow /health".to_string());
        }
        if self.relay.chunk_size == 0 || self.relay.chunk_size > 1024 * 1024 {
            errors.push(format!(
                "relay.chunk_size must be between 1 and 1048576: {}",
                self.relay.chunk_size
            ));
        }
        if self.relay.queue_capacity == 0 {
            errors.push("relay.queue_capacity must be at least 1".to_string());
        }
        if self.relay.open_timeout_seconds == 0 {
            errors.push("relay.open_timeout_seconds must be at least 1".to_string());
        }
        if self.source.namespace.trim().is_empty() {
            errors.push("source.namespace must not be empty".to_string());
        }
        if matches!(self.source.tail_lines, Some(n) if n < 0) {
            errors.push("source.tail_lines must not be negative".to_string());
        }
        if self.source.kind == SourceKind::Command && self.source.command.program.trim().is_empty()
        {
            errors.push("source.command.program is required for the command source".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\": {}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Resolve and load the relay configuration.
///
/// Config file search order:
/// 1. `explicit` (from the command line); it must exist
/// 2. `PODTAIL_CONFIG_PATH` environment variable
/// 3. `./podtail.yaml`
/// 4. Environment variables and defaults only
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<Config> {
    let path = resolve_config_path(
        explicit,
        std::env::var(CONFIG_PATH_ENV).ok(),
        Path::new(DEFAULT_CONFIG_FILE),
    )?;

    let config = Config::load(path.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    if let Err(errors) = config.validate() {
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}

/// Pick the config file to load, if any.
///
/// An explicit path must exist. An environment path or the default file
/// that does not exist is skipped.
fn resolve_config_path(
    explicit: Option<&str>,
    env_path: Option<String>,
    default_file: &Path,
) -> anyhow::Result<Option<String>> {
    if let Some(path) = explicit {
        if !Path::new(path).exists() {
            anyhow::bail!("config file not found: {path}");
        }
        return Ok(Some(path.to_string()));
    }
    if let Some(path) = env_path.filter(|p| Path::new(p).exists()) {
        return Ok(Some(path));
    }
    Ok(default_file
        .exists()
        .then(|| default_file.to_string_lossy().into_owned()))
}
