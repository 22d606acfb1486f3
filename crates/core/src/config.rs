//! Runtime settings.
//!
//! Built-in defaults are overlaid by a TOML file (`storefront.toml` or
//! `config/storefront.toml`, or the path given with `--config`), then by
//! `STOREFRONT_*` environment variables. The merged result is validated once.
//! `${VAR}` placeholders inside the file are expanded before parsing.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["storefront.toml", "config/storefront.toml"];

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Pool acquire timeout.
    pub timeout_secs: u64,
    /// How long a purchase waits for another writer's lock before failing.
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://storefront.db?mode=rwc".to_string(),
            max_connections: 5,
            timeout_secs: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database. Limited to one connection, since every
    /// SQLite connection to `:memory:` opens a separate database.
    pub fn in_memory() -> Self {
        Self { url: "sqlite::memory:".to_string(), max_connections: 1, ..Self::default() }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), port: 8000, graceful_shutdown_secs: 15 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Explicit file; it must exist. Without one the default locations are
    /// tried and skipped when absent.
    pub config_path: Option<PathBuf>,
}

impl LoadOptions {
    pub fn from_path(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file `{0}` does not exist")]
    NotFound(PathBuf),
    #[error("could not read config file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("config file references `${{{var}}}` but it is not set")]
    UnsetVariable { var: String },
    #[error("config file has a `${{` placeholder without a closing `}}`")]
    UnclosedPlaceholder,
    #[error("environment variable `{key}` has an unusable value `{value}`")]
    InvalidEnv { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = match locate(options.config_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reads one file over the defaults. Environment variables are not applied.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let expanded = expand_placeholders(&raw)?;
        toml::from_str(&expanded)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        let database = &mut self.database;
        env_string("STOREFRONT_DATABASE_URL", &mut database.url);
        env_parsed("STOREFRONT_DATABASE_MAX_CONNECTIONS", &mut database.max_connections)?;
        env_parsed("STOREFRONT_DATABASE_TIMEOUT_SECS", &mut database.timeout_secs)?;
        env_parsed("STOREFRONT_DATABASE_BUSY_TIMEOUT_MS", &mut database.busy_timeout_ms)?;

        let server = &mut self.server;
        env_string("STOREFRONT_SERVER_BIND_ADDRESS", &mut server.bind_address);
        env_parsed("STOREFRONT_SERVER_PORT", &mut server.port)?;
        let grace = &mut server.graceful_shutdown_secs;
        env_parsed("STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS", grace)?;

        // The long names win over the short aliases.
        let logging = &mut self.logging;
        if !env_string("STOREFRONT_LOGGING_LEVEL", &mut logging.level) {
            env_string("STOREFRONT_LOG_LEVEL", &mut logging.level);
        }
        if !env_parsed("STOREFRONT_LOGGING_FORMAT", &mut logging.format)? {
            env_parsed("STOREFRONT_LOG_FORMAT", &mut logging.format)?;
        }

        Ok(())
    }

    /// Checks every setting and reports all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let database = &self.database;
        let url = database.url.trim();
        if !(url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:") {
            problems.push("database.url must be a sqlite URL (`sqlite://...` or `sqlite::...`)");
        }
        if database.max_connections == 0 {
            problems.push("database.max_connections must be at least 1");
        }
        if !(1..=300).contains(&database.timeout_secs) {
            problems.push("database.timeout_secs must be in 1..=300");
        }
        if !(1..=60_000).contains(&database.busy_timeout_ms) {
            problems.push("database.busy_timeout_ms must be in 1..=60000");
        }

        let server = &self.server;
        if server.bind_address.trim().is_empty() {
            problems.push("server.bind_address must not be empty");
        }
        if server.port == 0 {
            problems.push("server.port must be at least 1");
        }
        if server.graceful_shutdown_secs == 0 {
            problems.push("server.graceful_shutdown_secs must be at least 1");
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            problems.push("logging.level must be one of trace|debug|info|warn|error");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

fn locate(explicit: Option<PathBuf>) -> Result<Option<PathBuf>, ConfigError> {
    match explicit {
        Some(path) if path.is_file() => Ok(Some(path)),
        Some(path) => Err(ConfigError::NotFound(path)),
        None => Ok(DEFAULT_CONFIG_FILES.iter().map(PathBuf::from).find(|path| path.is_file())),
    }
}

fn expand_placeholders(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail.find('}').ok_or(ConfigError::UnclosedPlaceholder)?;
        let var = &tail[..end];
        let value =
            env::var(var).map_err(|_| ConfigError::UnsetVariable { var: var.to_string() })?;
        output.push_str(&value);
        rest = &tail[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_string(key: &str, target: &mut String) -> bool {
    match env_value(key) {
        Some(value) => {
            *target = value;
            true
        }
        None => false,
    }
}

fn env_parsed<T: FromStr>(key: &str, target: &mut T) -> Result<bool, ConfigError> {
    let Some(raw) = env_value(key) else {
        return Ok(false);
    };
    *target = raw
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key: key.to_string(), value: raw.clone() })?;
    Ok(true)
}
