use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Top-level TOML configuration: global settings plus one table per task.
///
/// Task tables map plugin names to plugin configuration, kept as raw TOML
/// values here and decoded by each plugin when it runs:
///
/// ```toml
/// [tasks.tv.rss]
/// url = "https://example.com/feed.xml"
///
/// [tasks.tv.regexp]
/// accept = ["1080p"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,

    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub resolvers: ResolverSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One task's configuration. `disable` and `priorities` are reserved keys;
/// every other key names a plugin and carries that plugin's config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Builtin plugins this task opts out of.
    #[serde(default)]
    pub disable: Vec<String>,

    /// Per-task plugin order overrides; lower runs first.
    #[serde(default)]
    pub priorities: HashMap<String, i64>,

    #[serde(flatten)]
    pub plugins: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP timeout in seconds for feed fetches and downloads.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Cap on entries taken from a single input.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Rules for the `rewrite` resolver, applied in order.
    #[serde(default)]
    pub rewrite: Vec<RewriteRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub replace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.as_ref().display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for name in self.tasks.keys() {
            if name.is_empty() {
                return Err(ConfigError::Invalid("Task name cannot be empty".to_string()));
            }
        }

        if self.settings.timeout == 0 {
            return Err(ConfigError::Invalid(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.settings.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "Max entries must be greater than 0".to_string(),
            ));
        }

        for rule in &self.resolvers.rewrite {
            regex::Regex::new(&rule.pattern)
                .map_err(|e| ConfigError::Pattern(format!("rewrite rule '{}': {}", rule.pattern, e)))?;
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("FEEDSIFT_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(timeout) = std::env::var("FEEDSIFT_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                self.settings.timeout = val;
            }
        }

        if let Ok(max_entries) = std::env::var("FEEDSIFT_MAX_ENTRIES") {
            if let Ok(val) = max_entries.parse() {
                self.settings.max_entries = val;
            }
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("feedsift"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("feedsift"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine data directory".to_string()))
    }

    /// Default location of the persisted session.
    pub fn session_file() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("session.json"))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

fn default_user_agent() -> String {
    format!("FeedSift/{}", env!("CARGO_PKG_VERSION"))
}
fn default_timeout() -> u64 { 30 }
fn default_retry_attempts() -> usize { 3 }
fn default_max_entries() -> usize { 100 }

fn default_log_level() -> String { "info".to_string() }
