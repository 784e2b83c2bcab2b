use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub upstream: UpstreamConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
  /// Base URL of the document store API; empty means "not configured"
  #[serde(default)]
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      url: String::new(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

/// Where snapshots are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMedium {
  /// SQLite file, survives restarts
  #[default]
  Sqlite,
  /// Process memory, gone when the command exits
  Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// When false, nothing is cached and every view starts from loading
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default)]
  pub medium: CacheMedium,
  #[serde(default = "default_max_age_hours")]
  pub max_age_hours: u32,
  /// SQLite file; defaults to the platform data directory
  pub path: Option<PathBuf>,
  /// Size limit for the memory medium; writes past it fail
  pub quota_bytes: Option<usize>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      medium: CacheMedium::default(),
      max_age_hours: default_max_age_hours(),
      path: None,
      quota_bytes: None,
    }
  }
}

impl CacheConfig {
  pub fn max_age(&self) -> chrono::Duration {
    chrono::Duration::hours(i64::from(self.max_age_hours))
  }
}

fn default_true() -> bool {
  true
}

fn default_max_age_hours() -> u32 {
  24
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter directive, overridden by RUST_LOG
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write logs here instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_log_level() -> String {
  "warn".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./eventhub.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/eventhub/config.yaml
  ///
  /// Defaults apply when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("eventhub.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("eventhub").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the upstream API token from environment variables.
  ///
  /// Checks EVENTHUB_TOKEN. The token is optional; public collections are
  /// readable without one.
  pub fn get_api_token() -> Option<String> {
    std::env::var("EVENTHUB_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}
