//! Agent settings: an optional TOML file layered under `MUDMAP_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use mudmap_agent::CorrelatorConfig;
use mudmap_core::path::DEFAULT_MAX_DEPTH;
use serde::Deserialize;

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/mudmap/map.db") }

fn default_sync_interval() -> u64 { 30 }

fn default_exit_timeout() -> u64 { 5000 }

fn default_implicit_check() -> u64 { 2000 }

fn default_max_path_depth() -> usize { DEFAULT_MAX_DEPTH }

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
  #[serde(default = "default_store_path")]
  pub store_path:         PathBuf,
  /// `http(s)://` server or `sqlite://` file acting as the shared replica.
  #[serde(default)]
  pub remote_url:         Option<String>,
  #[serde(default)]
  pub remote_username:    String,
  #[serde(default)]
  pub remote_password:    String,
  #[serde(default = "default_sync_interval")]
  pub sync_interval_secs: u64,
  /// Defaults to whether `remote_url` is set.
  #[serde(default)]
  pub sync_enabled:       Option<bool>,
  #[serde(default = "default_exit_timeout")]
  pub exit_timeout_ms:    u64,
  #[serde(default = "default_implicit_check")]
  pub implicit_check_ms:  u64,
  #[serde(default = "default_max_path_depth")]
  pub max_path_depth:     usize,
}

impl AgentConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("MUDMAP"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise agent config")
  }

  pub fn sync_enabled(&self) -> bool {
    self.sync_enabled.unwrap_or(self.remote_url.is_some())
  }

  pub fn sync_interval(&self) -> Duration { Duration::from_secs(self.sync_interval_secs.max(1)) }

  pub fn correlator(&self) -> CorrelatorConfig {
    CorrelatorConfig {
      exit_timeout:   Duration::from_millis(self.exit_timeout_ms),
      implicit_check: Duration::from_millis(self.implicit_check_ms),
    }
  }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
