// Configuration Loader
// Layered configuration loading system

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::layered::{ConfigLayer, ConfigLayerSource, LayeredConfig};
use crate::types::Config;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Configuration loader with layered support
pub struct ConfigLoader {
  /// Global config directory
  global_dir: Option<PathBuf>,
  /// Project config directory
  project_dir: Option<PathBuf>,
  /// Config file given on the command line
  explicit_file: Option<PathBuf>,
  /// Credential lookup for `api_key_env`
  env: EnvLookup,
}

impl ConfigLoader {
  /// Create a new configuration loader rooted at `~/.solace`
  pub fn new() -> Self {
    Self {
      global_dir: dirs::home_dir().map(|home| home.join(".solace")),
      project_dir: None,
      explicit_file: None,
      env: Box::new(|name| std::env::var(name).ok()),
    }
  }

  /// Override the global config directory
  pub fn with_global_dir(mut self, dir: Option<PathBuf>) -> Self {
    self.global_dir = dir;
    self
  }

  /// Set project directory
  pub fn with_project_dir(mut self, dir: PathBuf) -> Self {
    self.project_dir = Some(dir);
    self
  }

  /// Add a config file with precedence over global and project files
  pub fn with_file(mut self, path: PathBuf) -> Self {
    self.explicit_file = Some(path);
    self
  }

  /// Replace the environment lookup used to resolve `api_key_env`
  pub fn with_env_lookup(
    mut self,
    lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
  ) -> Self {
    self.env = Box::new(lookup);
    self
  }

  /// Load configuration without overrides
  pub fn load(&self) -> Result<Config> {
    self.load_with_cli_overrides(Vec::new())
  }

  /// Load configuration with CLI overrides
  pub fn load_with_cli_overrides(&self, cli_overrides: Vec<(String, String)>) -> Result<Config> {
    // Load layers in order:
    // 1. Built-in defaults
    // 2. Global config (~/.solace/config.toml)
    // 3. Project config (.solace/config.toml)
    // 4. Explicit --config file
    // 5. CLI overrides
    let mut layered = LayeredConfig::new();
    layered.add_layer(ConfigLayer {
      source: ConfigLayerSource::Default,
      values: toml::Value::try_from(Config::default())?,
    });

    if let Some(global_dir) = &self.global_dir {
      self.add_file_layer(
        &mut layered,
        ConfigLayerSource::GlobalConfig,
        &global_dir.join("config.toml"),
        false,
      )?;
    }

    if let Some(project_dir) = &self.project_dir {
      self.add_file_layer(
        &mut layered,
        ConfigLayerSource::ProjectConfig,
        &project_dir.join(".solace").join("config.toml"),
        false,
      )?;
    }

    if let Some(path) = &self.explicit_file {
      self.add_file_layer(&mut layered, ConfigLayerSource::ExplicitFile, path, true)?;
    }

    for (key, value) in cli_overrides {
      layered.add_override(&key, parse_override_value(&value));
    }

    let mut config: Config = layered.merge().try_into()?;
    config.ai.resolve_credentials(&*self.env);
    debug!(sources = ?layered.sources(), "configuration loaded");
    Ok(config)
  }

  fn add_file_layer(
    &self,
    layered: &mut LayeredConfig,
    source: ConfigLayerSource,
    path: &Path,
    required: bool,
  ) -> Result<()> {
    if !required && !path.exists() {
      return Ok(());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let table = content
      .parse::<toml::Table>()
      .map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
      })?;
    layered.add_layer(ConfigLayer {
      source,
      values: toml::Value::Table(table),
    });
    Ok(())
  }
}

impl Default for ConfigLoader {
  fn default() -> Self {
    Self::new()
  }
}

/// Split a `KEY=VALUE` override argument
pub fn parse_override(raw: &str) -> Result<(String, String)> {
  match raw.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => {
      Ok((key.trim().to_string(), value.trim().to_string()))
    }
    _ => Err(ConfigError::InvalidOverride(raw.to_string())),
  }
}

/// Values are TOML literals when they parse as one, plain strings otherwise
fn parse_override_value(raw: &str) -> toml::Value {
  format!("value = {raw}")
    .parse::<toml::Table>()
    .ok()
    .and_then(|mut table| table.remove("value"))
    .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}
