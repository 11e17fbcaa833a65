// Configuration Types
// All configuration type definitions

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::{Model, Provider};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// AI provider catalog and transport settings
  pub ai: AiConfig,
  /// Logging settings
  pub logging: LoggingConfig,
}

// ============================================================================
// AI CONFIGURATION
// ============================================================================

/// AI provider catalog, the user's selected model, and transport timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
  /// User-selected default model, bare or `provider/model`
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_model: Option<String>,
  /// Configured providers
  pub providers: Vec<Provider>,
  /// Configured models
  pub models: Vec<Model>,
  /// HTTP transport settings
  pub transport: TransportConfig,
}

impl Default for AiConfig {
  fn default() -> Self {
    Self {
      default_model: None,
      providers: crate::defaults::bundled_providers(),
      models: crate::defaults::bundled_models(),
      transport: TransportConfig::default(),
    }
  }
}

impl AiConfig {
  /// Resolves `api_key_env` credentials for every provider
  pub fn resolve_credentials(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
    for provider in &mut self.providers {
      provider.resolve_credential(lookup);
    }
  }

  pub fn provider(&self, id: &str) -> Option<&Provider> {
    self.providers.iter().find(|p| p.id == id)
  }
}

// ============================================================================
// TRANSPORT CONFIGURATION
// ============================================================================

/// HTTP transport settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
  /// TCP/TLS connect timeout
  pub connect_timeout_secs: u64,
  /// Longest silence tolerated while waiting for bytes
  pub idle_timeout_secs: u64,
  /// Hard deadline for a whole request
  pub request_timeout_secs: u64,
  /// Undecodable stream events tolerated before the stream is failed
  pub max_malformed_events: u32,
}

impl Default for TransportConfig {
  fn default() -> Self {
    Self {
      connect_timeout_secs: 10,
      idle_timeout_secs: 30,
      request_timeout_secs: 300,
      max_malformed_events: 3,
    }
  }
}

impl TransportConfig {
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_secs(self.connect_timeout_secs)
  }

  pub fn idle_timeout(&self) -> Duration {
    Duration::from_secs(self.idle_timeout_secs)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

// ============================================================================
// LOGGING CONFIGURATION
// ============================================================================

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive used when RUST_LOG is unset
  pub level: String,
  /// Colorized output
  pub ansi: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "warn".to_string(),
      ansi: true,
    }
  }
}
