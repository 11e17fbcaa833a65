// Layered Configuration
// Support for layered configuration with precedence

use serde::{Deserialize, Serialize};

/// Layered configuration wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayeredConfig {
  /// Configuration layers, lowest precedence first
  layers: Vec<ConfigLayer>,
}

/// Configuration layer with source tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLayer {
  /// Layer source
  pub source: ConfigLayerSource,
  /// Configuration values
  pub values: toml::Value,
}

/// Configuration layer source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigLayerSource {
  /// Built-in defaults
  Default,
  /// Global user config
  GlobalConfig,
  /// Project-specific config
  ProjectConfig,
  /// File passed explicitly on the command line
  ExplicitFile,
  /// CLI override
  CliOverride,
}

impl LayeredConfig {
  /// Create a new layered configuration
  pub fn new() -> Self {
    Self { layers: Vec::new() }
  }

  /// Add a layer
  pub fn add_layer(&mut self, layer: ConfigLayer) {
    self.layers.push(layer);
  }

  /// Add a single dotted-path override (`ai.transport.idle_timeout_secs`)
  pub fn add_override(&mut self, key: &str, value: toml::Value) {
    let mut values = value;
    for segment in key.rsplit('.') {
      let mut table = toml::map::Map::new();
      table.insert(segment.to_string(), values);
      values = toml::Value::Table(table);
    }
    self.add_layer(ConfigLayer {
      source: ConfigLayerSource::CliOverride,
      values,
    });
  }

  /// Sources in precedence order
  pub fn sources(&self) -> Vec<ConfigLayerSource> {
    self.layers.iter().map(|layer| layer.source.clone()).collect()
  }

  /// Get merged configuration.
  ///
  /// Tables merge key by key; any other value (arrays included) from a
  /// later layer replaces the earlier one.
  pub fn merge(&self) -> toml::Value {
    let mut merged = toml::map::Map::new();
    for layer in &self.layers {
      if let toml::Value::Table(table) = &layer.values {
        Self::merge_tables(&mut merged, table);
      }
    }
    toml::Value::Table(merged)
  }

  fn merge_tables(
    base: &mut toml::map::Map<String, toml::Value>,
    overlay: &toml::map::Map<String, toml::Value>,
  ) {
    for (key, value) in overlay {
      if let (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) =
        (base.get_mut(key), value)
      {
        Self::merge_tables(existing, incoming);
        continue;
      }
      base.insert(key.clone(), value.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn layer(source: ConfigLayerSource, text: &str) -> ConfigLayer {
    ConfigLayer {
      source,
      values: toml::Value::Table(text.parse::<toml::Table>().expect("parse layer")),
    }
  }

  #[test]
  fn nested_tables_merge_and_arrays_replace() {
    let mut layered = LayeredConfig::new();
    layered.add_layer(layer(
      ConfigLayerSource::Default,
      r#"
        [ai.transport]
        idle_timeout_secs = 30
        request_timeout_secs = 300
        [logging]
        stops = ["a", "b"]
      "#,
    ));
    layered.add_layer(layer(
      ConfigLayerSource::GlobalConfig,
      r#"
        [ai.transport]
        idle_timeout_secs = 5
        [logging]
        stops = ["c"]
      "#,
    ));

    let merged = layered.merge();
    assert_eq!(merged["ai"]["transport"]["idle_timeout_secs"].as_integer(), Some(5));
    assert_eq!(merged["ai"]["transport"]["request_timeout_secs"].as_integer(), Some(300));
    assert_eq!(merged["logging"]["stops"].as_array().map(Vec::len), Some(1));
  }

  #[test]
  fn dotted_override_builds_nested_table() {
    let mut layered = LayeredConfig::new();
    layered.add_override("ai.default_model", toml::Value::String("ollama/qwen3".to_string()));

    let merged = layered.merge();
    assert_eq!(merged["ai"]["default_model"].as_str(), Some("ollama/qwen3"));
    assert_eq!(layered.sources(), vec![ConfigLayerSource::CliOverride]);
  }
}
