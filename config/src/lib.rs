// Solace Configuration System
// Provider catalog and layered configuration management

pub mod catalog;
pub mod defaults;
pub mod error;
pub mod layered;
pub mod loader;
pub mod types;

pub use catalog::{
  Model, ModelPricing, Provider, ProviderCapabilities, RateLimitConfig, ReasoningFormat,
  SamplingDefaults,
};
pub use error::{ConfigError, Result};
pub use layered::{ConfigLayer, ConfigLayerSource, LayeredConfig};
pub use loader::{ConfigLoader, parse_override};
pub use types::*;
