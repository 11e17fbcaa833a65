//! Provider Registry
//!
//! In-memory view of the provider/model catalog, synchronized from
//! configuration. The registry never performs I/O.

use std::collections::{HashMap, HashSet};

use solace_config::{AiConfig, Model, Provider, ReasoningFormat};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ModelError, Result};

/// A model together with the provider that serves it.
///
/// Snapshot taken at resolution time; later catalog changes do not affect a
/// request already in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
  pub provider: Provider,
  pub model: Model,
}

impl ResolvedModel {
  /// `provider/model` form of the id
  pub fn qualified_id(&self) -> String {
    format!("{}/{}", self.provider.id, self.model.id)
  }

  pub fn supports_streaming(&self) -> bool {
    self.model.supports_streaming && self.provider.capabilities.streaming
  }

  pub fn supports_tool_calling(&self) -> bool {
    self.model.supports_tool_calling && self.provider.capabilities.tool_calling
  }

  pub fn supports_vision(&self) -> bool {
    self.model.supports_vision && self.provider.capabilities.vision
  }

  pub fn reasoning_format(&self) -> ReasoningFormat {
    self.model.effective_reasoning_format()
  }
}

#[derive(Debug, Default)]
struct Catalog {
  providers: Vec<Provider>,
  models: Vec<Model>,
  selected_default: Option<String>,
}

impl Catalog {
  fn enabled_provider(&self, provider_id: &str) -> Option<&Provider> {
    self
      .providers
      .iter()
      .find(|provider| provider.id == provider_id && provider.enabled)
  }

  fn resolve(&self, model_id: &str) -> Option<ResolvedModel> {
    let bare = self.models.iter().find_map(|model| {
      (model.id == model_id)
        .then(|| self.enabled_provider(&model.provider_id))
        .flatten()
        .map(|provider| (provider, model))
    });

    let qualified = || {
      let (provider_id, id) = model_id.split_once('/')?;
      let provider = self.enabled_provider(provider_id)?;
      let model = self
        .models
        .iter()
        .find(|model| model.provider_id == provider_id && model.id == id)?;
      Some((provider, model))
    };

    bare.or_else(qualified).map(|(provider, model)| ResolvedModel {
      provider: provider.clone(),
      model: model.clone(),
    })
  }
}

/// Provider Registry
///
/// Holds the catalog of providers and models plus the user's selected
/// default model.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
  catalog: RwLock<Catalog>,
}

impl ProviderRegistry {
  /// Create an empty registry
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a registry populated from configuration
  pub fn from_config(config: &AiConfig) -> Result<Self> {
    validate(&config.providers, &config.models)?;
    Ok(Self {
      catalog: RwLock::new(Catalog {
        providers: config.providers.clone(),
        models: config.models.clone(),
        selected_default: config.default_model.clone(),
      }),
    })
  }

  /// Replace the catalog with the one in `config`
  pub async fn sync(&self, config: &AiConfig) -> Result<()> {
    validate(&config.providers, &config.models)?;
    let mut catalog = self.catalog.write().await;
    catalog.providers = config.providers.clone();
    catalog.models = config.models.clone();
    catalog.selected_default = config.default_model.clone();
    debug!(
      providers = catalog.providers.len(),
      models = catalog.models.len(),
      "provider registry synchronized"
    );
    Ok(())
  }

  /// Enabled providers in catalog order
  pub async fn list_enabled_providers(&self) -> Vec<Provider> {
    self
      .catalog
      .read()
      .await
      .providers
      .iter()
      .filter(|provider| provider.enabled)
      .cloned()
      .collect()
  }

  /// Models of an enabled provider; empty for unknown or disabled providers
  pub async fn list_enabled_models(&self, provider_id: &str) -> Vec<Model> {
    let catalog = self.catalog.read().await;
    if catalog.enabled_provider(provider_id).is_none() {
      return Vec::new();
    }
    catalog
      .models
      .iter()
      .filter(|model| model.provider_id == provider_id)
      .cloned()
      .collect()
  }

  /// Look up any provider, enabled or not
  pub async fn provider(&self, provider_id: &str) -> Option<Provider> {
    self
      .catalog
      .read()
      .await
      .providers
      .iter()
      .find(|provider| provider.id == provider_id)
      .cloned()
  }

  /// Resolve a bare (`gpt-4o`) or qualified (`openai/gpt-4o`) model id
  pub async fn resolve_model(&self, model_id: &str) -> Result<ResolvedModel> {
    self
      .catalog
      .read()
      .await
      .resolve(model_id)
      .ok_or_else(|| ModelError::UnknownModel(model_id.to_string()))
  }

  /// The user's selected model if it resolves, else the first enabled
  /// provider's default model, else the first enabled model
  pub async fn default_model(&self) -> Result<ResolvedModel> {
    let catalog = self.catalog.read().await;

    if let Some(selected) = &catalog.selected_default {
      match catalog.resolve(selected) {
        Some(resolved) => return Ok(resolved),
        None => debug!(model = %selected, "selected default model is unavailable"),
      }
    }

    let enabled: Vec<&Provider> = catalog.providers.iter().filter(|p| p.enabled).collect();
    let pick = |wanted_default: bool| {
      enabled.iter().find_map(|provider| {
        catalog
          .models
          .iter()
          .find(|model| model.provider_id == provider.id && (!wanted_default || model.is_default))
          .map(|model| ResolvedModel {
            provider: (*provider).clone(),
            model: model.clone(),
          })
      })
    };

    pick(true)
      .or_else(|| pick(false))
      .ok_or_else(|| ModelError::UnknownModel("no enabled model".to_string()))
  }

  /// Select the default model; the id must resolve
  pub async fn set_default_model(&self, model_id: &str) -> Result<ResolvedModel> {
    let mut catalog = self.catalog.write().await;
    let resolved = catalog
      .resolve(model_id)
      .ok_or_else(|| ModelError::UnknownModel(model_id.to_string()))?;
    catalog.selected_default = Some(resolved.qualified_id());
    Ok(resolved)
  }

  /// Adds models reported by a provider's model-list endpoint.
  ///
  /// Discovered models inherit the provider's capability flags. Ids already
  /// in the catalog keep their configured record. Returns how many models
  /// were added.
  pub async fn merge_discovered_models(
    &self,
    provider_id: &str,
    model_ids: Vec<String>,
  ) -> Result<usize> {
    let mut catalog = self.catalog.write().await;
    let provider = catalog
      .providers
      .iter()
      .find(|provider| provider.id == provider_id)
      .cloned()
      .ok_or_else(|| ModelError::ProviderNotFound(provider_id.to_string()))?;

    let known: HashSet<String> = catalog
      .models
      .iter()
      .filter(|model| model.provider_id == provider_id)
      .map(|model| model.id.clone())
      .collect();

    let mut added = 0;
    let mut seen = HashSet::new();
    for id in model_ids {
      if id.is_empty() || known.contains(&id) || !seen.insert(id.clone()) {
        continue;
      }
      catalog.models.push(Model {
        supports_streaming: provider.capabilities.streaming,
        supports_tool_calling: provider.capabilities.tool_calling,
        supports_vision: provider.capabilities.vision,
        ..Model::new(provider_id, id)
      });
      added += 1;
    }

    debug!(provider = provider_id, added, "merged discovered models");
    Ok(added)
  }
}

fn validate(providers: &[Provider], models: &[Model]) -> Result<()> {
  let mut provider_ids = HashSet::new();
  for provider in providers {
    if provider.id.is_empty() || provider.id.contains('/') {
      return Err(ModelError::InvalidCatalog(format!(
        "invalid provider id {:?}",
        provider.id
      )));
    }
    if !provider_ids.insert(provider.id.as_str()) {
      return Err(ModelError::InvalidCatalog(format!(
        "duplicate provider {}",
        provider.id
      )));
    }
  }

  let mut model_keys = HashSet::new();
  let mut defaults: HashMap<&str, &str> = HashMap::new();
  for model in models {
    if !provider_ids.contains(model.provider_id.as_str()) {
      return Err(ModelError::InvalidCatalog(format!(
        "model {} references unknown provider {}",
        model.id, model.provider_id
      )));
    }
    if !model_keys.insert((model.provider_id.as_str(), model.id.as_str())) {
      return Err(ModelError::InvalidCatalog(format!(
        "duplicate model {}/{}",
        model.provider_id, model.id
      )));
    }
    if !model.is_default {
      continue;
    }
    if let Some(existing) = defaults.insert(&model.provider_id, &model.id) {
      return Err(ModelError::InvalidCatalog(format!(
        "provider {} has two default models: {existing} and {}",
        model.provider_id, model.id
      )));
    }
  }
  Ok(())
}
