//! # Model and Supplier Configuration
//!
//! Static mapping from model name to its dispatch profile (supplier, token
//! budget, concurrency limit) and from supplier name to its endpoint.
//!
//! The registry is an injected value resolved once at batch start: an unknown
//! model rejects the whole job before any worker is spawned, never mid-run.
//! It can be deserialized from TOML or constructed programmatically; the
//! [`Default`] table covers a set of common OpenAI-compatible backends.
//!
//! ```toml
//! [suppliers.deepseek]
//! base_url = "https://api.deepseek.com/v1"
//! api_key = "sk-..."
//!
//! [models.deepseek-chat]
//! supplier = "deepseek"
//! max_tokens = 4096
//! max_concurrent = 100
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ConfigError;

/// Dispatch profile for one model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelProfile {
    /// Supplier key resolving to the backend endpoint.
    pub supplier: String,
    /// Token budget per request; doubles as the chunker's maximum length.
    pub max_tokens: usize,
    /// Upper bound on simultaneously in-flight chunk workers.
    pub max_concurrent: usize,
}

/// Endpoint coordinates for one OpenAI-compatible supplier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SupplierProfile {
    /// Base URL of the chat-completion API.
    pub base_url: String,
    /// API key; empty for local backends that need none.
    #[serde(default)]
    pub api_key: String,
}

/// Registry of model and supplier profiles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelRegistry {
    #[serde(default)]
    models: HashMap<String, ModelProfile>,
    #[serde(default)]
    suppliers: HashMap<String, SupplierProfile>,
}

impl ModelRegistry {
    /// Builds a registry from explicit tables, validating every profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidProfile`] for a zero token budget or a
    /// zero concurrency limit, and [`ConfigError::UnknownSupplier`] for a
    /// model referencing a supplier with no profile.
    pub fn new(
        models: HashMap<String, ModelProfile>,
        suppliers: HashMap<String, SupplierProfile>,
    ) -> Result<Self, ConfigError> {
        let registry = Self { models, suppliers };
        registry.validate()?;
        Ok(registry)
    }

    /// Parses and validates a registry from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] for invalid TOML, plus the same
    /// validation errors as [`ModelRegistry::new`].
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let registry: Self =
            toml::from_str(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    /// Resolves a model name to its dispatch profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownModel`] when no profile exists. Callers
    /// resolve this at batch start so the failure precedes any dispatch.
    pub fn lookup(&self, model: &str) -> Result<&ModelProfile, ConfigError> {
        self.models
            .get(model)
            .ok_or_else(|| ConfigError::UnknownModel(model.to_string()))
    }

    /// Resolves a supplier name to its endpoint profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSupplier`] when no profile exists.
    pub fn supplier(&self, name: &str) -> Result<&SupplierProfile, ConfigError> {
        self.suppliers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownSupplier(name.to_string()))
    }

    /// Model names known to this registry.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, profile) in &self.models {
            if profile.max_concurrent == 0 {
                return Err(ConfigError::InvalidProfile {
                    model: name.clone(),
                    reason: "max_concurrent must be greater than zero".to_string(),
                });
            }
            if profile.max_tokens == 0 {
                return Err(ConfigError::InvalidProfile {
                    model: name.clone(),
                    reason: "max_tokens must be greater than zero".to_string(),
                });
            }
            if !self.suppliers.contains_key(&profile.supplier) {
                return Err(ConfigError::UnknownSupplier(profile.supplier.clone()));
            }
        }
        Ok(())
    }
}

impl Default for ModelRegistry {
    /// Registry seeded with a set of common OpenAI-compatible backends.
    ///
    /// API keys are left empty; an embedding application fills them in from
    /// its own secret store before handing the registry to a client.
    fn default() -> Self {
        let suppliers = HashMap::from([
            (
                "zhipuai".to_string(),
                SupplierProfile {
                    base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
                    api_key: String::new(),
                },
            ),
            (
                "aliai".to_string(),
                SupplierProfile {
                    base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
                    api_key: String::new(),
                },
            ),
            (
                "kimiai".to_string(),
                SupplierProfile {
                    base_url: "https://api.moonshot.cn/v1".to_string(),
                    api_key: String::new(),
                },
            ),
            (
                "deepseek".to_string(),
                SupplierProfile {
                    base_url: "https://api.deepseek.com/v1".to_string(),
                    api_key: String::new(),
                },
            ),
        ]);

        let models = HashMap::from([
            (
                "glm-4.5".to_string(),
                ModelProfile {
                    supplier: "zhipuai".to_string(),
                    max_tokens: 8192,
                    max_concurrent: 10,
                },
            ),
            (
                "qwen3-max".to_string(),
                ModelProfile {
                    supplier: "aliai".to_string(),
                    max_tokens: 8192,
                    max_concurrent: 10,
                },
            ),
            (
                "kimi-k2-0905-preview".to_string(),
                ModelProfile {
                    supplier: "kimiai".to_string(),
                    max_tokens: 8192,
                    max_concurrent: 10,
                },
            ),
            (
                "deepseek-chat".to_string(),
                ModelProfile {
                    supplier: "deepseek".to_string(),
                    max_tokens: 4096,
                    max_concurrent: 100,
                },
            ),
            (
                "deepseek-reasoner".to_string(),
                ModelProfile {
                    supplier: "deepseek".to_string(),
                    max_tokens: 8192,
                    max_concurrent: 100,
                },
            ),
        ]);

        Self { models, suppliers }
    }
}
