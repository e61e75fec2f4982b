use crate::answer::{
    AnthropicClient, ModelPricing, DEFAULT_ANTHROPIC_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
};
use crate::error::ConfigError;
use std::path::PathBuf;

pub const API_KEY_VARIABLE: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_PERSIST_DIR: &str = "./index_db";
pub const DEFAULT_COLLECTION: &str = "docs";

/// Settings for the question-answering side, checked once at startup.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub persist_dir: PathBuf,
    pub collection: String,
    pub api_key: String,
    pub model: String,
    pub anthropic_url: String,
    pub max_tokens: u32,
    pub top_k: usize,
    pub temperature: f32,
    pub pricing: ModelPricing,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            collection: DEFAULT_COLLECTION.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            anthropic_url: DEFAULT_ANTHROPIC_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            top_k: 5,
            temperature: 0.3,
            pricing: ModelPricing::default(),
        }
    }
}

impl AssistantConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredentials {
                variable: API_KEY_VARIABLE.to_string(),
            });
        }
        if self.collection.trim().is_empty() {
            return Err(invalid("collection", "must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("model", "must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", "must be greater than zero"));
        }
        if self.top_k == 0 {
            return Err(invalid("top_k", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(invalid(
                "temperature",
                &format!("{} is outside 0.0..=1.0", self.temperature),
            ));
        }
        if self.pricing.input_per_million < 0.0 || self.pricing.output_per_million < 0.0 {
            return Err(invalid("pricing", "rates must not be negative"));
        }
        Ok(())
    }

    pub fn generator(&self) -> AnthropicClient {
        AnthropicClient::new(&self.api_key, &self.model).with_base_url(&self.anthropic_url)
    }
}

fn invalid(name: &str, details: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        name: name.to_string(),
        details: details.to_string(),
    }
}
