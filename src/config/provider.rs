// Provider entry: which LLM backend drives generation and review.

use serde::{Deserialize, Serialize};

/// A single provider entry.
///
/// Serializes with a `type` tag, e.g.:
/// ```toml
/// [provider]
/// type = "openai"
/// api_key = "sk-..."
/// model = "gpt-4o"
/// review_model = "gpt-4o-mini"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderEntry {
    Openai {
        api_key: String,
        /// Model for generate/fix (provider default when absent)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Model for review and persistence detection (falls back to `model`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        review_model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    Claude {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        review_model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
}

impl ProviderEntry {
    /// Short provider-type tag ("openai" or "claude").
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::Openai { .. } => "openai",
            Self::Claude { .. } => "claude",
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            Self::Openai { api_key, .. } | Self::Claude { api_key, .. } => api_key,
        }
    }

    /// Environment variable that overrides the api key for this provider type.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Openai { .. } => "OPENAI_API_KEY",
            Self::Claude { .. } => "ANTHROPIC_API_KEY",
        }
    }

    pub fn set_api_key(&mut self, key: String) {
        match self {
            Self::Openai { api_key, .. } | Self::Claude { api_key, .. } => *api_key = key,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Openai { model, .. } | Self::Claude { model, .. } => model.as_deref(),
        }
    }

    /// Model used for review calls; falls back to the generation model.
    pub fn review_model(&self) -> Option<&str> {
        match self {
            Self::Openai { review_model, .. } | Self::Claude { review_model, .. } => {
                review_model.as_deref().or_else(|| self.model())
            }
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        match self {
            Self::Openai { base_url, .. } | Self::Claude { base_url, .. } => base_url.as_deref(),
        }
    }
}
