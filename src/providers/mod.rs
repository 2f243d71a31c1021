// LLM provider support
//
// Abstraction over the chat backends that drive generation, review and
// persistence detection. Everything above this layer talks to
// `dyn LlmProvider` and never sees a vendor wire format.

use anyhow::Result;
use async_trait::async_trait;

pub mod types;

// Provider implementations
pub mod claude;
pub mod openai;

pub mod factory;
pub mod json;
pub mod retry;

pub use factory::create_provider;
pub use json::{parse_json_object, strip_markdown_fences};
pub use retry::{ApiStatusError, RetryPolicy};
pub use types::{Message, ProviderRequest, ProviderResponse};

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a message and wait for the complete response
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Provider name ("openai", "claude")
    fn name(&self) -> &str;

    /// Model used when a request leaves `model` empty
    fn default_model(&self) -> &str;
}
