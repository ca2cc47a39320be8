pub mod providers;
pub mod retry;

use tracing::debug;

use meshwork_core::config::ModelConfig;
use meshwork_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    // DeepSeek, Together, vLLM, Ollama and friends all speak the
    // OpenAI chat-completions dialect.
    debug!(provider = %config.provider, model = %config.model_id, "Creating LLM client");
    Box::new(OpenAiClient::new())
}

/// Primary client wrapped with retries and the configured fallbacks.
pub fn create_retrying_client(
    primary: &ModelConfig,
    fallbacks: &[ModelConfig],
) -> RetryingClient {
    let fallbacks = fallbacks
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();
    RetryingClient::new(
        create_client(primary),
        fallbacks,
        primary.retry.clone().unwrap_or_default(),
    )
}
