use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use tracing::{info, warn};

use meshwork_core::config::{ModelConfig, RetryConfig};
use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::traits::LlmClient;
use meshwork_core::types::ChatMessage;

/// An LLM client that retries failed requests and falls back to alternative providers.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

/// HTTP statuses and transport failures worth another attempt.
const TRANSIENT_MARKERS: &[&str] = &["429", "500", "502", "503", "timeout", "connection"];

fn is_transient(e: &MeshworkError) -> bool {
    match e {
        MeshworkError::LlmRequest(msg) => TRANSIENT_MARKERS.iter().any(|m| msg.contains(m)),
        MeshworkError::LlmParse(_) => true,
        _ => false,
    }
}

impl RetryingClient {
    /// Exponential delay before retry `attempt + 1`, capped, with +/-20% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let cfg = &self.retry_config;
        let base = cfg
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(32))
            .min(cfg.max_backoff_ms);
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        Duration::from_millis((base as f64 * jitter) as u64)
    }

    async fn call_primary(&self, config: &ModelConfig, messages: &[ChatMessage]) -> Result<String> {
        let max_retries = self.retry_config.max_retries;
        let mut attempt = 0;
        loop {
            match self.primary.chat(config, messages.to_vec()).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < max_retries && is_transient(&e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        model = %config.model_id,
                        attempt = attempt + 1,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient LLM failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl LlmClient for RetryingClient {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let err = match self.call_primary(&config, &messages).await {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            // fallbacks get one attempt each
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client.chat(fb_config, messages.clone()).await {
                    Ok(text) => {
                        info!(from = %config.model_id, to = %fb_config.model_id, "Answered by fallback model");
                        return Ok(text);
                    }
                    Err(fb_err) => {
                        warn!(model = %fb_config.model_id, error = %fb_err, "Fallback model failed");
                    }
                }
            }
            Err(err)
        })
    }
}
