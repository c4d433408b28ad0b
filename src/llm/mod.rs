//! LLM integration module for a local Ollama server
//! Used by the model-based sentiment strategy

pub mod sanitize;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::completion::request::GenerationRequest, generation::options::GenerationOptions,
    generation::parameters::FormatType, Ollama,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use url::Url;

/// LLM response with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
}

/// LLM client configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub ollama_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub temperature: f32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_seconds: 30,
            max_retries: 1,
            temperature: 0.1,
        }
    }
}

/// Something that turns a prompt into a JSON-formatted completion
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_json_text(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// LLM client with local Ollama integration
#[derive(Debug, Clone)]
pub struct LLMClient {
    ollama: Ollama,
    config: LLMConfig,
}

impl LLMClient {
    /// Create new LLM client with configuration. Does not contact the server.
    pub fn new(config: LLMConfig) -> Result<Self> {
        let parsed_url = Url::parse(&config.ollama_url).context("Invalid Ollama URL")?;

        let host = parsed_url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("No host in Ollama URL"))?;
        let port = parsed_url.port().unwrap_or(11434);

        let ollama = Ollama::new(format!("{}://{}", parsed_url.scheme(), host), port);

        Ok(Self { ollama, config })
    }

    /// Create client from config::LlmConfig
    pub fn from_config(config: &crate::config::LlmConfig) -> Result<Self> {
        Self::new(LLMConfig {
            ollama_url: config.ollama_url.clone(),
            model: config.model.clone(),
            timeout_seconds: config.timeout_seconds,
            ..LLMConfig::default()
        })
    }

    /// Log whether the server is reachable and has the configured model
    pub async fn check_connection(&self) -> bool {
        info!("Testing Ollama connectivity at {}", self.config.ollama_url);

        match timeout(Duration::from_secs(3), self.ollama.list_local_models()).await {
            Ok(Ok(models)) => {
                let model_available = models.iter().any(|m| m.name.contains(&self.config.model));
                if model_available {
                    info!("Ollama connected successfully at {}", self.config.ollama_url);
                } else {
                    warn!(
                        "Model '{}' not found in available models. Consider pulling it with: ollama pull {}",
                        self.config.model, self.config.model
                    );
                }
                true
            }
            Ok(Err(e)) => {
                warn!("Could not connect to Ollama at {}. Is it running? Error: {}", self.config.ollama_url, e);
                false
            }
            Err(_) => {
                warn!("Timeout connecting to Ollama at {}", self.config.ollama_url);
                false
            }
        }
    }

    /// Generate text with the configured model, JSON format and low temperature
    pub async fn generate(&self, prompt: &str) -> Result<LLMResponse> {
        info!(
            "Generating text with model '{}' (prompt length: {} chars)",
            self.config.model,
            prompt.len()
        );

        let request = GenerationRequest::new(self.config.model.clone(), prompt.to_string())
            .options(GenerationOptions::default().temperature(self.config.temperature))
            .format(FormatType::Json);

        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match timeout(
                Duration::from_secs(self.config.timeout_seconds),
                self.ollama.generate(request.clone()),
            )
            .await
            {
                Ok(Ok(response)) => {
                    info!(
                        "Generated {} chars with model '{}'",
                        response.response.len(),
                        self.config.model
                    );
                    return Ok(LLMResponse {
                        content: response.response,
                        model: self.config.model.clone(),
                    });
                }
                Ok(Err(e)) => {
                    error!("Ollama API error on attempt {}: {}", attempt, e);
                    last_error = Some(anyhow::anyhow!("Ollama API error: {}", e));
                }
                Err(_) => {
                    error!(
                        "Timeout on attempt {} after {} seconds",
                        attempt, self.config.timeout_seconds
                    );
                    last_error = Some(anyhow::anyhow!(
                        "Request timeout after {} seconds",
                        self.config.timeout_seconds
                    ));
                }
            }

            if attempt < attempts {
                let backoff_seconds = 2_u64.pow(attempt - 1);
                warn!("Retrying in {} seconds (attempt {}/{})", backoff_seconds, attempt, attempts);
                tokio::time::sleep(Duration::from_secs(backoff_seconds)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Failed to generate text after {} attempts", attempts)))
    }
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn generate_json_text(&self, prompt: &str) -> Result<String> {
        Ok(self.generate(prompt).await?.content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Parse a model completion as JSON.
///
/// Tries the whole text, then a fenced code block, then the first
/// brace-balanced object.
pub fn parse_json_response(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }

    if let Some(block) = extract_fenced_block(text) {
        if let Ok(value) = serde_json::from_str(&block) {
            return Some(value);
        }
    }

    extract_braced_object(text).and_then(|object| serde_json::from_str(&object).ok())
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let end = after.find("```")?;
    let block = &after[..end];
    let block = block.strip_prefix("json").unwrap_or(block);
    Some(block.trim().to_string())
}

fn extract_braced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut brace_count = 0;

    for (i, c) in text[start..].char_indices() {
        match c {
            '{' => brace_count += 1,
            '}' => {
                brace_count -= 1;
                if brace_count == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_direct_json() {
        let value = parse_json_response(r#"{"score": 0.5, "reasoning": "calls"}"#).unwrap();
        assert_eq!(value["score"], json!(0.5));
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Here you go:\n```json\n{\"score\": -0.3}\n```\nHope that helps";
        assert_eq!(parse_json_response(text).unwrap()["score"], json!(-0.3));

        let plain_fence = "```\n{\"score\": 0.1}\n```";
        assert_eq!(parse_json_response(plain_fence).unwrap()["score"], json!(0.1));
    }

    #[test]
    fn test_parse_embedded_object() {
        let text = r#"Sure! {"score": 0.8, "reasoning": "tendies {soon}"} trailing words"#;
        let value = parse_json_response(text).unwrap();
        assert_eq!(value["score"], json!(0.8));
        assert_eq!(value["reasoning"], json!("tendies {soon}"));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_json_response("This is not JSON at all").is_none());
        assert!(parse_json_response("{ unterminated").is_none());
    }

    #[test]
    fn test_client_from_config() {
        let client = LLMClient::from_config(&crate::config::LlmConfig {
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_seconds: 5,
        })
        .unwrap();
        assert_eq!(client.model_name(), "llama3");
        assert!(LLMClient::new(LLMConfig {
            ollama_url: "not a url".to_string(),
            ..LLMConfig::default()
        })
        .is_err());
    }

    #[tokio::test]
    #[ignore] // Requires running Ollama
    async fn test_ollama_integration() {
        let client = LLMClient::new(LLMConfig::default()).unwrap();
        if client.check_connection().await {
            let response = client.generate(r#"Respond with {"ok": true}"#).await.unwrap();
            assert!(parse_json_response(&response.content).is_some());
        }
    }
}
