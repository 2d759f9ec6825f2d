use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::client::LlmClient;
use crate::util::SecretString;

// ============================================================================
// Ollama Client
// ============================================================================

pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

impl OllamaClient {
    pub fn new(
        base_url: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
            max_tokens,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .context("failed to build HTTP client")?,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        debug!("Calling Ollama at {} with model: {}", self.base_url, self.model);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("Ollama error {}: {}", status, error_text);
        }

        let api_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(api_response.response)
    }

    async fn is_available(&self) -> bool {
        let response = match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Ollama health check returned {}", r.status());
                return false;
            }
            Err(e) => {
                debug!("Ollama health check failed: {}", e);
                return false;
            }
        };

        // A reachable server without the model still answers with a 404 on
        // generate, so only warn here and let the first call report it.
        if let Ok(tags) = response.json::<OllamaTags>().await {
            let wanted = self.model.as_str();
            let present = tags
                .models
                .iter()
                .any(|m| m.name == wanted || m.name.split(':').next() == Some(wanted));
            if !present {
                warn!(
                    "Model '{}' not listed by Ollama; pull it with `ollama pull {}`",
                    self.model, self.model
                );
            }
        }
        true
    }
}

// ============================================================================
// OpenAI-compatible Client
// ============================================================================

pub struct OpenAIClient {
    api_key: SecretString,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl OpenAIClient {
    pub fn new(
        api_key: SecretString,
        model: String,
        base_url: String,
        temperature: f32,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
            max_tokens,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .context("failed to build HTTP client")?,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.api_key.expose();
        // Local servers usually take no key
        if key.is_empty() || key.eq_ignore_ascii_case("none") {
            req
        } else {
            req.header("authorization", format!("Bearer {}", key))
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            "Calling OpenAI-compatible API at {} with model: {}",
            self.base_url, self.model
        );

        let req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .json(&request);

        let response = self
            .authorize(req)
            .send()
            .await
            .context("Failed to send request to OpenAI-compatible API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("OpenAI-compatible API error {}: {}", status, error_text);
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI-compatible API response")?;

        api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .context("No choices in OpenAI-compatible response")
    }

    async fn is_available(&self) -> bool {
        let req = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(Duration::from_secs(5));
        match self.authorize(req).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                debug!("OpenAI-compatible health check failed: {}", e);
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_client_trims_base_url() {
        let client = OllamaClient::new(
            "http://localhost:11434/".to_string(),
            "qwen2.5-coder:7b".to_string(),
            0.1,
            2048,
            120,
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.max_tokens, 2048);
    }

    #[test]
    fn test_ollama_request_structure() {
        let request = OllamaRequest {
            model: "qwen2.5-coder:7b".to_string(),
            prompt: "test".to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: 0.1,
                num_predict: 2048,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "qwen2.5-coder:7b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 2048);
        let temp = json["options"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 0.0001);
    }

    #[test]
    fn test_ollama_response_parsing_ignores_extra_fields() {
        let json = r#"{"model": "m", "response": "Hello", "done": true, "eval_count": 5}"#;
        let response: OllamaResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.response, "Hello");
    }

    #[test]
    fn test_openai_request_structure() {
        let request = OpenAIRequest {
            model: "llama3".to_string(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: "test".to_string(),
            }],
            temperature: 0.1,
            max_tokens: 4096,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 4096);
    }

    #[test]
    fn test_openai_response_empty_choices() {
        let response: OpenAIResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(response.choices.is_empty());
    }

    #[test]
    fn test_openai_client_keeps_key_secret() {
        let client = OpenAIClient::new(
            "sk-test".to_string().into(),
            "llama3".to_string(),
            "http://localhost:11434/v1/".to_string(),
            0.1,
            4096,
            120,
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
        assert_eq!(format!("{:?}", client.api_key), "***");
    }
}
