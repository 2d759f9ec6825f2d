use anyhow::{bail, Result};

use super::client::{LlmClient, MockLlmClient};
use super::client_impl::{OllamaClient, OpenAIClient};
use crate::config::Config;

/// Create an LLM client based on configuration
pub fn create_client(config: &Config, dry_run: bool) -> Result<Box<dyn LlmClient>> {
    if dry_run {
        return Ok(Box::new(MockLlmClient::new()));
    }

    let llm = &config.llm;
    let max_tokens = llm.get_max_tokens();

    match llm.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaClient::new(
            llm.get_base_url(),
            llm.model.clone(),
            llm.temperature,
            max_tokens,
            llm.timeout_secs,
        )?)),

        "openai-compatible" => Ok(Box::new(OpenAIClient::new(
            llm.get_api_key(),
            llm.model.clone(),
            llm.get_base_url(),
            llm.temperature,
            max_tokens,
            llm.timeout_secs,
        )?)),

        unknown => bail!("Unknown LLM provider: {}", unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_mock_client_for_dry_run() {
        let mut config = Config::default();
        config.llm.provider = "does-not-matter".to_string();
        let client = create_client(&config, true).unwrap();
        assert!(client.is_available().await);
    }

    #[test]
    fn test_create_ollama_client() {
        let config = Config::default();
        assert!(create_client(&config, false).is_ok());
    }

    #[test]
    fn test_create_openai_compatible_client() {
        let mut config = Config::default();
        config.llm.provider = "openai-compatible".to_string();
        config.llm.base_url = Some("http://localhost:8080/v1".to_string());
        assert!(create_client(&config, false).is_ok());
    }

    #[test]
    fn test_create_client_with_unknown_provider() {
        let mut config = Config::default();
        config.llm.provider = "unknown_provider".to_string();
        let result = create_client(&config, false);
        match result {
            Err(e) => assert!(e.to_string().contains("Unknown LLM provider")),
            Ok(_) => panic!("expected unknown provider to be rejected"),
        }
    }
}
