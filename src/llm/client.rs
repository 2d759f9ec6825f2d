use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::prompts;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Cheap health check, consulted once before a run starts.
    async fn is_available(&self) -> bool;
}

/// Offline client used for `--dry-run` and tests.
///
/// Answers by looking for the task marker each prompt template starts with.
/// Individual markers can be overridden or made to fail.
pub struct MockLlmClient {
    overrides: BTreeMap<String, String>,
    failing: Vec<String>,
    available: bool,
    calls: AtomicUsize,
    prompts_seen: Mutex<Vec<String>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            overrides: BTreeMap::new(),
            failing: Vec::new(),
            available: true,
            calls: AtomicUsize::new(0),
            prompts_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, marker: &str, response: impl Into<String>) -> Self {
        self.overrides.insert(marker.to_string(), response.into());
        self
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failing.push(marker.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Number of `complete` calls so far (health checks are not counted).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts_seen
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.prompts_seen.lock() {
            seen.push(prompt.to_string());
        }

        if let Some(marker) = self.failing.iter().find(|m| prompt.contains(m.as_str())) {
            bail!("mock inference failure for {}", marker);
        }
        if let Some((_, response)) = self
            .overrides
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
        {
            return Ok(response.clone());
        }

        if prompt.contains(prompts::ARCHITECTURE_MARKER) {
            Ok(r#"{
  "summary": "Monolithic web application with models, views and a thin service layer.",
  "components": ["web", "models", "services"],
  "concerns": ["business logic mixed into request handlers"]
}"#
            .to_string())
        } else if prompt.contains(prompts::MATURITY_MARKER) {
            Ok(r#"```json
{
  "maturity": "legacy",
  "opportunities": ["Adopt async request handling", "Introduce typed request models"]
}
```"#
                .to_string())
        } else if prompt.contains(prompts::MIGRATION_MARKER) {
            Ok(r#"{
  "breaking_changes": [
    {"area": "routing", "description": "Route decorators change signature", "mitigation": "Port handlers module by module"}
  ],
  "recommendations": ["Write characterization tests before porting handlers"]
}"#
            .to_string())
        } else if prompt.contains(prompts::CODEGEN_MARKER) {
            Ok(r#"Here are the files:
{
  "files": [
    {"path": "backend/app/routers/health.py", "content": "from fastapi import APIRouter\n\nrouter = APIRouter()\n\n\n@router.get(\"/health\")\ndef health():\n    return {\"status\": \"ok\"}\n", "description": "Health check endpoint"}
  ]
}"#
            .to_string())
        } else if prompt.contains(prompts::DOCUMENTATION_MARKER) {
            let sections: Vec<serde_json::Value> = prompts::DOCUMENT_TITLES
                .iter()
                .map(|title| {
                    serde_json::json!({
                        "title": title,
                        "content": format!("## {}\n\nGenerated offline.", title),
                    })
                })
                .collect();
            Ok(serde_json::json!({ "sections": sections }).to_string())
        } else {
            Ok(r#"{"status": "mock"}"#.to_string())
        }
    }

    async fn is_available(&self) -> bool {
        self.available
    }
}
