use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::MissingCapabilityError;
use crate::llm::LlmClient;
use crate::parsers::ParserRegistry;
use crate::repository::RepositoryProvider;

/// External collaborators an agent may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Repository,
    Parsers,
    Inference,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Repository => write!(f, "repository"),
            CapabilityKind::Parsers => write!(f, "parsers"),
            CapabilityKind::Inference => write!(f, "inference"),
        }
    }
}

/// One typed slot per capability kind; an implementation can only be
/// registered under the interface it satisfies.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    repository: Option<Arc<dyn RepositoryProvider>>,
    parsers: Option<Arc<ParserRegistry>>,
    inference: Option<Arc<dyn LlmClient>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(mut self, provider: Arc<dyn RepositoryProvider>) -> Self {
        self.repository = Some(provider);
        self
    }

    pub fn with_parsers(mut self, parsers: Arc<ParserRegistry>) -> Self {
        self.parsers = Some(parsers);
        self
    }

    pub fn with_inference(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.inference = Some(client);
        self
    }

    pub fn has(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::Repository => self.repository.is_some(),
            CapabilityKind::Parsers => self.parsers.is_some(),
            CapabilityKind::Inference => self.inference.is_some(),
        }
    }

    /// First capability in `required` that is not registered, as an error.
    pub fn check(
        &self,
        agent: &str,
        required: &[CapabilityKind],
    ) -> Result<(), MissingCapabilityError> {
        match required.iter().find(|k| !self.has(**k)) {
            Some(kind) => Err(missing(agent, *kind)),
            None => Ok(()),
        }
    }

    pub fn repository(
        &self,
        agent: &str,
    ) -> Result<Arc<dyn RepositoryProvider>, MissingCapabilityError> {
        self.repository
            .clone()
            .ok_or_else(|| missing(agent, CapabilityKind::Repository))
    }

    pub fn parsers(&self, agent: &str) -> Result<Arc<ParserRegistry>, MissingCapabilityError> {
        self.parsers
            .clone()
            .ok_or_else(|| missing(agent, CapabilityKind::Parsers))
    }

    pub fn inference(&self, agent: &str) -> Result<Arc<dyn LlmClient>, MissingCapabilityError> {
        self.inference
            .clone()
            .ok_or_else(|| missing(agent, CapabilityKind::Inference))
    }
}

fn missing(agent: &str, kind: CapabilityKind) -> MissingCapabilityError {
    MissingCapabilityError {
        agent: agent.to_string(),
        capability: kind.to_string(),
    }
}
