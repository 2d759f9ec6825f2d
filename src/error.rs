//! Error taxonomy for the pipeline core.
//!
//! Collaborator internals (HTTP clients, git, filesystem walking) use `anyhow`
//! and are wrapped into these types at the agent boundary, so callers never see
//! a raw collaborator error without the stage that triggered it.

use thiserror::Error;

/// An agent was asked to run without a collaborator it depends on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{agent} requires capability '{capability}' but none is registered")]
pub struct MissingCapabilityError {
    pub agent: String,
    pub capability: String,
}

/// A collaborator call made on behalf of a stage failed.
#[derive(Debug, Error)]
#[error("stage '{stage}' failed for input [{input_summary}]: {cause}")]
pub struct AgentExecutionError {
    pub stage: String,
    pub input_summary: String,
    #[source]
    pub cause: anyhow::Error,
}

impl AgentExecutionError {
    pub fn new(stage: &str, input_summary: String, cause: anyhow::Error) -> Self {
        Self {
            stage: stage.to_string(),
            input_summary,
            cause,
        }
    }
}

/// Everything that can stop a single agent invocation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    MissingCapability(#[from] MissingCapabilityError),
    #[error(transparent)]
    Execution(#[from] AgentExecutionError),
}

impl AgentError {
    /// Missing capabilities are configuration bugs; retrying cannot help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Execution(_))
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache entry could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("no renderer registered for format '{0}'")]
    MissingRenderer(String),
    #[error("fatal stage '{0}' never produced a result")]
    MissingFatalStage(String),
    #[error("failed to write bundle: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("invalid repository reference '{0}'")]
    InvalidReference(String),
    #[error("repository '{reference}' is unreachable: {reason}")]
    Unreachable { reference: String, reason: String },
    #[error("failed to read repository snapshot: {0}")]
    Snapshot(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to parse {path} as {language}: {reason}")]
pub struct ParseError {
    pub path: String,
    pub language: String,
    pub reason: String,
}

/// Model output did not match the schema the stage expects.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("model response contained no JSON object")]
    NoJson,
    #[error("model response did not match the expected schema: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("model response failed validation: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("inference provider is not available at {endpoint}; start it (e.g. `ollama serve`) or run with --dry-run")]
    InferenceUnavailable { endpoint: String },
    #[error(transparent)]
    MissingCapability(#[from] MissingCapabilityError),
    #[error("invalid pipeline configuration: {0}")]
    Config(String),
}
