//! Agents: the units of work a chain is built from.
//!
//! An agent declares what it needs (capabilities), what it reads (consumed
//! input keys), where its results are cached, and how it fails. The chain
//! handles caching, retries and failure policy; agents only do the work.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use crate::error::{AgentError, AgentExecutionError};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::stage::{StageData, StagePolicy, StageResult};
use crate::util::truncate;

pub mod capability;
pub mod code_generator;
pub mod doc_generator;
pub mod log;
pub mod migration_planner;
pub mod repo_analyzer;
pub mod tech_detector;
pub mod templates;

pub use capability::{CapabilityKind, CapabilityRegistry};
pub use code_generator::CodeGenerator;
pub use doc_generator::DocGenerator;
pub use log::{ExecutionLog, LogEntry};
pub use migration_planner::MigrationPlanner;
pub use repo_analyzer::RepoAnalyzer;
pub use tech_detector::TechDetector;

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    fn cache_category(&self) -> &'static str;

    /// Input keys this agent reads. Everything else is dropped before the
    /// agent sees its input, and only these keys form its cache key.
    fn consumes(&self) -> &'static [&'static str];

    fn required_capabilities(&self) -> &'static [capability::CapabilityKind];

    fn default_policy(&self) -> StagePolicy;

    /// Structurally valid output used when a best-effort run of this agent fails.
    fn placeholder(&self) -> StageData;

    fn log(&self) -> &ExecutionLog;

    async fn execute(
        &self,
        input: &StageData,
        ctx: &PipelineContext,
    ) -> Result<StageData, AgentExecutionError>;

    /// Capability check, then `execute`, logging the invocation either way.
    async fn run(
        &self,
        input: &StageData,
        ctx: &PipelineContext,
    ) -> Result<StageResult, AgentError> {
        ctx.capabilities
            .check(self.name(), self.required_capabilities())?;

        let at = Utc::now();
        let started = Instant::now();
        let outcome = self.execute(input, ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.log().record(LogEntry {
            at,
            input_summary: summarize_input(input),
            output_keys: outcome
                .as_ref()
                .map(|data| data.keys().cloned().collect())
                .unwrap_or_default(),
            duration_ms,
            success: outcome.is_ok(),
        });

        Ok(StageResult::success(self.name(), outcome?))
    }
}

/// Short human-readable description of a stage input for errors and logs.
pub fn summarize_input(input: &StageData) -> String {
    let parts: Vec<String> = input
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, truncate(s, 60)),
            Value::Array(items) => format!("{}=[{} items]", key, items.len()),
            Value::Object(map) => format!("{}={{{} keys}}", key, map.len()),
            other => format!("{}={}", key, other),
        })
        .collect();
    if parts.is_empty() {
        return "(empty input)".to_string();
    }
    truncate(&parts.join(", "), 240)
}

/// Read the consumed part of `input` as a typed view.
pub(crate) fn input_view<T: DeserializeOwned>(
    stage: &str,
    input: &StageData,
) -> Result<T, AgentExecutionError> {
    serde_json::from_value(Value::Object(input.clone())).map_err(|e| {
        AgentExecutionError::new(
            stage,
            summarize_input(input),
            anyhow::anyhow!("malformed stage input: {}", e),
        )
    })
}

/// Serialize a typed output into stage data.
pub(crate) fn output_data<T: Serialize>(
    stage: &str,
    input: &StageData,
    output: &T,
) -> Result<StageData, AgentExecutionError> {
    match serde_json::to_value(output) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentExecutionError::new(
            stage,
            summarize_input(input),
            anyhow::anyhow!("stage output is not an object: {}", other),
        )),
        Err(e) => Err(AgentExecutionError::new(
            stage,
            summarize_input(input),
            e.into(),
        )),
    }
}

/// Wrap a collaborator failure with the stage and its input.
pub(crate) fn execution_error(
    stage: &str,
    input: &StageData,
    cause: impl Into<anyhow::Error>,
) -> AgentExecutionError {
    AgentExecutionError::new(stage, summarize_input(input), cause.into())
}

/// Placeholder built from a default-valued output type.
pub(crate) fn default_data<T: Serialize + Default>() -> StageData {
    match serde_json::to_value(T::default()) {
        Ok(Value::Object(map)) => map,
        _ => StageData::new(),
    }
}
