use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use tracing::{debug, info};

use super::capability::CapabilityKind;
use super::migration_planner::MigrationPlan;
use super::templates;
use super::{default_data, execution_error, input_view, output_data, Agent, ExecutionLog};
use crate::cache::category;
use crate::error::AgentExecutionError;
use crate::llm::prompts;
use crate::llm::response::{parse_validated, Validate};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::input::TargetStack;
use crate::pipeline::stage::{StageData, StagePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    Scaffold,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Relative, forward-slash path inside the starter project.
    pub path: String,
    pub content: String,
    pub description: String,
    pub origin: FileOrigin,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GeneratedCode {
    generated_files: Vec<GeneratedFile>,
    files_generated: usize,
}

#[derive(Debug, Deserialize)]
struct CodegenInput {
    target_stack: TargetStack,
    #[serde(default)]
    migration_plan: Option<MigrationPlan>,
    #[serde(default)]
    requirements: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    path: String,
    content: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ModelFiles {
    #[serde(default)]
    files: Vec<ModelFile>,
}

impl Validate for ModelFiles {
    fn validate(&self) -> Result<(), String> {
        for file in &self.files {
            if !is_safe_relative_path(&file.path) {
                return Err(format!("unsafe file path '{}'", file.path));
            }
        }
        Ok(())
    }
}

/// Relative, non-empty, and never escaping the project root.
pub fn is_safe_relative_path(path: &str) -> bool {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return false;
    }
    if trimmed.contains('\\') || trimmed.contains(':') {
        return false;
    }
    Path::new(trimmed)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub struct CodeGenerator {
    log: ExecutionLog,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            log: ExecutionLog::new(),
        }
    }
}

#[async_trait]
impl Agent for CodeGenerator {
    fn name(&self) -> &'static str {
        "code_generator"
    }

    fn cache_category(&self) -> &'static str {
        category::GENERATED_CODE
    }

    fn consumes(&self) -> &'static [&'static str] {
        &["target_stack", "migration_plan", "requirements"]
    }

    fn required_capabilities(&self) -> &'static [CapabilityKind] {
        &[CapabilityKind::Inference]
    }

    fn default_policy(&self) -> StagePolicy {
        StagePolicy::BestEffort
    }

    fn placeholder(&self) -> StageData {
        default_data::<GeneratedCode>()
    }

    fn log(&self) -> &ExecutionLog {
        &self.log
    }

    async fn execute(
        &self,
        input: &StageData,
        ctx: &PipelineContext,
    ) -> Result<StageData, AgentExecutionError> {
        let view: CodegenInput = input_view(self.name(), input)?;
        let llm = ctx
            .capabilities
            .inference(self.name())
            .map_err(|e| execution_error(self.name(), input, e))?;

        let mut files = templates::scaffold(&view.target_stack);
        let scaffold_paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        debug!("Scaffold for {}: {:?}", view.target_stack, scaffold_paths);

        let mut plan_json = serde_json::to_string_pretty(&view.migration_plan)
            .map_err(|e| execution_error(self.name(), input, e))?;
        if let Some(requirements) = view.requirements.as_deref() {
            plan_json.push_str("\n\nRequirements:\n");
            plan_json.push_str(requirements);
        }
        let prompt = prompts::starter_code(&view.target_stack.to_string(), &scaffold_paths, &plan_json);
        let raw = llm
            .complete(&prompt)
            .await
            .map_err(|e| execution_error(self.name(), input, e))?;
        let suggested: ModelFiles =
            parse_validated(&raw).map_err(|e| execution_error(self.name(), input, e))?;

        for model_file in suggested.files {
            let file = GeneratedFile {
                path: model_file.path.trim().trim_start_matches("./").to_string(),
                content: model_file.content,
                description: model_file.description,
                origin: FileOrigin::Model,
            };
            match files.iter_mut().find(|f| f.path == file.path) {
                Some(existing) => {
                    debug!("Model output replaces scaffold file {}", file.path);
                    *existing = file;
                }
                None => files.push(file),
            }
        }

        info!("Generated {} starter files", files.len());
        let output = GeneratedCode {
            files_generated: files.len(),
            generated_files: files,
        };
        output_data(self.name(), input, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CapabilityRegistry;
    use crate::cache::CacheStore;
    use crate::config::Config;
    use crate::llm::MockLlmClient;
    use crate::pipeline::input::{Backend, Database, Frontend};
    use std::sync::Arc;

    fn context(llm: MockLlmClient) -> PipelineContext {
        PipelineContext::new(
            Config::default(),
            Arc::new(CacheStore::disabled()),
            CapabilityRegistry::new().with_inference(Arc::new(llm)),
        )
    }

    fn input() -> StageData {
        let target = TargetStack::new(Backend::FastApi)
            .with_frontend(Frontend::React)
            .with_database(Database::PostgreSql);
        let mut input = StageData::new();
        input.insert("target_stack".to_string(), serde_json::to_value(target).unwrap());
        input
    }

    #[test]
    fn test_safe_relative_paths() {
        assert!(is_safe_relative_path("backend/app/routers/health.py"));
        assert!(is_safe_relative_path("./README.md"));
        assert!(!is_safe_relative_path("../etc/passwd"));
        assert!(!is_safe_relative_path("backend/../../x"));
        assert!(!is_safe_relative_path("/etc/passwd"));
        assert!(!is_safe_relative_path("C:\\temp\\x"));
        assert!(!is_safe_relative_path("  "));
    }

    #[tokio::test]
    async fn test_scaffold_plus_model_files() {
        let out = CodeGenerator::new().execute(&input(), &context(MockLlmClient::new())).await.unwrap();
        assert_eq!(out["files_generated"], serde_json::json!(5));
        let files: Vec<GeneratedFile> = serde_json::from_value(out["generated_files"].clone()).unwrap();
        assert_eq!(files[4].path, "backend/app/routers/health.py");
        assert_eq!(files[4].origin, FileOrigin::Model);
    }

    #[tokio::test]
    async fn test_model_file_overrides_scaffold_path() {
        let llm = MockLlmClient::new().with_response(
            prompts::CODEGEN_MARKER,
            r#"{"files": [{"path": "./backend/app/main.py", "content": "app = None\n"}]}"#,
        );
        let out = CodeGenerator::new().execute(&input(), &context(llm)).await.unwrap();
        let files: Vec<GeneratedFile> = serde_json::from_value(out["generated_files"].clone()).unwrap();
        assert_eq!(files.len(), 4);
        assert_eq!(files[0].path, "backend/app/main.py");
        assert_eq!(files[0].content, "app = None\n");
        assert_eq!(files[0].origin, FileOrigin::Model);
    }

    #[tokio::test]
    async fn test_escaping_path_is_rejected() {
        let llm = MockLlmClient::new().with_response(
            prompts::CODEGEN_MARKER,
            r#"{"files": [{"path": "../outside.py", "content": "x"}]}"#,
        );
        let err = CodeGenerator::new().execute(&input(), &context(llm)).await.unwrap_err();
        assert!(format!("{:#}", err.cause).contains("unsafe file path"));
    }

    #[test]
    fn test_placeholder_has_no_files() {
        let placeholder = CodeGenerator::new().placeholder();
        assert_eq!(placeholder["files_generated"], serde_json::json!(0));
        assert_eq!(placeholder["generated_files"], serde_json::json!([]));
    }
}
