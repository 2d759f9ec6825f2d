//! Modernization documentation.
//!
//! The model writes the sections; any of the standard documents it leaves out
//! is filled in from the structured results of earlier stages, so a run
//! always carries the full document set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;
use tracing::{info, warn};

use super::capability::CapabilityKind;
use super::code_generator::GeneratedFile;
use super::migration_planner::MigrationPlan;
use super::repo_analyzer::{ArchitectureSummary, CodeMetrics};
use super::tech_detector::TechStack;
use super::{default_data, execution_error, input_view, output_data, Agent, ExecutionLog};
use crate::cache::category;
use crate::error::AgentExecutionError;
use crate::llm::prompts::{self, DOCUMENT_TITLES};
use crate::llm::response::{parse_validated, Validate};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::input::TargetStack;
use crate::pipeline::stage::{StageData, StagePolicy};
use crate::repository::RepoMetadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSection {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Documentation {
    doc_sections: Vec<DocSection>,
    section_count: usize,
}

#[derive(Debug, Deserialize)]
struct DocInput {
    target_stack: TargetStack,
    #[serde(default)]
    repository_metadata: Option<RepoMetadata>,
    #[serde(default)]
    tech_stack: Option<TechStack>,
    #[serde(default)]
    migration_plan: Option<MigrationPlan>,
    #[serde(default)]
    generated_files: Vec<GeneratedFile>,
    #[serde(default)]
    requirements: Option<String>,
    #[serde(default)]
    architecture_summary: Option<ArchitectureSummary>,
    #[serde(default)]
    metrics: Option<CodeMetrics>,
}

#[derive(Debug, Deserialize)]
struct ModelSections {
    sections: Vec<DocSection>,
}

impl Validate for ModelSections {
    fn validate(&self) -> Result<(), String> {
        if self.sections.is_empty() {
            return Err("no documentation sections".to_string());
        }
        if self.sections.iter().any(|s| s.title.trim().is_empty()) {
            return Err("documentation section without a title".to_string());
        }
        Ok(())
    }
}

pub struct DocGenerator {
    log: ExecutionLog,
}

impl Default for DocGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DocGenerator {
    pub fn new() -> Self {
        Self {
            log: ExecutionLog::new(),
        }
    }
}

#[async_trait]
impl Agent for DocGenerator {
    fn name(&self) -> &'static str {
        "doc_generator"
    }

    fn cache_category(&self) -> &'static str {
        category::DOCUMENTATION
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[
            "repository_metadata",
            "tech_stack",
            "migration_plan",
            "generated_files",
            "target_stack",
            "requirements",
            "architecture_summary",
            "metrics",
        ]
    }

    fn required_capabilities(&self) -> &'static [CapabilityKind] {
        &[CapabilityKind::Inference]
    }

    fn default_policy(&self) -> StagePolicy {
        StagePolicy::Fatal
    }

    fn placeholder(&self) -> StageData {
        default_data::<Documentation>()
    }

    fn log(&self) -> &ExecutionLog {
        &self.log
    }

    async fn execute(
        &self,
        input: &StageData,
        ctx: &PipelineContext,
    ) -> Result<StageData, AgentExecutionError> {
        let view: DocInput = input_view(self.name(), input)?;
        let llm = ctx
            .capabilities
            .inference(self.name())
            .map_err(|e| execution_error(self.name(), input, e))?;

        let context = json!({
            "repository": view.repository_metadata,
            "architecture": view.architecture_summary,
            "metrics": view.metrics,
            "tech_stack": view.tech_stack,
            "migration_plan": view.migration_plan,
            "generated_files": view
                .generated_files
                .iter()
                .map(|f| json!({"path": f.path, "description": f.description}))
                .collect::<Vec<_>>(),
            "requirements": view.requirements,
        });
        let context = serde_json::to_string_pretty(&context)
            .map_err(|e| execution_error(self.name(), input, e))?;
        let raw = llm
            .complete(&prompts::modernization_docs(&view.target_stack.to_string(), &context))
            .await
            .map_err(|e| execution_error(self.name(), input, e))?;
        let model: ModelSections =
            parse_validated(&raw).map_err(|e| execution_error(self.name(), input, e))?;

        let sections = merge_sections(model.sections, &view);
        info!("Generated {} documentation sections", sections.len());
        output_data(
            self.name(),
            input,
            &Documentation {
                section_count: sections.len(),
                doc_sections: sections,
            },
        )
    }
}

fn same_title(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Standard documents in order (model text where present, fallback otherwise),
/// then any extra sections the model wrote.
fn merge_sections(model: Vec<DocSection>, view: &DocInput) -> Vec<DocSection> {
    let mut sections = Vec::with_capacity(DOCUMENT_TITLES.len());
    for title in DOCUMENT_TITLES {
        let content = match model
            .iter()
            .find(|s| same_title(&s.title, title) && !s.content.trim().is_empty())
        {
            Some(section) => section.content.clone(),
            None => {
                warn!("Model omitted '{}', using generated fallback", title);
                fallback_content(title, view)
            }
        };
        sections.push(DocSection {
            title: title.to_string(),
            content,
        });
    }
    for section in model {
        if !sections.iter().any(|s| same_title(&s.title, &section.title)) {
            sections.push(section);
        }
    }
    sections
}

fn bullet_list(items: impl IntoIterator<Item = String>) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
    if out.is_empty() {
        out.push_str("- (none identified)\n");
    }
    out
}

fn fallback_content(title: &str, view: &DocInput) -> String {
    let repo = view
        .repository_metadata
        .as_ref()
        .map(|m| m.full_name.clone())
        .unwrap_or_else(|| "the application".to_string());
    let target = view.target_stack.to_string();
    let plan = view.migration_plan.clone().unwrap_or_default();
    let stack = view.tech_stack.clone().unwrap_or_default();

    match title {
        "Executive Summary" => format!(
            "Modernization of {} to {}. Estimated difficulty: {}, about {} hours over {} weeks.\n",
            repo, target, plan.difficulty, plan.estimated_effort_hours, plan.estimated_duration_weeks
        ),
        "Business Requirements" => match view.requirements.as_deref() {
            Some(req) if !req.trim().is_empty() => format!("{}\n", req.trim()),
            _ => "Preserve existing functionality while moving to the target stack.\n".to_string(),
        },
        "Functional Overview" => {
            let summary = view
                .architecture_summary
                .as_ref()
                .map(|a| a.summary.clone())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("Functional scope of {}.", repo));
            format!("{}\n", summary)
        }
        "Non-Functional Requirements" => {
            let mut out = String::new();
            if let Some(m) = &view.metrics {
                let _ = writeln!(
                    out,
                    "Current code: {} lines, complexity {}/10, maintainability {}/10.\n",
                    m.total_lines, m.complexity_score, m.maintainability_score
                );
            }
            out.push_str(&bullet_list(
                ["Observability", "Security", "Performance", "Availability"]
                    .iter()
                    .map(|s| s.to_string()),
            ));
            out
        }
        "Current Architecture" => {
            let mut out = format!("Current stack: {}\n\n", plan.current_stack);
            out.push_str(&bullet_list(
                stack
                    .frameworks
                    .iter()
                    .map(|f| format!("{} ({})", f.name, f.category))
                    .chain(stack.databases.iter().map(|d| d.name.clone())),
            ));
            out
        }
        "Target Architecture" => {
            let mut out = format!("Target stack: {}\n\n", target);
            out.push_str(&bullet_list(
                view.generated_files
                    .iter()
                    .map(|f| format!("`{}`: {}", f.path, f.description)),
            ));
            out
        }
        "API Contracts" => {
            "Existing endpoints are preserved; new endpoints follow the target framework's conventions.\n"
                .to_string()
        }
        "Risks and Assumptions" => bullet_list(
            plan.risks
                .iter()
                .map(|r| format!("{} (probability {}, impact {}): {}", r.risk, r.probability, r.impact, r.mitigation)),
        ),
        "Migration Plan" => bullet_list(
            plan.phases
                .iter()
                .map(|p| format!("Phase {}: {} ({}h)", p.number, p.name, p.effort_hours)),
        ),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CapabilityRegistry;
    use crate::cache::CacheStore;
    use crate::config::Config;
    use crate::llm::MockLlmClient;
    use crate::pipeline::input::Backend;
    use std::sync::Arc;

    fn context(llm: MockLlmClient) -> PipelineContext {
        PipelineContext::new(
            Config::default(),
            Arc::new(CacheStore::disabled()),
            CapabilityRegistry::new().with_inference(Arc::new(llm)),
        )
    }

    fn input() -> StageData {
        let mut input = StageData::new();
        input.insert(
            "target_stack".to_string(),
            serde_json::to_value(TargetStack::new(Backend::FastApi)).unwrap(),
        );
        input.insert("requirements".to_string(), json!("Customers can track orders."));
        input
    }

    #[tokio::test]
    async fn test_all_standard_documents_present() {
        let out = DocGenerator::new().execute(&input(), &context(MockLlmClient::new())).await.unwrap();
        let sections: Vec<DocSection> = serde_json::from_value(out["doc_sections"].clone()).unwrap();
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, DOCUMENT_TITLES.to_vec());
        assert_eq!(out["section_count"], json!(9));
    }

    #[tokio::test]
    async fn test_missing_titles_get_fallbacks_and_extras_are_kept() {
        let llm = MockLlmClient::new().with_response(
            prompts::DOCUMENTATION_MARKER,
            r###"{"sections": [
                {"title": "executive summary", "content": "Model summary."},
                {"title": "Glossary", "content": "Terms."}
            ]}"###,
        );
        let out = DocGenerator::new().execute(&input(), &context(llm)).await.unwrap();
        let sections: Vec<DocSection> = serde_json::from_value(out["doc_sections"].clone()).unwrap();
        assert_eq!(sections.len(), 10);
        assert_eq!(sections[0].title, "Executive Summary");
        assert_eq!(sections[0].content, "Model summary.");
        assert_eq!(sections[1].content, "Customers can track orders.\n");
        assert_eq!(sections[9].title, "Glossary");
    }

    #[tokio::test]
    async fn test_empty_section_list_is_rejected() {
        let llm = MockLlmClient::new().with_response(prompts::DOCUMENTATION_MARKER, r#"{"sections": []}"#);
        let err = DocGenerator::new().execute(&input(), &context(llm)).await.unwrap_err();
        assert_eq!(err.stage, "doc_generator");
    }

    #[test]
    fn test_fallbacks_are_never_empty() {
        let view: DocInput = serde_json::from_value(serde_json::Value::Object(input())).unwrap();
        for title in DOCUMENT_TITLES {
            assert!(!fallback_content(title, &view).trim().is_empty(), "{}", title);
        }
    }
}
