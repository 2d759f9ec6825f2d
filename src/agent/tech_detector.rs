use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::capability::CapabilityKind;
use super::repo_analyzer::DependencyCount;
use super::{default_data, execution_error, input_view, output_data, Agent, ExecutionLog};
use crate::cache::category;
use crate::detector::{
    detect_databases, detect_frameworks, detect_libraries, DetectedFramework, DetectedLibrary,
};
use crate::error::AgentExecutionError;
use crate::llm::prompts;
use crate::llm::response::{parse_validated, Validate};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::stage::{StageData, StagePolicy};

const MATURITY_LEVELS: &[&str] = &["legacy", "mature", "modern"];

#[derive(Debug, Deserialize)]
struct DetectorInput {
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    config_files: Vec<String>,
    #[serde(default)]
    languages: BTreeMap<String, usize>,
    #[serde(default)]
    dependencies: Vec<DependencyCount>,
    #[serde(default)]
    declared_dependencies: Vec<String>,
    #[serde(default)]
    primary_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    pub name: String,
    pub file_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseUsage {
    pub name: String,
    pub references: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    pub primary_language: Option<String>,
    pub languages: Vec<LanguageShare>,
    pub frameworks: Vec<DetectedFramework>,
    pub libraries: Vec<DetectedLibrary>,
    pub databases: Vec<DatabaseUsage>,
    pub maturity: String,
    pub modern_indicators: Vec<String>,
    pub legacy_indicators: Vec<String>,
    pub modernization_opportunities: Vec<String>,
}

impl TechStack {
    /// Name of the first web framework found, if any.
    pub fn primary_framework(&self) -> Option<&str> {
        self.frameworks
            .iter()
            .find(|f| f.category == "Web")
            .map(|f| f.name.as_str())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TechDetection {
    tech_stack: TechStack,
}

#[derive(Debug, Deserialize)]
struct MaturityAssessment {
    maturity: String,
    #[serde(default)]
    opportunities: Vec<String>,
}

impl Validate for MaturityAssessment {
    fn validate(&self) -> Result<(), String> {
        let level = self.maturity.trim().to_lowercase();
        if !MATURITY_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "maturity must be one of {}, got '{}'",
                MATURITY_LEVELS.join(", "),
                self.maturity
            ));
        }
        Ok(())
    }
}

pub struct TechDetector {
    log: ExecutionLog,
}

impl Default for TechDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TechDetector {
    pub fn new() -> Self {
        Self {
            log: ExecutionLog::new(),
        }
    }
}

#[async_trait]
impl Agent for TechDetector {
    fn name(&self) -> &'static str {
        "tech_detector"
    }

    fn cache_category(&self) -> &'static str {
        category::TECH_STACK
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[
            "imports",
            "config_files",
            "languages",
            "dependencies",
            "declared_dependencies",
            "primary_language",
        ]
    }

    fn required_capabilities(&self) -> &'static [CapabilityKind] {
        &[CapabilityKind::Inference]
    }

    fn default_policy(&self) -> StagePolicy {
        StagePolicy::BestEffort
    }

    fn placeholder(&self) -> StageData {
        let mut detection = TechDetection::default();
        detection.tech_stack.maturity = "unknown".to_string();
        match serde_json::to_value(detection) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => default_data::<TechDetection>(),
        }
    }

    fn log(&self) -> &ExecutionLog {
        &self.log
    }

    async fn execute(
        &self,
        input: &StageData,
        ctx: &PipelineContext,
    ) -> Result<StageData, AgentExecutionError> {
        let view: DetectorInput = input_view(self.name(), input)?;
        let llm = ctx
            .capabilities
            .inference(self.name())
            .map_err(|e| execution_error(self.name(), input, e))?;

        let mut stack = detect_stack(&view);
        debug!(
            "Detected {} frameworks, {} libraries, {} databases",
            stack.frameworks.len(),
            stack.libraries.len(),
            stack.databases.len()
        );

        let detected = serde_json::to_string_pretty(&stack)
            .map_err(|e| execution_error(self.name(), input, e))?;
        let raw = llm
            .complete(&prompts::stack_maturity(&detected))
            .await
            .map_err(|e| execution_error(self.name(), input, e))?;
        let assessment: MaturityAssessment =
            parse_validated(&raw).map_err(|e| execution_error(self.name(), input, e))?;

        stack.maturity = assessment.maturity.trim().to_lowercase();
        for opportunity in assessment.opportunities {
            crate::parsers::push_unique(&mut stack.modernization_opportunities, &opportunity);
        }

        info!(
            "Tech stack: {} ({})",
            stack.primary_framework().unwrap_or("no web framework"),
            stack.maturity
        );
        output_data(self.name(), input, &TechDetection { tech_stack: stack })
    }
}

/// Deterministic part of detection, from pattern tables only.
fn detect_stack(view: &DetectorInput) -> TechStack {
    let mut identifiers: Vec<&str> = Vec::new();
    identifiers.extend(view.imports.iter().map(String::as_str));
    identifiers.extend(view.dependencies.iter().map(|d| d.name.as_str()));
    identifiers.extend(view.declared_dependencies.iter().map(String::as_str));
    identifiers.extend(view.config_files.iter().map(String::as_str));

    let total: usize = view.languages.values().sum();
    let mut languages: Vec<LanguageShare> = view
        .languages
        .iter()
        .map(|(name, count)| LanguageShare {
            name: name.clone(),
            file_count: *count,
            percentage: if total == 0 {
                0.0
            } else {
                ((*count as f64 / total as f64) * 10000.0).round() / 100.0
            },
        })
        .collect();
    languages.sort_by(|a, b| b.file_count.cmp(&a.file_count).then_with(|| a.name.cmp(&b.name)));

    let mut frameworks = detect_frameworks(&identifiers);
    // "Spring" is implied by "Spring Boot"
    if frameworks.iter().any(|f| f.name == "Spring Boot") {
        frameworks.retain(|f| f.name != "Spring");
    }

    let databases = detect_databases(&identifiers)
        .into_iter()
        .map(|(name, references)| DatabaseUsage { name, references })
        .collect();

    let mut stack = TechStack {
        primary_language: view.primary_language.clone(),
        languages,
        frameworks,
        libraries: detect_libraries(&identifiers),
        databases,
        maturity: "unknown".to_string(),
        ..Default::default()
    };
    assess_indicators(&mut stack);
    stack
}

fn assess_indicators(stack: &mut TechStack) {
    if stack.languages.iter().any(|l| l.name == "typescript") {
        stack.modern_indicators.push("TypeScript for type safety".to_string());
    }
    if stack.frameworks.iter().any(|f| f.category == "Frontend") {
        stack.modern_indicators.push("Modern frontend framework".to_string());
    }
    if stack.frameworks.iter().any(|f| f.name == "FastAPI") {
        stack.modern_indicators.push("Async-first web framework".to_string());
    }
    if stack
        .languages
        .iter()
        .any(|l| l.name == "python" && l.percentage > 50.0)
        && stack.frameworks.iter().any(|f| f.name == "Flask" || f.name == "Django")
    {
        stack
            .legacy_indicators
            .push("Synchronous Python web framework".to_string());
    }
    if !stack.languages.iter().any(|l| l.name == "typescript")
        && stack.languages.iter().any(|l| l.name == "javascript")
    {
        stack
            .modernization_opportunities
            .push("Add TypeScript for type safety".to_string());
    }
    if !stack.legacy_indicators.is_empty() {
        stack
            .modernization_opportunities
            .push("Implement async/await patterns".to_string());
    }
}
