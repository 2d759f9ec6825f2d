//! Turning a finished run into a report bundle.
//!
//! Assembly is a pure function of the run and the timestamp it is stamped
//! with; writing the bundle to disk is a separate step.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::agent::code_generator::{is_safe_relative_path, GeneratedFile};
use crate::agent::doc_generator::DocSection;
use crate::agent::migration_planner::MigrationPlan;
use crate::agent::repo_analyzer::{ArchitectureSummary, CodeMetrics};
use crate::agent::tech_detector::TechStack;
use crate::error::AssemblyError;
use crate::pipeline::run::PipelineRun;
use crate::pipeline::stage::StagePolicy;
use crate::util::slugify;

pub mod bundle;
pub mod render;

pub use bundle::{Bundle, BundleFile, ManifestEntry};
pub use render::{HtmlRenderer, JsonRenderer, MarkdownRenderer, Renderer, RendererRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Markdown,
    Html,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportFormat::Markdown => "markdown",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "html" | "htm" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            _ => bail!("Unknown report format: {} (expected markdown, html or json)", s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisDigest {
    pub repository: Option<String>,
    pub primary_language: Option<String>,
    pub file_count: usize,
    pub architecture_patterns: Vec<String>,
    pub architecture: Option<ArchitectureSummary>,
    pub metrics: Option<CodeMetrics>,
}

/// Typed view of a run for renderers.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData<'a> {
    pub generated_at: DateTime<Utc>,
    pub run: &'a PipelineRun,
    pub analysis: AnalysisDigest,
    pub tech_stack: Option<TechStack>,
    pub migration_plan: Option<MigrationPlan>,
    pub sections: Vec<DocSection>,
    pub generated_files: Vec<GeneratedFile>,
}

fn stage_value<T: DeserializeOwned>(run: &PipelineRun, stage: &str, key: &str) -> Option<T> {
    let value = run.result(stage)?.get(key)?.clone();
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring malformed '{}' from {}: {}", key, stage, e);
            None
        }
    }
}

impl<'a> ReportData<'a> {
    pub fn from_run(run: &'a PipelineRun, generated_at: DateTime<Utc>) -> Self {
        let repository = stage_value::<serde_json::Value>(run, "repo_analyzer", "repository_metadata")
            .and_then(|m| m.get("full_name").and_then(|n| n.as_str()).map(str::to_string))
            .or_else(|| run.input.repository.clone());
        let analysis = AnalysisDigest {
            repository,
            primary_language: stage_value(run, "repo_analyzer", "primary_language").flatten(),
            file_count: stage_value(run, "repo_analyzer", "file_count").unwrap_or(0),
            architecture_patterns: stage_value(run, "repo_analyzer", "architecture_patterns")
                .unwrap_or_default(),
            architecture: stage_value(run, "repo_analyzer", "architecture_summary"),
            metrics: stage_value(run, "repo_analyzer", "metrics"),
        };
        Self {
            generated_at,
            run,
            analysis,
            tech_stack: stage_value(run, "tech_detector", "tech_stack"),
            migration_plan: stage_value(run, "migration_planner", "migration_plan"),
            sections: stage_value(run, "doc_generator", "doc_sections").unwrap_or_default(),
            generated_files: stage_value(run, "code_generator", "generated_files")
                .unwrap_or_default(),
        }
    }
}

/// `assemble_at` stamped with the current time.
pub fn assemble(run: &PipelineRun, formats: &[ReportFormat]) -> Result<Bundle, AssemblyError> {
    assemble_at(run, formats, Utc::now())
}

pub fn assemble_at(
    run: &PipelineRun,
    formats: &[ReportFormat],
    generated_at: DateTime<Utc>,
) -> Result<Bundle, AssemblyError> {
    assemble_with(&RendererRegistry::with_defaults(), run, formats, generated_at)
}

/// Same run, formats, registry and timestamp always give the same bytes.
pub fn assemble_with(
    registry: &RendererRegistry,
    run: &PipelineRun,
    formats: &[ReportFormat],
    generated_at: DateTime<Utc>,
) -> Result<Bundle, AssemblyError> {
    let renderers = formats
        .iter()
        .map(|f| registry.get(*f))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(missing) = run
        .history
        .iter()
        .find(|r| r.policy == StagePolicy::Fatal && !r.outcome.produced_result())
    {
        return Err(AssemblyError::MissingFatalStage(missing.stage.clone()));
    }

    let data = ReportData::from_run(run, generated_at);
    let mut files = Vec::new();
    for renderer in renderers {
        let format = renderer.format();
        files.push(BundleFile::new(
            format!("reports/report.{}", format.extension()),
            renderer.render(&data)?.into_bytes(),
        ));
    }
    for (index, section) in data.sections.iter().enumerate() {
        files.push(BundleFile::new(
            format!("docs/{:02}-{}.md", index + 1, slugify(&section.title)),
            format!("# {}\n\n{}\n", section.title, section.content.trim_end()).into_bytes(),
        ));
    }
    for file in &data.generated_files {
        if !is_safe_relative_path(&file.path) {
            warn!("Skipping artifact with unsafe path {}", file.path);
            continue;
        }
        files.push(BundleFile::new(
            format!("artifacts/{}", file.path.trim_start_matches("./")),
            file.content.clone().into_bytes(),
        ));
    }

    debug!("Assembled {} bundle files for run {}", files.len(), run.run_id);
    Ok(Bundle::new(run.run_id, generated_at, files))
}
