//! Repository analysis: the first stage of every run.
//!
//! Walks the snapshot, parses what it can, aggregates structure and metrics,
//! and asks the model for a short architecture summary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::capability::CapabilityKind;
use super::{default_data, execution_error, input_view, output_data, Agent, ExecutionLog};
use crate::cache::category;
use crate::detector::detect_language;
use crate::error::AgentExecutionError;
use crate::llm::prompts;
use crate::llm::response::{parse_validated, Validate};
use crate::parsers::{ParsedFile, ParserRegistry};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::input::AnalysisOptions;
use crate::pipeline::stage::{StageData, StagePolicy};
use crate::repository::{RepoMetadata, RepoSnapshot};
use crate::util::sha256_hex;

const ENTRY_POINT_NAMES: &[&str] = &[
    "main.py", "index.js", "app.py", "server.py", "main.java", "Main.java",
];
const ENTRY_POINT_FUNCTIONS: &[&str] = &["main", "execute", "run"];
const MAX_ENTRY_POINTS: usize = 5;
const MAX_DEPENDENCIES: usize = 20;

const CONFIG_FILE_NAMES: &[&str] = &[
    "package.json",
    "requirements.txt",
    "pom.xml",
    "build.gradle",
    "setup.py",
    "pyproject.toml",
    ".env",
    "config.yaml",
    "config.yml",
    "docker-compose.yml",
    "Dockerfile",
    "go.mod",
    "Cargo.toml",
];

#[derive(Debug, Deserialize)]
struct AnalyzerInput {
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    analysis_options: AnalysisOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeMetrics {
    pub total_lines: usize,
    pub total_classes: usize,
    pub total_functions: usize,
    pub avg_file_lines: f64,
    pub avg_class_lines: f64,
    /// 1 (simple) to 10 (complex).
    pub complexity_score: u8,
    /// 1 (hard to maintain) to 10 (easy).
    pub maintainability_score: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureSummary {
    pub summary: String,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

impl Validate for ArchitectureSummary {
    fn validate(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("architecture summary is empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyCount {
    pub name: String,
    pub count: usize,
}

/// Everything the analyzer publishes, one field per output key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoAnalysis {
    pub repository_metadata: Option<RepoMetadata>,
    pub file_count: usize,
    pub files: Vec<String>,
    pub analyzed_files: Vec<ParsedFile>,
    pub languages: BTreeMap<String, usize>,
    pub primary_language: Option<String>,
    pub entry_points: Vec<String>,
    pub config_files: Vec<String>,
    pub imports: Vec<String>,
    pub dependencies: Vec<DependencyCount>,
    pub declared_dependencies: Vec<String>,
    pub architecture_patterns: Vec<String>,
    pub metrics: CodeMetrics,
    pub architecture_summary: ArchitectureSummary,
}

pub struct RepoAnalyzer {
    log: ExecutionLog,
}

impl Default for RepoAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoAnalyzer {
    pub fn new() -> Self {
        Self {
            log: ExecutionLog::new(),
        }
    }
}

#[async_trait]
impl Agent for RepoAnalyzer {
    fn name(&self) -> &'static str {
        "repo_analyzer"
    }

    fn cache_category(&self) -> &'static str {
        category::REPO_STRUCTURE
    }

    fn consumes(&self) -> &'static [&'static str] {
        &["repository", "repository_revision", "analysis_options"]
    }

    fn required_capabilities(&self) -> &'static [CapabilityKind] {
        &[
            CapabilityKind::Repository,
            CapabilityKind::Parsers,
            CapabilityKind::Inference,
        ]
    }

    fn default_policy(&self) -> StagePolicy {
        StagePolicy::Fatal
    }

    fn placeholder(&self) -> StageData {
        default_data::<RepoAnalysis>()
    }

    fn log(&self) -> &ExecutionLog {
        &self.log
    }

    async fn execute(
        &self,
        input: &StageData,
        ctx: &PipelineContext,
    ) -> Result<StageData, AgentExecutionError> {
        let view: AnalyzerInput = input_view(self.name(), input)?;
        let Some(reference) = view.repository else {
            info!("No repository given, skipping structural analysis");
            return output_data(self.name(), input, &RepoAnalysis::default());
        };

        let provider = ctx
            .capabilities
            .repository(self.name())
            .map_err(|e| execution_error(self.name(), input, e))?;
        let parsers = ctx
            .capabilities
            .parsers(self.name())
            .map_err(|e| execution_error(self.name(), input, e))?;
        let llm = ctx
            .capabilities
            .inference(self.name())
            .map_err(|e| execution_error(self.name(), input, e))?;

        info!("Analyzing repository {}", reference);
        let snapshot = provider
            .fetch(&reference, &view.analysis_options)
            .await
            .map_err(|e| execution_error(self.name(), input, e))?;

        let analyzed = parse_files(&snapshot, &parsers, &view.analysis_options, ctx);
        let mut analysis = aggregate(&snapshot, analyzed);
        analysis.declared_dependencies = declared_dependencies(&snapshot, &analysis.config_files);

        let structure = json!({
            "languages": analysis.languages,
            "primary_language": analysis.primary_language,
            "entry_points": analysis.entry_points,
            "config_files": analysis.config_files,
            "dependencies": analysis.dependencies,
            "architecture_patterns": analysis.architecture_patterns,
            "metrics": analysis.metrics,
        });
        let prompt = prompts::architecture_summary(
            &snapshot.metadata.full_name,
            &serde_json::to_string_pretty(&structure)
                .map_err(|e| execution_error(self.name(), input, e))?,
        );
        let raw = llm
            .complete(&prompt)
            .await
            .map_err(|e| execution_error(self.name(), input, e))?;
        analysis.architecture_summary =
            parse_validated(&raw).map_err(|e| execution_error(self.name(), input, e))?;

        info!(
            "Analyzed {} of {} files ({} LOC)",
            analysis.analyzed_files.len(),
            analysis.file_count,
            analysis.metrics.total_lines
        );
        output_data(self.name(), input, &analysis)
    }
}

/// Parse up to `max_files` supported files, consulting the per-file cache.
fn parse_files(
    snapshot: &RepoSnapshot,
    parsers: &ParserRegistry,
    options: &AnalysisOptions,
    ctx: &PipelineContext,
) -> Vec<ParsedFile> {
    let mut analyzed = Vec::new();
    for file in &snapshot.files {
        if analyzed.len() >= options.max_files {
            debug!("Reached max_files ({}), stopping", options.max_files);
            break;
        }
        let Some(language) = detect_language(std::path::Path::new(&file.path)) else {
            continue;
        };
        if !parsers.supports(language) {
            continue;
        }
        if file.size_bytes > options.max_file_size_bytes {
            debug!("Skipping {} ({} bytes)", file.path, file.size_bytes);
            continue;
        }
        let content = match snapshot.read_to_string(file) {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read {}: {}", file.path, e);
                continue;
            }
        };

        let key = json!({ "path": file.path, "sha256": sha256_hex(content.as_bytes()) });
        if let Some(cached) = ctx.cache.get::<ParsedFile>(category::FILE_ANALYSIS, &key) {
            analyzed.push(cached);
            continue;
        }
        let parsed = match parsers.parse(&file.path, &content) {
            Some(Ok(parsed)) => parsed,
            Some(Err(e)) => {
                warn!("{}", e);
                ParsedFile::empty(&file.path, Some(language), &content)
            }
            None => continue,
        };
        ctx.cache.set(
            category::FILE_ANALYSIS,
            &key,
            &parsed,
            ctx.cache.default_ttl(),
        );
        analyzed.push(parsed);
    }
    analyzed
}

fn aggregate(snapshot: &RepoSnapshot, analyzed: Vec<ParsedFile>) -> RepoAnalysis {
    let files: Vec<String> = snapshot.files.iter().map(|f| f.path.clone()).collect();

    let mut languages: BTreeMap<String, usize> = BTreeMap::new();
    for path in &files {
        if let Some(lang) = detect_language(std::path::Path::new(path)) {
            *languages.entry(lang.as_str().to_string()).or_insert(0) += 1;
        }
    }
    // Highest count wins; ties go to the alphabetically first language
    let primary_language = languages
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(name, _)| name.clone());

    let mut imports = Vec::new();
    for parsed in &analyzed {
        for import in &parsed.imports {
            crate::parsers::push_unique(&mut imports, import);
        }
    }

    RepoAnalysis {
        repository_metadata: Some(snapshot.metadata.clone()),
        file_count: files.len(),
        entry_points: entry_points(&analyzed),
        config_files: config_files(&files),
        dependencies: count_dependencies(&analyzed),
        architecture_patterns: detect_patterns(&files),
        metrics: compute_metrics(&analyzed),
        files,
        languages,
        primary_language,
        imports,
        analyzed_files: analyzed,
        declared_dependencies: Vec::new(),
        architecture_summary: ArchitectureSummary::default(),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn entry_points(analyzed: &[ParsedFile]) -> Vec<String> {
    analyzed
        .iter()
        .filter(|f| {
            ENTRY_POINT_NAMES.contains(&file_name(&f.path))
                || f.functions
                    .iter()
                    .any(|func| ENTRY_POINT_FUNCTIONS.contains(&func.as_str()))
        })
        .map(|f| f.path.clone())
        .take(MAX_ENTRY_POINTS)
        .collect()
}

fn config_files(files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|path| CONFIG_FILE_NAMES.contains(&file_name(path)))
        .cloned()
        .collect()
}

/// Non-relative imports ranked by how many files use them.
fn count_dependencies(analyzed: &[ParsedFile]) -> Vec<DependencyCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for parsed in analyzed {
        for import in &parsed.imports {
            if import.is_empty() || import.starts_with('.') {
                continue;
            }
            *counts.entry(import.as_str()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<DependencyCount> = counts
        .into_iter()
        .map(|(name, count)| DependencyCount {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(MAX_DEPENDENCIES);
    ranked
}

fn detect_patterns(files: &[String]) -> Vec<String> {
    if files.is_empty() {
        return Vec::new();
    }
    let lowered: Vec<String> = files.iter().map(|f| f.to_lowercase()).collect();
    let count = |needles: &[&str]| {
        lowered
            .iter()
            .filter(|p| needles.iter().any(|n| p.contains(n)))
            .count()
    };
    let total = files.len() as f64;

    let mut patterns = Vec::new();
    let mvc_hits = count(&["model"]) + count(&["view"]) + count(&["controller"]);
    if mvc_hits > 3 {
        patterns.push("MVC".to_string());
    }
    if count(&["service"]) as f64 / total > 0.3 {
        patterns.push("Microservices".to_string());
    }
    if count(&["api", "service", "repository", "domain"]) as f64 / total > 0.2 {
        patterns.push("Layered".to_string());
    }
    patterns
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn compute_metrics(analyzed: &[ParsedFile]) -> CodeMetrics {
    let total_lines: usize = analyzed.iter().map(|f| f.line_count).sum();
    let total_classes: usize = analyzed.iter().map(|f| f.classes.len()).sum();
    let total_functions: usize = analyzed.iter().map(|f| f.functions.len()).sum();

    let avg_file_lines = if analyzed.is_empty() {
        0.0
    } else {
        total_lines as f64 / analyzed.len() as f64
    };
    let avg_class_lines = if total_classes == 0 {
        0.0
    } else {
        total_lines as f64 / total_classes as f64
    };

    let complexity_score = ((avg_file_lines / 100.0) as i64).clamp(1, 10) as u8;

    let mut maintainability: i64 = 10;
    if avg_class_lines > 500.0 {
        maintainability -= 3;
    }
    if avg_file_lines > 2000.0 {
        maintainability -= 2;
    }
    if analyzed.len() > 100 {
        maintainability -= 1;
    }

    CodeMetrics {
        total_lines,
        total_classes,
        total_functions,
        avg_file_lines: round2(avg_file_lines),
        avg_class_lines: round2(avg_class_lines),
        complexity_score,
        maintainability_score: maintainability.clamp(1, 10) as u8,
    }
}

/// Package names listed in requirements.txt and package.json files.
fn declared_dependencies(snapshot: &RepoSnapshot, config_files: &[String]) -> Vec<String> {
    let mut declared = Vec::new();
    for path in config_files {
        let name = file_name(path);
        if name != "requirements.txt" && name != "package.json" {
            continue;
        }
        let Some(file) = snapshot.files.iter().find(|f| &f.path == path) else {
            continue;
        };
        let content = match snapshot.read_to_string(file) {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read {}: {}", path, e);
                continue;
            }
        };
        if name == "requirements.txt" {
            for package in parse_requirements(&content) {
                crate::parsers::push_unique(&mut declared, &package);
            }
        } else {
            for package in parse_package_json(&content) {
                crate::parsers::push_unique(&mut declared, &package);
            }
        }
    }
    declared
}

fn parse_requirements(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .filter_map(|line| {
            let end = line
                .find(|c: char| "=<>~![; ".contains(c))
                .unwrap_or(line.len());
            let name = line[..end].trim();
            (!name.is_empty()).then(|| name.to_lowercase())
        })
        .collect()
}

fn parse_package_json(content: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(content) else {
        warn!("package.json is not valid JSON, ignoring");
        return Vec::new();
    };
    let mut names = Vec::new();
    for section in ["dependencies", "devDependencies"] {
        if let Some(deps) = value.get(section).and_then(|d| d.as_object()) {
            names.extend(deps.keys().cloned());
        }
    }
    names
}
