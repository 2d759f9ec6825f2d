//! Migration planning: a deterministic skeleton (difficulty, effort, phases,
//! risks) refined by model-suggested breaking changes and recommendations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use super::capability::CapabilityKind;
use super::repo_analyzer::CodeMetrics;
use super::tech_detector::TechStack;
use super::{default_data, execution_error, input_view, output_data, Agent, ExecutionLog};
use crate::cache::category;
use crate::error::AgentExecutionError;
use crate::llm::prompts;
use crate::llm::response::{parse_validated, Validate};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::input::{Database, TargetStack};
use crate::pipeline::stage::{StageData, StagePolicy};

const RELATIONAL_DATABASES: &[&str] = &["PostgreSQL", "MySQL", "SQLite", "Oracle"];
const PYTHON2_MODULES: &[&str] = &["urllib2", "__builtin__", "ConfigParser", "cPickle", "StringIO"];
const LARGE_CODEBASE_FILES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    VeryHard,
}

impl Difficulty {
    fn bump(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium => Difficulty::Hard,
            Difficulty::Hard | Difficulty::VeryHard => Difficulty::VeryHard,
        }
    }

    pub fn effort_hours(self) -> u32 {
        match self {
            Difficulty::Easy => 40,
            Difficulty::Medium => 160,
            Difficulty::Hard => 400,
            Difficulty::VeryHard => 800,
        }
    }

    pub fn duration_weeks(self) -> u32 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 4,
            Difficulty::Hard => 10,
            Difficulty::VeryHard => 20,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Difficulty::Easy => "Straightforward upgrade with minimal breaking changes",
            Difficulty::Medium => "Moderate effort with some compatibility work",
            Difficulty::Hard => "Significant refactoring and architectural changes required",
            Difficulty::VeryHard => "Major overhaul involving fundamental architecture changes",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::VeryHard => "very hard",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPhase {
    pub number: u32,
    pub name: String,
    pub tasks: Vec<String>,
    pub effort_hours: u32,
    pub depends_on: Option<u32>,
    pub risk_level: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub risk: String,
    pub probability: String,
    pub impact: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingChange {
    pub area: String,
    pub description: String,
    #[serde(default)]
    pub mitigation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub current_stack: String,
    pub target_stack: String,
    pub difficulty: Difficulty,
    pub difficulty_description: String,
    pub estimated_effort_hours: u32,
    pub estimated_duration_weeks: u32,
    pub phases: Vec<MigrationPhase>,
    pub risks: Vec<Risk>,
    pub breaking_changes: Vec<BreakingChange>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlannerOutput {
    migration_plan: MigrationPlan,
}

#[derive(Debug, Deserialize)]
struct PlannerInput {
    target_stack: TargetStack,
    #[serde(default)]
    tech_stack: Option<TechStack>,
    #[serde(default)]
    primary_language: Option<String>,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    architecture_patterns: Vec<String>,
    #[serde(default)]
    metrics: CodeMetrics,
    #[serde(default)]
    file_count: usize,
    #[serde(default)]
    requirements: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MigrationRisks {
    #[serde(default)]
    breaking_changes: Vec<BreakingChange>,
    #[serde(default)]
    recommendations: Vec<String>,
}

impl Validate for MigrationRisks {
    fn validate(&self) -> Result<(), String> {
        for change in &self.breaking_changes {
            if change.area.trim().is_empty() || change.description.trim().is_empty() {
                return Err("breaking change needs an area and a description".to_string());
            }
        }
        Ok(())
    }
}

pub struct MigrationPlanner {
    log: ExecutionLog,
}

impl Default for MigrationPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationPlanner {
    pub fn new() -> Self {
        Self {
            log: ExecutionLog::new(),
        }
    }
}

#[async_trait]
impl Agent for MigrationPlanner {
    fn name(&self) -> &'static str {
        "migration_planner"
    }

    fn cache_category(&self) -> &'static str {
        category::MIGRATION_PLAN
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[
            "tech_stack",
            "target_stack",
            "primary_language",
            "imports",
            "architecture_patterns",
            "metrics",
            "file_count",
            "requirements",
        ]
    }

    fn required_capabilities(&self) -> &'static [CapabilityKind] {
        &[CapabilityKind::Inference]
    }

    fn default_policy(&self) -> StagePolicy {
        StagePolicy::Fatal
    }

    fn placeholder(&self) -> StageData {
        default_data::<PlannerOutput>()
    }

    fn log(&self) -> &ExecutionLog {
        &self.log
    }

    async fn execute(
        &self,
        input: &StageData,
        ctx: &PipelineContext,
    ) -> Result<StageData, AgentExecutionError> {
        let view: PlannerInput = input_view(self.name(), input)?;
        let llm = ctx
            .capabilities
            .inference(self.name())
            .map_err(|e| execution_error(self.name(), input, e))?;

        let mut plan = draft_plan(&view);
        let draft = serde_json::to_string_pretty(&plan)
            .map_err(|e| execution_error(self.name(), input, e))?;
        let prompt = prompts::migration_risks(
            &plan.current_stack,
            &plan.target_stack,
            &draft,
            view.requirements.as_deref().unwrap_or(""),
        );
        let raw = llm
            .complete(&prompt)
            .await
            .map_err(|e| execution_error(self.name(), input, e))?;
        let suggested: MigrationRisks =
            parse_validated(&raw).map_err(|e| execution_error(self.name(), input, e))?;

        for change in suggested.breaking_changes {
            let duplicate = plan
                .breaking_changes
                .iter()
                .any(|c| c.area.eq_ignore_ascii_case(&change.area) && c.description == change.description);
            if !duplicate {
                plan.breaking_changes.push(change);
            }
        }
        plan.recommendations = recommendations(
            plan.difficulty,
            plan.breaking_changes.len(),
            view.metrics.complexity_score,
        );
        for rec in suggested.recommendations {
            crate::parsers::push_unique(&mut plan.recommendations, &rec);
        }

        info!(
            "Migration {} -> {}: {} ({}h over {} weeks)",
            plan.current_stack,
            plan.target_stack,
            plan.difficulty,
            plan.estimated_effort_hours,
            plan.estimated_duration_weeks
        );
        output_data(self.name(), input, &PlannerOutput { migration_plan: plan })
    }
}

/// Everything in the plan that does not need the model.
fn draft_plan(view: &PlannerInput) -> MigrationPlan {
    let stack = view.tech_stack.clone().unwrap_or_default();
    let current_language = stack
        .primary_language
        .clone()
        .or_else(|| view.primary_language.clone());
    let current_framework = stack.primary_framework().map(str::to_string);
    let target = view.target_stack;

    let current_stack = match (&current_framework, &current_language) {
        (Some(fw), Some(lang)) => format!("{} ({})", fw, lang),
        (None, Some(lang)) => lang.clone(),
        (Some(fw), None) => fw.clone(),
        (None, None) => "unknown".to_string(),
    };

    let difficulty = assess_difficulty(
        current_language.as_deref(),
        current_framework.as_deref(),
        &stack,
        &target,
        view.architecture_patterns.iter().any(|p| p == "Microservices"),
        view.file_count,
    );

    MigrationPlan {
        current_stack,
        target_stack: target.to_string(),
        difficulty,
        difficulty_description: difficulty.description().to_string(),
        estimated_effort_hours: difficulty.effort_hours(),
        estimated_duration_weeks: difficulty.duration_weeks(),
        phases: phases(),
        risks: risks(),
        breaking_changes: known_breaking_changes(
            current_framework.as_deref(),
            current_language.as_deref(),
            &view.imports,
            &target,
        ),
        recommendations: Vec::new(),
    }
}

fn assess_difficulty(
    current_language: Option<&str>,
    current_framework: Option<&str>,
    stack: &TechStack,
    target: &TargetStack,
    microservices: bool,
    file_count: usize,
) -> Difficulty {
    let target_language = target.backend.language();
    let base = match current_language {
        // Nothing to migrate from: a greenfield build of moderate effort
        None => Difficulty::Medium,
        Some(lang) if lang.eq_ignore_ascii_case(target_language.as_str()) => {
            match current_framework {
                Some(fw) if fw.eq_ignore_ascii_case(target.backend.as_str()) => Difficulty::Easy,
                _ => Difficulty::Medium,
            }
        }
        Some(_) if microservices || file_count > LARGE_CODEBASE_FILES => Difficulty::VeryHard,
        Some(_) => Difficulty::Hard,
    };

    let uses_relational = stack
        .databases
        .iter()
        .any(|d| RELATIONAL_DATABASES.contains(&d.name.as_str()));
    let to_non_relational = target.database != Database::None && !target.database.is_relational();
    if uses_relational && to_non_relational {
        base.bump()
    } else {
        base
    }
}

fn known_breaking_changes(
    framework: Option<&str>,
    language: Option<&str>,
    imports: &[String],
    target: &TargetStack,
) -> Vec<BreakingChange> {
    let mut changes = Vec::new();
    let target_language = target.backend.language();

    let python2 = language == Some("python")
        && imports
            .iter()
            .any(|i| PYTHON2_MODULES.contains(&i.split('.').next().unwrap_or("")));
    if python2 && target_language.as_str() == "python" {
        changes.push(BreakingChange {
            area: "Language".to_string(),
            description: "Python 2 to 3: print() function, division operator, string encoding"
                .to_string(),
            mitigation: "Use 2to3, update string handling, test thoroughly".to_string(),
        });
    }

    if framework == Some("Flask") && target.backend.as_str() == "FastAPI" {
        changes.push(BreakingChange {
            area: "Framework".to_string(),
            description: "Route decorators and request handling differ".to_string(),
            mitigation: "Rewrite routes to FastAPI routers, move shared state to dependency injection"
                .to_string(),
        });
    }

    if let Some(lang) = language {
        if !lang.eq_ignore_ascii_case(target_language.as_str()) {
            changes.push(BreakingChange {
                area: "Language".to_string(),
                description: format!(
                    "Rewrite from {} to {}",
                    lang,
                    target_language.as_str()
                ),
                mitigation: "Port module by module behind a stable API contract".to_string(),
            });
        }
    }
    changes
}

fn phase(
    number: u32,
    name: &str,
    tasks: &[&str],
    effort_hours: u32,
    risk_level: Difficulty,
) -> MigrationPhase {
    MigrationPhase {
        number,
        name: name.to_string(),
        tasks: tasks.iter().map(|t| t.to_string()).collect(),
        effort_hours,
        depends_on: (number > 1).then(|| number - 1),
        risk_level,
    }
}

fn phases() -> Vec<MigrationPhase> {
    vec![
        phase(
            1,
            "Planning & Setup",
            &[
                "Audit current codebase",
                "Set up target environment",
                "Create migration timeline",
                "Train team on target stack",
            ],
            40,
            Difficulty::Easy,
        ),
        phase(
            2,
            "Parallel Development",
            &[
                "Build core features in new stack",
                "Create data migration scripts",
                "Set up new infrastructure",
                "Implement API compatibility layer",
            ],
            120,
            Difficulty::Medium,
        ),
        phase(
            3,
            "Testing & QA",
            &[
                "Integration testing",
                "Performance testing",
                "Security testing",
                "User acceptance testing",
            ],
            80,
            Difficulty::Medium,
        ),
        phase(
            4,
            "Gradual Rollout",
            &[
                "Canary deployment (5% traffic)",
                "Monitor metrics and errors",
                "Incremental rollout to 100%",
                "Maintain rollback plan",
            ],
            60,
            Difficulty::Hard,
        ),
        phase(
            5,
            "Stabilization",
            &[
                "Monitor production",
                "Fix issues and optimize",
                "Validate data integrity",
                "Update documentation",
            ],
            40,
            Difficulty::Easy,
        ),
    ]
}

fn risk(name: &str, probability: &str, impact: &str, mitigation: &str) -> Risk {
    Risk {
        risk: name.to_string(),
        probability: probability.to_string(),
        impact: impact.to_string(),
        mitigation: mitigation.to_string(),
    }
}

fn risks() -> Vec<Risk> {
    vec![
        risk(
            "Data Loss",
            "Medium",
            "High",
            "Comprehensive backup strategy, test migrations in staging",
        ),
        risk(
            "Service Downtime",
            "Medium",
            "High",
            "Blue-green deployment with fallback to the old system",
        ),
        risk(
            "Performance Degradation",
            "Medium",
            "Medium",
            "Load testing and benchmarking before cut-over",
        ),
        risk(
            "Skill Gap",
            "High",
            "Medium",
            "Team training and knowledge transfer",
        ),
    ]
}

fn recommendations(difficulty: Difficulty, breaking_changes: usize, complexity: u8) -> Vec<String> {
    let mut recs: Vec<String> = [
        "Create detailed rollback plan before migration",
        "Establish comprehensive testing strategy",
        "Plan communication to stakeholders",
        "Set up monitoring and alerting for new system",
        "Document all changes and migration procedures",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if difficulty == Difficulty::VeryHard {
        recs.push("Run old and new systems in parallel for a transition period".to_string());
        recs.push("Plan for an extended stabilization period".to_string());
    }
    if complexity >= 8 {
        recs.push("Refactor the most complex modules before porting them".to_string());
    }
    if breaking_changes > 0 {
        recs.push(format!(
            "Address {} identified breaking changes",
            breaking_changes
        ));
    }
    recs
}
