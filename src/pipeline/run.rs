use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::chain::{summarize, Chain, ChainSummary};
use super::context::PipelineContext;
use super::input::PipelineInput;
use super::stage::{ExecutionRecord, RunStatus, StageOutcome, StageResult};
use crate::agent::{Agent, CodeGenerator, DocGenerator, MigrationPlanner, RepoAnalyzer, TechDetector};
use crate::error::{AssemblyError, PipelineError};
use crate::report::{self, Bundle, ReportFormat};

/// Full record of one end-to-end invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub input: PipelineInput,
    pub results: Vec<StageResult>,
    pub status: RunStatus,
    pub history: Vec<ExecutionRecord>,
}

impl PipelineRun {
    fn start(input: PipelineInput) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            input,
            results: Vec::new(),
            status: RunStatus::InProgress,
            history: Vec::new(),
        }
    }

    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage == stage)
    }

    pub fn summary(&self) -> ChainSummary {
        summarize(&self.history)
    }

    fn finish(&mut self) {
        let first_failed_fatally = matches!(
            self.history.first().map(|r| &r.outcome),
            Some(StageOutcome::Failed { fatal: true, .. })
        );
        self.status = if first_failed_fatally {
            RunStatus::Failed
        } else if self.history.iter().any(|r| r.outcome.is_failure()) {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Succeeded
        };
        self.finished_at = Some(Utc::now());
    }
}

pub struct Pipeline {
    ctx: PipelineContext,
    chains: Vec<Chain>,
}

fn configured(ctx: &PipelineContext, chain: Chain, agent: Arc<dyn Agent>) -> Chain {
    let policy = ctx.config.stage_policy(agent.name(), agent.default_policy());
    let retries = ctx.config.stage_retries(agent.name());
    chain.stage(agent, policy, retries)
}

impl Pipeline {
    /// The standard analysis, migration and report chains. The report chain
    /// only generates documents; bundle assembly happens after the run in
    /// `run_and_assemble`.
    pub fn new(ctx: PipelineContext) -> Result<Self, PipelineError> {
        let analysis = Chain::new("analysis");
        let analysis = configured(&ctx, analysis, Arc::new(RepoAnalyzer::new()));
        let analysis = configured(&ctx, analysis, Arc::new(TechDetector::new()));

        let migration = Chain::new("migration");
        let migration = configured(&ctx, migration, Arc::new(MigrationPlanner::new()));
        let migration = configured(&ctx, migration, Arc::new(CodeGenerator::new()));

        let report = Chain::new("report");
        let report = configured(&ctx, report, Arc::new(DocGenerator::new()));

        Self::with_chains(ctx, vec![analysis, migration, report])
    }

    /// A pipeline over arbitrary chains. Capabilities are checked up front.
    pub fn with_chains(ctx: PipelineContext, chains: Vec<Chain>) -> Result<Self, PipelineError> {
        for chain in &chains {
            for stage in chain.stages() {
                ctx.capabilities
                    .check(stage.agent.name(), stage.agent.required_capabilities())?;
            }
        }
        Ok(Self { ctx, chains })
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub async fn run(&self, input: &PipelineInput) -> Result<PipelineRun, PipelineError> {
        if let Ok(llm) = self.ctx.capabilities.inference("pipeline") {
            if !llm.is_available().await {
                return Err(PipelineError::InferenceUnavailable {
                    endpoint: self.ctx.config.llm.get_base_url(),
                });
            }
        }

        let mut run = PipelineRun::start(input.clone());
        info!("Starting run {} -> {}", run.run_id, input.target);

        let mut data = input.seed();
        let mut aborted = false;
        for chain in &self.chains {
            if aborted {
                run.history.extend(chain.skipped_records());
                continue;
            }
            let result = chain.run(&data, &self.ctx).await;
            run.results.extend(result.results);
            run.history.extend(result.records);
            data = result.data;
            aborted = result.aborted;
        }

        run.finish();
        let summary = run.summary();
        match run.status {
            RunStatus::Succeeded => info!(
                "Run {} succeeded ({} fresh, {} cached)",
                run.run_id, summary.fresh, summary.cached
            ),
            status => warn!(
                "Run {} {} ({} failed, {} skipped)",
                run.run_id, status, summary.failed, summary.skipped
            ),
        }
        Ok(run)
    }

    /// Run, then assemble the report bundle. Assembly failure does not
    /// discard the run.
    pub async fn run_and_assemble(
        &self,
        input: &PipelineInput,
        formats: &[ReportFormat],
    ) -> Result<(PipelineRun, Result<Bundle, AssemblyError>), PipelineError> {
        let run = self.run(input).await?;
        let bundle = report::assemble(&run, formats);
        Ok((run, bundle))
    }
}
