use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::CapabilityRegistry;
use crate::cache::CacheStore;
use crate::config::Config;
use crate::llm::factory;
use crate::parsers::ParserRegistry;
use crate::pipeline::{
    AnalysisOptions, Backend, Database, Frontend, Pipeline, PipelineContext, PipelineInput,
    RunStatus, StageOutcome, TargetStack,
};
use crate::report::ReportFormat;
use crate::repository::GitRepositoryProvider;

/// Everything `modernizer run` accepts on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub repo: Option<String>,
    pub requirements: Option<String>,
    pub backend: String,
    pub frontend: Option<String>,
    pub database: Option<String>,
    pub max_files: Option<usize>,
    pub max_file_size: Option<u64>,
    pub formats: Option<Vec<String>>,
    pub output: Option<String>,
    pub config: Option<String>,
    pub model: Option<String>,
    pub no_cache: bool,
    pub dry_run: bool,
}

fn target_stack(args: &RunArgs) -> Result<TargetStack> {
    let backend: Backend = args.backend.parse()?;
    let mut target = TargetStack::new(backend);
    if let Some(ref frontend) = args.frontend {
        target = target.with_frontend(frontend.parse::<Frontend>()?);
    }
    if let Some(ref database) = args.database {
        target = target.with_database(database.parse::<Database>()?);
    }
    Ok(target)
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(ref model) = args.model {
        info!("CLI override: model = {}", model);
        config.llm.model = model.clone();
    }
    if let Some(max_files) = args.max_files {
        info!("CLI override: max_files = {}", max_files);
        config.analysis.max_files = max_files;
    }
    if let Some(max_file_size) = args.max_file_size {
        info!("CLI override: max_file_size_bytes = {}", max_file_size);
        config.analysis.max_file_size_bytes = max_file_size;
    }
    if let Some(ref formats) = args.formats {
        info!("CLI override: formats = {}", formats.join(","));
        config.output.formats = formats.clone();
    }
    if let Some(ref output) = args.output {
        info!("CLI override: output = {}", output);
        config.output.dir = PathBuf::from(output);
    }
    if args.no_cache {
        info!("CLI override: cache disabled");
        config.cache.enabled = false;
    }
}

/// Build the input for one run from the command line.
pub fn build_input(args: &RunArgs, config: &Config) -> Result<PipelineInput> {
    if args.repo.is_none() && args.requirements.is_none() {
        bail!("Nothing to analyze: pass --repo, --requirements, or both");
    }

    let mut input = PipelineInput::new(target_stack(args)?)
        .with_options(AnalysisOptions::from(config.analysis.clone()));
    if let Some(ref repo) = args.repo {
        input = input.with_repository(repo.clone());
    }
    if let Some(ref path) = args.requirements {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read requirements file {}", path))?;
        input = input.with_requirements(text);
    }
    Ok(input)
}

/// Build the pipeline context from config: cache, repository provider,
/// parsers and the model client.
pub fn build_context(config: Config, dry_run: bool) -> Result<PipelineContext> {
    let cache = CacheStore::from_config(&config.cache);

    let client = factory::create_client(&config, dry_run)?;
    if dry_run {
        info!("Using mock LLM client");
    } else {
        info!(
            "Using {} LLM provider ({})",
            config.llm.provider, config.llm.model
        );
    }

    let capabilities = CapabilityRegistry::new()
        .with_repository(Arc::new(GitRepositoryProvider::from_config(&config.github)))
        .with_parsers(Arc::new(ParserRegistry::with_defaults()?))
        .with_inference(Arc::from(client));

    Ok(PipelineContext::new(config, Arc::new(cache), capabilities))
}

pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = Config::load_with_path(args.config.clone())?;
    apply_overrides(&mut config, &args);

    let formats: Vec<ReportFormat> = config.output.get_formats()?;
    let input = build_input(&args, &config)?;
    let output_root = config.output.dir.clone();

    let pipeline = Pipeline::new(build_context(config, args.dry_run)?)?;
    let (run, bundle) = pipeline.run_and_assemble(&input, &formats).await?;

    let summary = run.summary();
    info!(
        "Stages: {} fresh, {} cached, {} failed, {} skipped",
        summary.fresh, summary.cached, summary.failed, summary.skipped
    );
    for record in &run.history {
        if let StageOutcome::Failed { ref cause, .. } = record.outcome {
            warn!("  ✗ {}/{}: {}", record.chain, record.stage, cause);
        }
    }

    let bundle = match bundle {
        Ok(bundle) => bundle,
        Err(e) => bail!(
            "Run {} finished {} but no bundle was produced: {}",
            run.run_id,
            run.status,
            e
        ),
    };
    let dir = output_root.join(run.run_id.to_string());
    let archive = bundle
        .write_to(&dir)
        .with_context(|| format!("Failed to write bundle to {}", dir.display()))?;

    info!("  ✓ Report bundle: {}", archive.display());
    if run.status == RunStatus::Failed {
        bail!("Run {} failed", run.run_id);
    }
    Ok(())
}
