//! End-to-end runs of the standard pipeline against a fixture repository.
//!
//! The repository provider serves "acme/widgets" from a temporary directory
//! and counts fetches; the model is the offline mock client. Together they
//! show when a run touched a collaborator and when it was served from cache.

use anyhow::Result;
use async_trait::async_trait;
use modernizer::agent::CapabilityRegistry;
use modernizer::cache::CacheStore;
use modernizer::config::Config;
use modernizer::error::RepositoryError;
use modernizer::llm::MockLlmClient;
use modernizer::parsers::ParserRegistry;
use modernizer::pipeline::{
    AnalysisOptions, Backend, Database, Frontend, Pipeline, PipelineContext, PipelineInput,
    RunStatus, TargetStack,
};
use modernizer::report::{self, ReportFormat};
use modernizer::repository::snapshot::walk;
use modernizer::repository::{
    GitRepositoryProvider, RepoMetadata, RepoSnapshot, RepositoryProvider,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct FixtureRepository {
    root: PathBuf,
    fetches: AtomicUsize,
}

impl FixtureRepository {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryProvider for FixtureRepository {
    async fn fetch(
        &self,
        reference: &str,
        options: &AnalysisOptions,
    ) -> Result<RepoSnapshot, RepositoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if reference != "acme/widgets" {
            return Err(RepositoryError::Unreachable {
                reference: reference.to_string(),
                reason: "not found".to_string(),
            });
        }
        let files = walk(&self.root, options)?;
        let metadata = RepoMetadata {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
            full_name: "acme/widgets".to_string(),
            default_branch: Some("main".to_string()),
            size_bytes: files.iter().map(|f| f.size_bytes).sum(),
        };
        Ok(RepoSnapshot::new(self.root.clone(), metadata, files))
    }
}

fn write_fixture(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("widgets"))?;
    fs::create_dir_all(root.join("templates"))?;
    fs::write(
        root.join("app.py"),
        r#"from flask import Flask, jsonify
from widgets.models import Widget
import sqlalchemy

app = Flask(__name__)


@app.route("/widgets")
def list_widgets():
    return jsonify([w.to_dict() for w in Widget.query.all()])


if __name__ == "__main__":
    app.run()
"#,
    )?;
    fs::write(
        root.join("widgets/models.py"),
        r#"from flask_sqlalchemy import SQLAlchemy

db = SQLAlchemy()


class Widget(db.Model):
    id = db.Column(db.Integer, primary_key=True)
    name = db.Column(db.String(80))

    def to_dict(self):
        return {"id": self.id, "name": self.name}
"#,
    )?;
    fs::write(root.join("widgets/__init__.py"), "")?;
    fs::write(
        root.join("requirements.txt"),
        "flask==1.1.2\nflask-sqlalchemy==2.4.4\npsycopg2==2.8.6\n",
    )?;
    fs::write(root.join("templates/index.html"), "<h1>Widgets</h1>\n")?;
    Ok(())
}

fn target() -> TargetStack {
    TargetStack::new(Backend::FastApi)
        .with_frontend(Frontend::React)
        .with_database(Database::PostgreSql)
}

fn context(
    repo: Arc<FixtureRepository>,
    llm: Arc<MockLlmClient>,
    cache: Arc<CacheStore>,
) -> PipelineContext {
    let capabilities = CapabilityRegistry::new()
        .with_repository(repo)
        .with_parsers(Arc::new(ParserRegistry::with_defaults().unwrap()))
        .with_inference(llm);
    PipelineContext::new(Config::default(), cache, capabilities)
}

const ALL_FORMATS: [ReportFormat; 3] = [ReportFormat::Markdown, ReportFormat::Html, ReportFormat::Json];

#[tokio::test]
async fn test_acme_widgets_fresh_then_cached() -> Result<()> {
    let fixture = TempDir::new()?;
    write_fixture(fixture.path())?;
    let cache_dir = TempDir::new()?;

    let repo = Arc::new(FixtureRepository::new(fixture.path()));
    let llm = Arc::new(MockLlmClient::new());
    let cache = Arc::new(CacheStore::new(cache_dir.path(), Duration::from_secs(3600)));
    let pipeline = Pipeline::new(context(repo.clone(), llm.clone(), cache))?;

    let input = PipelineInput::new(target())
        .with_repository("acme/widgets")
        .with_requirements("Customers browse and order widgets.");

    let (first, bundle) = pipeline.run_and_assemble(&input, &ALL_FORMATS).await?;
    assert_eq!(first.status, RunStatus::Succeeded);
    assert!(first.history.iter().all(|r| r.outcome.label() == "fresh"));
    assert_eq!(repo.fetches(), 1);
    let calls_after_first = llm.call_count();
    assert!(calls_after_first >= 5);

    let analysis = first.result("repo_analyzer").unwrap();
    assert_eq!(analysis.data["primary_language"], "python");
    assert_eq!(
        analysis.data["repository_metadata"]["full_name"],
        "acme/widgets"
    );

    let bundle = bundle?;
    assert_eq!(bundle.paths_under("docs/").len(), 9);
    assert_eq!(bundle.paths_under("artifacts/").len(), 5);
    assert_eq!(
        bundle.paths_under("reports/"),
        vec!["reports/report.md", "reports/report.html", "reports/report.json"]
    );
    assert_eq!(bundle.manifest.len(), 17);
    assert!(bundle.file("docs/01-executive-summary.md").is_some());
    assert!(bundle.file("artifacts/backend/app/main.py").is_some());

    // Same input again: every stage from cache, no collaborator touched
    let second = pipeline.run(&input).await?;
    assert_eq!(second.status, RunStatus::Succeeded);
    assert!(second.history.iter().all(|r| r.outcome.label() == "cached"));
    assert!(second.history.iter().all(|r| r.attempts == 0));
    assert_eq!(repo.fetches(), 1);
    assert_eq!(llm.call_count(), calls_after_first);
    assert_ne!(first.run_id, second.run_id);

    assert_eq!(first.results.len(), second.results.len());
    for (a, b) in first.results.iter().zip(&second.results) {
        assert_eq!(serde_json::to_vec(a)?, serde_json::to_vec(b)?);
    }
    Ok(())
}

#[tokio::test]
async fn test_disabled_cache_reexecutes_every_stage() -> Result<()> {
    let fixture = TempDir::new()?;
    write_fixture(fixture.path())?;
    let repo = Arc::new(FixtureRepository::new(fixture.path()));
    let llm = Arc::new(MockLlmClient::new());
    let pipeline = Pipeline::new(context(
        repo.clone(),
        llm.clone(),
        Arc::new(CacheStore::disabled()),
    ))?;
    let input = PipelineInput::new(target()).with_repository("acme/widgets");

    let first = pipeline.run(&input).await?;
    let second = pipeline.run(&input).await?;
    assert_eq!(repo.fetches(), 2);
    assert!(second.history.iter().all(|r| r.outcome.label() == "fresh"));

    // Idempotence: same input, same stage data
    for (a, b) in first.results.iter().zip(&second.results) {
        assert_eq!(a.stage, b.stage);
        assert_eq!(a.data, b.data);
    }
    Ok(())
}

#[tokio::test]
async fn test_changed_target_misses_downstream_cache() -> Result<()> {
    let fixture = TempDir::new()?;
    write_fixture(fixture.path())?;
    let cache_dir = TempDir::new()?;
    let repo = Arc::new(FixtureRepository::new(fixture.path()));
    let llm = Arc::new(MockLlmClient::new());
    let cache = Arc::new(CacheStore::new(cache_dir.path(), Duration::from_secs(3600)));
    let pipeline = Pipeline::new(context(repo.clone(), llm, cache))?;

    pipeline
        .run(&PipelineInput::new(target()).with_repository("acme/widgets"))
        .await?;
    let other = PipelineInput::new(TargetStack::new(Backend::Django)).with_repository("acme/widgets");
    let run = pipeline.run(&other).await?;

    let outcomes: Vec<&str> = run.history.iter().map(|r| r.outcome.label()).collect();
    // Analysis does not consume the target stack; migration and report do
    assert_eq!(outcomes, vec!["cached", "cached", "fresh", "fresh", "fresh"]);
    assert_eq!(repo.fetches(), 1);
    Ok(())
}

#[tokio::test]
async fn test_best_effort_failure_uses_placeholder() -> Result<()> {
    let fixture = TempDir::new()?;
    write_fixture(fixture.path())?;
    let repo = Arc::new(FixtureRepository::new(fixture.path()));
    let llm = Arc::new(MockLlmClient::new().failing_on(modernizer::llm::prompts::MATURITY_MARKER));
    let pipeline = Pipeline::new(context(repo, llm, Arc::new(CacheStore::disabled())))?;

    let (run, bundle) = pipeline
        .run_and_assemble(
            &PipelineInput::new(target()).with_repository("acme/widgets"),
            &[ReportFormat::Json],
        )
        .await?;
    assert_eq!(run.status, RunStatus::PartiallyFailed);
    let outcomes: Vec<&str> = run.history.iter().map(|r| r.outcome.label()).collect();
    assert_eq!(outcomes, vec!["fresh", "failed", "fresh", "fresh", "fresh"]);

    let tech = run.result("tech_detector").unwrap();
    assert!(!tech.success);
    assert_eq!(tech.data["tech_stack"]["maturity"], "unknown");

    // A best-effort failure does not stop the bundle
    let bundle = bundle?;
    assert_eq!(bundle.paths_under("docs/").len(), 9);
    Ok(())
}

#[tokio::test]
async fn test_unknown_repository_fails_run_and_assembly() -> Result<()> {
    let fixture = TempDir::new()?;
    let repo = Arc::new(FixtureRepository::new(fixture.path()));
    let llm = Arc::new(MockLlmClient::new());
    let pipeline = Pipeline::new(context(repo, llm.clone(), Arc::new(CacheStore::disabled())))?;

    let (run, bundle) = pipeline
        .run_and_assemble(
            &PipelineInput::new(target()).with_repository("acme/gadgets"),
            &[ReportFormat::Markdown],
        )
        .await?;
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.results.is_empty());
    assert_eq!(run.summary().skipped, 4);
    assert_eq!(llm.call_count(), 0);
    assert_eq!(
        bundle.unwrap_err(),
        modernizer::error::AssemblyError::MissingFatalStage("repo_analyzer".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_assembly_is_deterministic_for_a_timestamp() -> Result<()> {
    let fixture = TempDir::new()?;
    write_fixture(fixture.path())?;
    let repo = Arc::new(FixtureRepository::new(fixture.path()));
    let llm = Arc::new(MockLlmClient::new());
    let pipeline = Pipeline::new(context(repo, llm, Arc::new(CacheStore::disabled())))?;
    let run = pipeline
        .run(&PipelineInput::new(target()).with_repository("acme/widgets"))
        .await?;

    let at = chrono::Utc::now();
    let a = report::assemble_at(&run, &ALL_FORMATS, at)?;
    let b = report::assemble_at(&run, &ALL_FORMATS, at)?;
    assert_eq!(a, b);
    assert_eq!(a.manifest_json()?, b.manifest_json()?);

    let out = TempDir::new()?;
    let archive = a.write_to(out.path())?;
    assert!(archive.ends_with("bundle.tar.gz"));
    assert!(out.path().join("docs/09-migration-plan.md").exists());
    Ok(())
}

#[tokio::test]
async fn test_expired_entries_rerun_stages() -> Result<()> {
    let fixture = TempDir::new()?;
    write_fixture(fixture.path())?;
    let cache_dir = TempDir::new()?;
    let repo = Arc::new(FixtureRepository::new(fixture.path()));
    let llm = Arc::new(MockLlmClient::new());
    let cache = Arc::new(CacheStore::new(cache_dir.path(), Duration::from_millis(500)));
    let pipeline = Pipeline::new(context(repo.clone(), llm, cache))?;
    let input = PipelineInput::new(target()).with_requirements("Widgets, but faster.");

    pipeline.run(&input).await?;
    let hit = pipeline.run(&input).await?;
    assert!(hit.history.iter().all(|r| r.outcome.label() == "cached"));

    tokio::time::sleep(Duration::from_millis(700)).await;
    let miss = pipeline.run(&input).await?;
    assert!(miss.history.iter().all(|r| r.outcome.label() == "fresh"));
    Ok(())
}

#[tokio::test]
async fn test_local_tree_edit_invalidates_cached_analysis() -> Result<()> {
    let tree = TempDir::new()?;
    fs::write(tree.path().join("app.py"), "import flask\n\ndef main():\n    pass\n")?;
    let cache_dir = TempDir::new()?;
    let cache = Arc::new(CacheStore::new(cache_dir.path(), Duration::from_secs(3600)));
    let capabilities = CapabilityRegistry::new()
        .with_repository(Arc::new(GitRepositoryProvider::new()))
        .with_parsers(Arc::new(ParserRegistry::with_defaults()?))
        .with_inference(Arc::new(MockLlmClient::new()));
    let pipeline = Pipeline::new(PipelineContext::new(Config::default(), cache, capabilities))?;

    let input = PipelineInput::new(target()).with_repository(tree.path().to_string_lossy());
    let first = pipeline.run(&input).await?;
    assert_eq!(first.result("repo_analyzer").unwrap().data["primary_language"], "python");

    // The same tree reached through another spelling of its path is a hit
    let dotted = PipelineInput::new(target())
        .with_repository(tree.path().join(".").to_string_lossy());
    let again = pipeline.run(&dotted).await?;
    assert_eq!(again.history[0].outcome.label(), "cached");

    fs::remove_file(tree.path().join("app.py"))?;
    fs::write(
        tree.path().join("index.js"),
        "const express = require('express');\n",
    )?;
    let edited = pipeline.run(&input).await?;
    assert_eq!(edited.history[0].outcome.label(), "fresh");
    assert_eq!(
        edited.result("repo_analyzer").unwrap().data["primary_language"],
        "javascript"
    );
    Ok(())
}
