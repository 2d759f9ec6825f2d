//! Sequential composition of agents.
//!
//! Each stage sees only the keys it declares it consumes, drawn from the
//! accumulated data of the seed and every earlier stage. Results are cached
//! by (category, stage input); a live hit replaces execution entirely.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::context::PipelineContext;
use super::stage::{ExecutionRecord, StageData, StageOutcome, StagePolicy, StageResult};
use crate::agent::Agent;

pub struct ChainStage {
    pub agent: Arc<dyn Agent>,
    pub policy: StagePolicy,
    pub max_retries: usize,
}

pub struct Chain {
    name: String,
    stages: Vec<ChainStage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub fresh: usize,
    pub cached: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ChainResult {
    pub chain: String,
    /// One per stage that ran or was served from cache, placeholders included.
    pub results: Vec<StageResult>,
    pub records: Vec<ExecutionRecord>,
    /// Seed plus every result merged in stage order.
    pub data: StageData,
    /// A fatal stage failed; later stages (and chains) did not run.
    pub aborted: bool,
}

impl ChainResult {
    pub fn summary(&self) -> ChainSummary {
        summarize(&self.records)
    }
}

pub fn summarize(records: &[ExecutionRecord]) -> ChainSummary {
    let mut summary = ChainSummary::default();
    for record in records {
        match record.outcome {
            StageOutcome::Fresh => summary.fresh += 1,
            StageOutcome::Cached => summary.cached += 1,
            StageOutcome::Failed { .. } => summary.failed += 1,
            StageOutcome::Skipped => summary.skipped += 1,
        }
    }
    summary
}

/// The consumed subset of `data`.
fn stage_input(data: &StageData, consumes: &[&str]) -> StageData {
    consumes
        .iter()
        .filter_map(|key| data.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

fn merge(into: &mut StageData, result: &StageResult) {
    for (key, value) in &result.data {
        into.insert(key.clone(), value.clone());
    }
}

impl Chain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, agent: Arc<dyn Agent>, policy: StagePolicy, max_retries: usize) -> Self {
        self.stages.push(ChainStage {
            agent,
            policy,
            max_retries,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[ChainStage] {
        &self.stages
    }

    /// Records marking every stage as skipped, for chains after an abort.
    pub fn skipped_records(&self) -> Vec<ExecutionRecord> {
        self.stages
            .iter()
            .map(|stage| self.record(stage, StageOutcome::Skipped, 0, 0))
            .collect()
    }

    fn record(
        &self,
        stage: &ChainStage,
        outcome: StageOutcome,
        duration_ms: u64,
        attempts: usize,
    ) -> ExecutionRecord {
        ExecutionRecord {
            chain: self.name.clone(),
            stage: stage.agent.name().to_string(),
            policy: stage.policy,
            started_at: Utc::now(),
            duration_ms,
            outcome,
            attempts,
        }
    }

    pub async fn run(&self, initial: &StageData, ctx: &PipelineContext) -> ChainResult {
        info!("Running {} chain ({} stages)", self.name, self.stages.len());
        let mut result = ChainResult {
            chain: self.name.clone(),
            results: Vec::new(),
            records: Vec::new(),
            data: initial.clone(),
            aborted: false,
        };

        for (index, stage) in self.stages.iter().enumerate() {
            let agent = &stage.agent;
            let input = stage_input(&result.data, agent.consumes());
            let key = Value::Object(input.clone());
            let started_at = Utc::now();
            let started = Instant::now();

            if let Some(cached) = ctx.cache.get::<StageResult>(agent.cache_category(), &key) {
                info!("  ✓ {} (cached)", agent.name());
                merge(&mut result.data, &cached);
                result.results.push(cached);
                let mut record = self.record(stage, StageOutcome::Cached, 0, 0);
                record.started_at = started_at;
                record.duration_ms = started.elapsed().as_millis() as u64;
                result.records.push(record);
                continue;
            }

            let mut attempts = 0;
            let outcome = loop {
                attempts += 1;
                debug!("  → {} attempt {}", agent.name(), attempts);
                match agent.run(&input, ctx).await {
                    Ok(stage_result) => break Ok(stage_result),
                    Err(e) if e.is_retryable() && attempts <= stage.max_retries => {
                        warn!(
                            "  ✗ {} failed (attempt {} of {}): {}",
                            agent.name(),
                            attempts,
                            stage.max_retries + 1,
                            e
                        );
                    }
                    Err(e) => break Err(e),
                }
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(stage_result) => {
                    info!("  ✓ {} ({} ms)", agent.name(), duration_ms);
                    ctx.cache.set(
                        agent.cache_category(),
                        &key,
                        &stage_result,
                        ctx.cache.default_ttl(),
                    );
                    merge(&mut result.data, &stage_result);
                    result.results.push(stage_result);
                    let mut record = self.record(stage, StageOutcome::Fresh, duration_ms, attempts);
                    record.started_at = started_at;
                    result.records.push(record);
                }
                Err(e) => {
                    let fatal = stage.policy == StagePolicy::Fatal;
                    let outcome = StageOutcome::Failed {
                        cause: e.to_string(),
                        fatal,
                    };
                    let mut record = self.record(stage, outcome, duration_ms, attempts);
                    record.started_at = started_at;
                    result.records.push(record);

                    if fatal {
                        warn!("  ✗ {} failed, aborting {} chain: {}", agent.name(), self.name, e);
                        result.aborted = true;
                        for rest in &self.stages[index + 1..] {
                            result
                                .records
                                .push(self.record(rest, StageOutcome::Skipped, 0, 0));
                        }
                        break;
                    }

                    warn!("  ✗ {} failed, continuing with placeholder: {}", agent.name(), e);
                    let placeholder = StageResult::placeholder(agent.name(), agent.placeholder());
                    merge(&mut result.data, &placeholder);
                    result.results.push(placeholder);
                }
            }
        }

        let summary = result.summary();
        info!(
            "{} chain done: {} fresh, {} cached, {} failed, {} skipped",
            self.name, summary.fresh, summary.cached, summary.failed, summary.skipped
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{CapabilityKind, CapabilityRegistry, ExecutionLog};
    use crate::cache::CacheStore;
    use crate::config::Config;
    use crate::error::AgentExecutionError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Copies each consumed key to `<name>.<key>` and fails the first
    /// `failures` calls.
    struct TestAgent {
        name: &'static str,
        consumes: &'static [&'static str],
        failures: usize,
        needs_inference: bool,
        calls: AtomicUsize,
        log: ExecutionLog,
    }

    impl TestAgent {
        fn new(name: &'static str, consumes: &'static [&'static str]) -> Self {
            Self {
                name,
                consumes,
                failures: 0,
                needs_inference: false,
                calls: AtomicUsize::new(0),
                log: ExecutionLog::new(),
            }
        }

        fn failing(mut self, failures: usize) -> Self {
            self.failures = failures;
            self
        }

        fn needing_inference(mut self) -> Self {
            self.needs_inference = true;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Agent for TestAgent {
        fn name(&self) -> &'static str {
            self.name
        }

        fn cache_category(&self) -> &'static str {
            self.name
        }

        fn consumes(&self) -> &'static [&'static str] {
            self.consumes
        }

        fn required_capabilities(&self) -> &'static [CapabilityKind] {
            if self.needs_inference {
                &[CapabilityKind::Inference]
            } else {
                &[]
            }
        }

        fn default_policy(&self) -> StagePolicy {
            StagePolicy::BestEffort
        }

        fn placeholder(&self) -> StageData {
            let mut data = StageData::new();
            data.insert(format!("{}_out", self.name), json!(null));
            data
        }

        fn log(&self) -> &ExecutionLog {
            &self.log
        }

        async fn execute(
            &self,
            input: &StageData,
            _ctx: &PipelineContext,
        ) -> Result<StageData, AgentExecutionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(AgentExecutionError::new(
                    self.name,
                    String::new(),
                    anyhow::anyhow!("boom"),
                ));
            }
            let mut out = StageData::new();
            out.insert(format!("{}_out", self.name), json!(input.len()));
            for (key, value) in input {
                out.insert(format!("{}.{}", self.name, key), value.clone());
            }
            Ok(out)
        }
    }

    fn context(cache: CacheStore) -> PipelineContext {
        PipelineContext::new(Config::default(), Arc::new(cache), CapabilityRegistry::new())
    }

    fn seed() -> StageData {
        let mut seed = StageData::new();
        seed.insert("repository".to_string(), json!("acme/widgets"));
        seed.insert("unrelated".to_string(), json!(true));
        seed
    }

    #[tokio::test]
    async fn test_stage_sees_only_consumed_keys_from_upstream() {
        let first = Arc::new(TestAgent::new("first", &["repository"]));
        let second = Arc::new(TestAgent::new("second", &["first_out", "repository"]));
        let chain = Chain::new("analysis")
            .stage(first, StagePolicy::Fatal, 0)
            .stage(second, StagePolicy::Fatal, 0);

        let result = chain.run(&seed(), &context(CacheStore::disabled())).await;
        assert!(!result.aborted);
        assert_eq!(result.results.len(), 2);
        let second_out = &result.results[1].data;
        assert_eq!(second_out["second.first_out"], json!(1));
        assert_eq!(second_out["second.repository"], json!("acme/widgets"));
        assert!(!second_out.contains_key("second.unrelated"));
        assert_eq!(result.summary().fresh, 2);
    }

    #[tokio::test]
    async fn test_best_effort_failure_uses_placeholder() {
        let flaky = Arc::new(TestAgent::new("flaky", &["repository"]).failing(10));
        let after = Arc::new(TestAgent::new("after", &["flaky_out"]));
        let chain = Chain::new("analysis")
            .stage(flaky, StagePolicy::BestEffort, 0)
            .stage(after.clone(), StagePolicy::Fatal, 0);

        let result = chain.run(&seed(), &context(CacheStore::disabled())).await;
        assert!(!result.aborted);
        assert!(!result.results[0].success);
        assert!(result.records[0].outcome.is_failure());
        assert_eq!(after.calls(), 1);
        assert_eq!(result.results[1].data["after.flaky_out"], json!(null));
    }

    #[tokio::test]
    async fn test_fatal_failure_skips_rest() {
        let broken = Arc::new(TestAgent::new("broken", &["repository"]).failing(10));
        let never = Arc::new(TestAgent::new("never", &["repository"]));
        let chain = Chain::new("migration")
            .stage(broken, StagePolicy::Fatal, 0)
            .stage(never.clone(), StagePolicy::Fatal, 0);

        let result = chain.run(&seed(), &context(CacheStore::disabled())).await;
        assert!(result.aborted);
        assert!(result.results.is_empty());
        assert_eq!(never.calls(), 0);
        assert_eq!(result.records[1].outcome, StageOutcome::Skipped);
        match &result.records[0].outcome {
            StageOutcome::Failed { cause, fatal } => {
                assert!(fatal);
                assert!(cause.contains("boom"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let flaky = Arc::new(TestAgent::new("flaky", &["repository"]).failing(2));
        let chain = Chain::new("analysis").stage(flaky.clone(), StagePolicy::Fatal, 2);
        let result = chain.run(&seed(), &context(CacheStore::disabled())).await;
        assert!(!result.aborted);
        assert_eq!(flaky.calls(), 3);
        assert_eq!(result.records[0].attempts, 3);
        assert_eq!(result.records[0].outcome, StageOutcome::Fresh);
    }

    #[tokio::test]
    async fn test_missing_capability_is_not_retried() {
        let agent = Arc::new(TestAgent::new("needy", &["repository"]).needing_inference());
        let chain = Chain::new("analysis").stage(agent.clone(), StagePolicy::BestEffort, 3);
        let result = chain.run(&seed(), &context(CacheStore::disabled())).await;
        assert_eq!(agent.calls(), 0);
        assert_eq!(result.records[0].attempts, 1);
        assert!(result.records[0].outcome.is_failure());
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let ctx = context(CacheStore::new(dir.path(), Duration::from_secs(3600)));
        let agent = Arc::new(TestAgent::new("first", &["repository"]));
        let chain = Chain::new("analysis").stage(agent.clone(), StagePolicy::Fatal, 0);

        let first = chain.run(&seed(), &ctx).await;
        let second = chain.run(&seed(), &ctx).await;
        assert_eq!(agent.calls(), 1);
        assert_eq!(second.records[0].outcome, StageOutcome::Cached);
        assert_eq!(
            serde_json::to_string(&first.results).unwrap(),
            serde_json::to_string(&second.results).unwrap()
        );

        // a key the stage does not consume does not affect its cache key
        let mut other_seed = seed();
        other_seed.insert("unrelated".to_string(), json!(false));
        let third = chain.run(&other_seed, &ctx).await;
        assert_eq!(third.records[0].outcome, StageOutcome::Cached);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let ctx = context(CacheStore::new(dir.path(), Duration::from_secs(3600)));
        let agent = Arc::new(TestAgent::new("flaky", &["repository"]).failing(1));
        let chain = Chain::new("analysis").stage(agent.clone(), StagePolicy::BestEffort, 0);

        let first = chain.run(&seed(), &ctx).await;
        assert!(first.records[0].outcome.is_failure());
        let second = chain.run(&seed(), &ctx).await;
        assert_eq!(second.records[0].outcome, StageOutcome::Fresh);
        assert_eq!(agent.calls(), 2);
    }

    /// Completes after a delay, then raises a flag the next stage checks.
    struct SlowAgent {
        done: Arc<std::sync::atomic::AtomicBool>,
        log: ExecutionLog,
    }

    /// Fails if it runs before `SlowAgent` finished.
    struct GuardAgent {
        predecessor_done: Arc<std::sync::atomic::AtomicBool>,
        log: ExecutionLog,
    }

    #[async_trait]
    impl Agent for SlowAgent {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn cache_category(&self) -> &'static str {
            "slow"
        }
        fn consumes(&self) -> &'static [&'static str] {
            &["repository"]
        }
        fn required_capabilities(&self) -> &'static [CapabilityKind] {
            &[]
        }
        fn default_policy(&self) -> StagePolicy {
            StagePolicy::Fatal
        }
        fn placeholder(&self) -> StageData {
            StageData::new()
        }
        fn log(&self) -> &ExecutionLog {
            &self.log
        }
        async fn execute(
            &self,
            _input: &StageData,
            _ctx: &PipelineContext,
        ) -> Result<StageData, AgentExecutionError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.done.store(true, Ordering::SeqCst);
            let mut out = StageData::new();
            out.insert("slow_out".to_string(), json!("ready"));
            Ok(out)
        }
    }

    #[async_trait]
    impl Agent for GuardAgent {
        fn name(&self) -> &'static str {
            "guard"
        }
        fn cache_category(&self) -> &'static str {
            "guard"
        }
        fn consumes(&self) -> &'static [&'static str] {
            &["slow_out"]
        }
        fn required_capabilities(&self) -> &'static [CapabilityKind] {
            &[]
        }
        fn default_policy(&self) -> StagePolicy {
            StagePolicy::Fatal
        }
        fn placeholder(&self) -> StageData {
            StageData::new()
        }
        fn log(&self) -> &ExecutionLog {
            &self.log
        }
        async fn execute(
            &self,
            input: &StageData,
            _ctx: &PipelineContext,
        ) -> Result<StageData, AgentExecutionError> {
            if !self.predecessor_done.load(Ordering::SeqCst) || input.get("slow_out").is_none() {
                return Err(AgentExecutionError::new(
                    "guard",
                    String::new(),
                    anyhow::anyhow!("ran before its predecessor finished"),
                ));
            }
            Ok(StageData::new())
        }
    }

    #[tokio::test]
    async fn test_stage_waits_for_predecessor() {
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let chain = Chain::new("analysis")
            .stage(
                Arc::new(SlowAgent {
                    done: done.clone(),
                    log: ExecutionLog::new(),
                }),
                StagePolicy::Fatal,
                0,
            )
            .stage(
                Arc::new(GuardAgent {
                    predecessor_done: done,
                    log: ExecutionLog::new(),
                }),
                StagePolicy::Fatal,
                0,
            );
        let result = chain.run(&seed(), &context(CacheStore::disabled())).await;
        assert!(!result.aborted);
        assert_eq!(result.summary().fresh, 2);
    }
}
