use anyhow::Result;
use std::env;

use crate::config::Config;
use crate::llm::factory;

struct CheckResult {
    passed: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl CheckResult {
    fn new() -> Self {
        Self {
            passed: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn pass(&mut self, msg: impl Into<String>) {
        self.passed.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
}

pub async fn run(config_path: Option<String>) -> Result<()> {
    let mut results = CheckResult::new();

    let config = match Config::load_with_path(config_path.clone()) {
        Ok(config) => {
            let source = config_path.as_deref().unwrap_or("default search path");
            results.pass(format!("Config loaded from {}", source));
            config
        }
        Err(e) => {
            // Reported through print_results rather than propagated
            results.error(format!("Failed to load config: {}", e));
            print_results(&results);
            return Ok(());
        }
    };

    check_config(&config, &mut results);

    if results.errors.is_empty() {
        match factory::create_client(&config, false) {
            Ok(client) => {
                let endpoint = config.llm.get_base_url();
                if client.is_available().await {
                    results.pass(format!("Inference endpoint reachable: {}", endpoint));
                } else {
                    results.error(format!(
                        "Inference endpoint not reachable: {} (is the model server running?)",
                        endpoint
                    ));
                }
            }
            Err(e) => results.error(format!("Failed to create LLM client: {}", e)),
        }
    }

    print_results(&results);

    if !results.errors.is_empty() {
        anyhow::bail!("{} config error(s) found", results.errors.len());
    }
    Ok(())
}

/// Static checks that need no network.
fn check_config(config: &Config, results: &mut CheckResult) {
    match config.llm.provider.as_str() {
        "ollama" | "openai-compatible" => results.pass(format!(
            "LLM provider: {} (model: {})",
            config.llm.provider, config.llm.model
        )),
        other => results.error(format!(
            "Unknown LLM provider: {} (expected ollama or openai-compatible)",
            other
        )),
    }

    if config.llm.model.trim().is_empty() {
        results.error("llm.model is empty");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        results.warn(format!(
            "Temperature {} is outside the usual 0.0-2.0 range",
            config.llm.temperature
        ));
    }

    if config.llm.timeout_secs < 30 {
        results.warn(format!(
            "LLM timeout {}s is very short for local models",
            config.llm.timeout_secs
        ));
    }

    if let Some(ref var) = config.llm.api_key_env {
        if var.to_lowercase() != "none" {
            match env::var(var) {
                Ok(v) if !v.trim().is_empty() => results.pass(format!("{} is set", var)),
                _ => results.warn(format!(
                    "{} is not set (OK for local models, needed for gateways)",
                    var
                )),
            }
        }
    }

    if config.analysis.max_files == 0 {
        results.error("analysis.max_files must be at least 1");
    } else {
        results.pass(format!("Analysis limit: {} files", config.analysis.max_files));
    }

    match config.output.get_formats() {
        Ok(formats) if formats.is_empty() => results.error("output.formats is empty"),
        Ok(formats) => results.pass(format!(
            "Report formats: {}",
            formats
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )),
        Err(e) => results.error(e.to_string()),
    }

    if config.cache.enabled {
        if config.cache.ttl_hours == 0 {
            results.warn("cache.ttl_hours = 0 makes every entry expire immediately");
        }
        results.pass(format!(
            "Cache directory: {}",
            config.cache.get_dir().display()
        ));
    } else {
        results.warn("Cache disabled; every run re-executes all stages");
    }

    for (stage, overrides) in &config.stages {
        if let Some(ref policy) = overrides.policy {
            let known = matches!(
                policy.to_lowercase().as_str(),
                "fatal" | "best-effort" | "best_effort" | "besteffort"
            );
            if !known {
                results.warn(format!(
                    "stages.{}.policy = {:?} is not recognised; the stage default applies",
                    stage, policy
                ));
            }
        }
    }
}

fn print_results(results: &CheckResult) {
    println!();
    for msg in &results.passed {
        println!("  \u{2713} {}", msg);
    }
    for msg in &results.warnings {
        println!("  ! {}", msg);
    }
    for msg in &results.errors {
        println!("  \u{2717} {}", msg);
    }
    println!();
    println!(
        "{} passed, {} warnings, {} errors",
        results.passed.len(),
        results.warnings.len(),
        results.errors.len()
    );
}
