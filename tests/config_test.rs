//! Configuration loading and defaults.

use anyhow::Result;
use modernizer::config::Config;
use modernizer::pipeline::StagePolicy;
use modernizer::report::ReportFormat;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_has_defaults() -> Result<()> {
    let config = Config::default();

    assert_eq!(config.llm.provider, "ollama");
    assert!(!config.llm.model.is_empty());
    assert_eq!(config.llm.get_base_url(), "http://localhost:11434");
    assert_eq!(config.analysis.max_files, 50);
    assert_eq!(config.analysis.max_file_size_bytes, 5 * 1024 * 1024);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl_hours, 24);
    assert_eq!(config.output.get_formats()?.len(), 3);
    assert!(config.stages.is_empty());

    Ok(())
}

#[test]
fn test_load_explicit_path() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("modernizer.toml");
    fs::write(
        &path,
        r#"
[llm]
provider = "openai-compatible"
model = "llama3.1:8b"
base_url = "http://localhost:8080/v1/"
api_key_env = "none"

[analysis]
max_files = 12

[cache]
dir = "/tmp/modernizer-test-cache"
ttl_hours = 2

[output]
formats = ["json"]

[stages.doc_generator]
policy = "best-effort"
max_retries = 1
"#,
    )?;

    let config = Config::load_with_path(Some(path.to_string_lossy().into_owned()))?;
    assert_eq!(config.llm.provider, "openai-compatible");
    assert_eq!(config.llm.get_base_url(), "http://localhost:8080/v1");
    assert_eq!(config.llm.get_max_tokens(), 4096);
    assert_eq!(config.analysis.max_files, 12);
    // Unset fields keep their defaults
    assert_eq!(config.analysis.max_depth, 10);
    assert_eq!(config.cache.ttl().as_secs(), 7200);
    assert_eq!(config.output.get_formats()?, vec![ReportFormat::Json]);
    assert_eq!(
        config.stage_policy("doc_generator", StagePolicy::Fatal),
        StagePolicy::BestEffort
    );
    assert_eq!(config.stage_retries("doc_generator"), 1);

    Ok(())
}

#[test]
fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load_with_path(Some("/no/such/modernizer.toml".to_string())).is_err());
}

#[test]
fn test_invalid_toml_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[llm\nprovider = ")?;
    assert!(Config::load_with_path(Some(path.to_string_lossy().into_owned())).is_err());
    Ok(())
}

#[test]
#[serial]
fn test_api_key_read_from_named_env_var() -> Result<()> {
    let mut config = Config::default();
    config.llm.api_key_env = Some("MODERNIZER_IT_API_KEY".to_string());

    std::env::set_var("MODERNIZER_IT_API_KEY", "sk-abc");
    assert_eq!(config.llm.get_api_key().expose(), "sk-abc");
    assert_eq!(format!("{}", config.llm.get_api_key()), "***");

    std::env::remove_var("MODERNIZER_IT_API_KEY");
    assert_eq!(config.llm.get_api_key().expose(), "");
    Ok(())
}
