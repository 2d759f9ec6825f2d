use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::pipeline::stage::StagePolicy;
use crate::report::ReportFormat;
use crate::util::SecretString;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub github: GithubConfig,
    /// Per-stage overrides keyed by stage name (e.g. `[stages.tech_detector]`)
    #[serde(default)]
    pub stages: BTreeMap<String, StageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai-compatible"
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Optional: Override max tokens generated per request
    /// If not specified, uses provider-specific defaults:
    /// - ollama: 2048
    /// - openai-compatible: 4096
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// HTTP timeout per model call in seconds (default: 300)
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn get_max_tokens(&self) -> u32 {
        if let Some(tokens) = self.max_tokens {
            return tokens;
        }

        match self.provider.as_str() {
            "ollama" => 2048,
            "openai-compatible" => 4096,
            _ => 2048,
        }
    }

    pub fn get_base_url(&self) -> String {
        if let Some(ref url) = self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "openai-compatible" => "http://localhost:11434/v1".to_string(),
            _ => "http://localhost:11434".to_string(),
        }
    }

    /// API key from the configured env var. Local models usually need none,
    /// so a missing variable yields an empty key rather than an error.
    pub fn get_api_key(&self) -> SecretString {
        match &self.api_key_env {
            Some(env_var) if env_var.to_lowercase() != "none" => {
                env::var(env_var).unwrap_or_default().into()
            }
            _ => String::new().into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum number of files parsed per repository (default: 50)
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Files larger than this are listed but not parsed (default: 5 MiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,

    /// Maximum directory depth walked below the repository root (default: 10)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size_bytes: default_max_file_size(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache directory (default: <cache dir>/modernizer)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl CacheConfig {
    pub fn get_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("modernizer")
    }

    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Report formats: "markdown", "html", "json"
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            formats: default_formats(),
        }
    }
}

impl OutputConfig {
    pub fn get_formats(&self) -> Result<Vec<ReportFormat>> {
        self.formats.iter().map(|f| f.parse()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Env var holding a token for private repositories (default: GITHUB_TOKEN)
    #[serde(default = "default_token_env")]
    pub token_env: Option<String>,

    /// Shallow clone depth, 0 for a full clone (default: 1)
    #[serde(default = "default_clone_depth")]
    pub clone_depth: u32,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            clone_depth: default_clone_depth(),
        }
    }
}

impl GithubConfig {
    pub fn get_token(&self) -> Option<SecretString> {
        let var = self.token_env.as_ref()?;
        match env::var(var) {
            Ok(token) if !token.is_empty() => Some(token.into()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageConfig {
    /// "fatal" or "best-effort"
    #[serde(default)]
    pub policy: Option<String>,

    /// Retries on execution failure (default: 0)
    #[serde(default)]
    pub max_retries: Option<usize>,
}

impl Config {
    /// Policy for a stage: config override if present, else the stage's default.
    pub fn stage_policy(&self, stage: &str, default: StagePolicy) -> StagePolicy {
        self.stages
            .get(stage)
            .and_then(|s| s.policy.as_deref())
            .map(|p| match p.to_lowercase().as_str() {
                "fatal" => StagePolicy::Fatal,
                "best-effort" | "best_effort" | "besteffort" => StagePolicy::BestEffort,
                _ => default,
            })
            .unwrap_or(default)
    }

    pub fn stage_retries(&self, stage: &str) -> usize {
        self.stages
            .get(stage)
            .and_then(|s| s.max_retries)
            .unwrap_or(0)
    }

    /// Load config from repo root or user config directory
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    /// Load configuration from a specific path, or use default search paths
    pub fn load_with_path(path: Option<String>) -> Result<Self> {
        if let Some(config_path) = path {
            debug!("Loading config from explicit path: {}", config_path);
            return Self::load_from_path(&config_path);
        }

        if let Ok(config) = Self::load_from_path("modernizer.toml") {
            debug!("Loaded config from ./modernizer.toml");
            return Ok(config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("modernizer").join("config.toml");
            if let Ok(config) = Self::load_from_path(&config_path) {
                debug!("Loaded config from {:?}", config_path);
                return Ok(config);
            }
        }

        debug!("Using default config");
        Ok(Self::default())
    }

    fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: "ollama".to_string(),
                model: "qwen2.5-coder:7b".to_string(),
                base_url: None,
                api_key_env: None,
                temperature: default_temperature(),
                max_tokens: None,
                timeout_secs: default_llm_timeout(),
            },
            analysis: AnalysisConfig::default(),
            cache: CacheConfig::default(),
            output: OutputConfig::default(),
            github: GithubConfig::default(),
            stages: BTreeMap::new(),
        }
    }
}

fn default_temperature() -> f32 {
    0.1
}

fn default_llm_timeout() -> u64 {
    300
}

fn default_max_files() -> usize {
    50
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_max_depth() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_formats() -> Vec<String> {
    vec![
        "markdown".to_string(),
        "html".to_string(),
        "json".to_string(),
    ]
}

fn default_token_env() -> Option<String> {
    Some("GITHUB_TOKEN".to_string())
}

fn default_clone_depth() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_huge_ttl_saturates() {
        let config = CacheConfig {
            ttl_hours: u64::MAX,
            ..CacheConfig::default()
        };
        assert_eq!(config.ttl(), std::time::Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "qwen2.5-coder:7b");
        assert_eq!(config.analysis.max_files, 50);
        assert_eq!(config.analysis.max_file_size_bytes, 5 * 1024 * 1024);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_hours, 24);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("provider = \"ollama\""));
        assert!(toml_str.contains("qwen2.5-coder"));
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[llm]
provider = "openai-compatible"
model = "llama3"
"#,
        )
        .unwrap();
        assert_eq!(config.llm.get_base_url(), "http://localhost:11434/v1");
        assert_eq!(config.llm.get_max_tokens(), 4096);
        assert_eq!(config.analysis.max_depth, 10);
        assert_eq!(config.output.formats.len(), 3);
    }

    #[test]
    fn test_stage_overrides() {
        let config: Config = toml::from_str(
            r#"
[llm]
provider = "ollama"
model = "qwen2.5-coder:7b"

[stages.tech_detector]
policy = "fatal"
max_retries = 2

[stages.code_generator]
policy = "nonsense"
"#,
        )
        .unwrap();
        assert_eq!(
            config.stage_policy("tech_detector", StagePolicy::BestEffort),
            StagePolicy::Fatal
        );
        assert_eq!(config.stage_retries("tech_detector"), 2);
        // Unknown policy strings fall back to the stage default
        assert_eq!(
            config.stage_policy("code_generator", StagePolicy::BestEffort),
            StagePolicy::BestEffort
        );
        assert_eq!(config.stage_retries("doc_generator"), 0);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let mut llm = Config::default().llm;
        llm.base_url = Some("http://gpu-box:11434/".to_string());
        assert_eq!(llm.get_base_url(), "http://gpu-box:11434");
    }

    #[test]
    fn test_output_formats_parse() {
        let mut output = OutputConfig::default();
        assert_eq!(output.get_formats().unwrap().len(), 3);
        output.formats = vec!["pdf".to_string()];
        assert!(output.get_formats().is_err());
    }

    #[test]
    #[serial]
    fn test_github_token_from_env() {
        env::set_var("MODERNIZER_TEST_GH_TOKEN", "ghp_secret");
        let github = GithubConfig {
            token_env: Some("MODERNIZER_TEST_GH_TOKEN".to_string()),
            clone_depth: 1,
        };
        let token = github.get_token().unwrap();
        assert_eq!(token.expose(), "ghp_secret");
        assert_eq!(format!("{:?}", token), "***");
        env::remove_var("MODERNIZER_TEST_GH_TOKEN");
        assert!(github.get_token().is_none());
    }

    #[test]
    #[serial]
    fn test_api_key_none_for_local_model() {
        let mut llm = Config::default().llm;
        llm.api_key_env = Some("none".to_string());
        assert_eq!(llm.get_api_key().expose(), "");
        llm.api_key_env = Some("MODERNIZER_TEST_MISSING_KEY_999".to_string());
        assert_eq!(llm.get_api_key().expose(), "");
    }
}
