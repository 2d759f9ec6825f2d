use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::stage::StageData;
use crate::config::AnalysisConfig;
use crate::detector::Language;
use crate::repository::reference_identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    #[serde(rename = "FastAPI")]
    FastApi,
    Flask,
    Django,
    Express,
    #[serde(rename = "NestJS")]
    NestJs,
    #[serde(rename = "Spring Boot")]
    SpringBoot,
    #[serde(rename = "ASP.NET Core")]
    AspNetCore,
    Gin,
    Actix,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::FastApi => "FastAPI",
            Backend::Flask => "Flask",
            Backend::Django => "Django",
            Backend::Express => "Express",
            Backend::NestJs => "NestJS",
            Backend::SpringBoot => "Spring Boot",
            Backend::AspNetCore => "ASP.NET Core",
            Backend::Gin => "Gin",
            Backend::Actix => "Actix",
        }
    }

    pub fn language(&self) -> Language {
        match self {
            Backend::FastApi | Backend::Flask | Backend::Django => Language::Python,
            Backend::Express => Language::JavaScript,
            Backend::NestJs => Language::TypeScript,
            Backend::SpringBoot => Language::Java,
            Backend::AspNetCore => Language::CSharp,
            Backend::Gin => Language::Go,
            Backend::Actix => Language::Rust,
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "fastapi" => Ok(Backend::FastApi),
            "flask" => Ok(Backend::Flask),
            "django" => Ok(Backend::Django),
            "express" | "expressjs" | "node" => Ok(Backend::Express),
            "nestjs" | "nest" => Ok(Backend::NestJs),
            "springboot" | "spring" => Ok(Backend::SpringBoot),
            "aspnetcore" | "aspnet" | "dotnet" => Ok(Backend::AspNetCore),
            "gin" => Ok(Backend::Gin),
            "actix" | "actixweb" => Ok(Backend::Actix),
            _ => bail!("Unknown backend framework: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Frontend {
    React,
    Vue,
    Angular,
    Svelte,
    #[serde(rename = "Next.js")]
    NextJs,
    #[default]
    None,
}

impl Frontend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frontend::React => "React",
            Frontend::Vue => "Vue",
            Frontend::Angular => "Angular",
            Frontend::Svelte => "Svelte",
            Frontend::NextJs => "Next.js",
            Frontend::None => "None",
        }
    }
}

impl FromStr for Frontend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "react" | "reactjs" => Ok(Frontend::React),
            "vue" | "vuejs" => Ok(Frontend::Vue),
            "angular" => Ok(Frontend::Angular),
            "svelte" | "sveltekit" => Ok(Frontend::Svelte),
            "nextjs" | "next" => Ok(Frontend::NextJs),
            "none" | "" => Ok(Frontend::None),
            _ => bail!("Unknown frontend framework: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Database {
    #[serde(rename = "PostgreSQL")]
    PostgreSql,
    #[serde(rename = "MySQL")]
    MySql,
    #[serde(rename = "MongoDB")]
    MongoDb,
    #[serde(rename = "SQLite")]
    Sqlite,
    Redis,
    #[default]
    None,
}

impl Database {
    pub fn as_str(&self) -> &'static str {
        match self {
            Database::PostgreSql => "PostgreSQL",
            Database::MySql => "MySQL",
            Database::MongoDb => "MongoDB",
            Database::Sqlite => "SQLite",
            Database::Redis => "Redis",
            Database::None => "None",
        }
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            Database::PostgreSql | Database::MySql | Database::Sqlite
        )
    }
}

impl FromStr for Database {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Database::PostgreSql),
            "mysql" | "mariadb" => Ok(Database::MySql),
            "mongodb" | "mongo" => Ok(Database::MongoDb),
            "sqlite" | "sqlite3" => Ok(Database::Sqlite),
            "redis" => Ok(Database::Redis),
            "none" | "" => Ok(Database::None),
            _ => bail!("Unknown database: {}", s),
        }
    }
}

// "Spring Boot", "spring-boot", "ASP.NET Core" and "Next.js" all collapse to
// a bare lowercase alphanumeric token.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStack {
    pub backend: Backend,
    #[serde(default)]
    pub frontend: Frontend,
    #[serde(default)]
    pub database: Database,
}

impl TargetStack {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            frontend: Frontend::None,
            database: Database::None,
        }
    }

    pub fn with_frontend(mut self, frontend: Frontend) -> Self {
        self.frontend = frontend;
        self
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = database;
        self
    }
}

impl fmt::Display for TargetStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.backend.as_str())?;
        if self.frontend != Frontend::None {
            write!(f, " + {}", self.frontend.as_str())?;
        }
        if self.database != Database::None {
            write!(f, " + {}", self.database.as_str())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub max_files: usize,
    pub max_file_size_bytes: u64,
    pub max_depth: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisConfig::default().into()
    }
}

impl From<AnalysisConfig> for AnalysisOptions {
    fn from(config: AnalysisConfig) -> Self {
        Self {
            max_files: config.max_files,
            max_file_size_bytes: config.max_file_size_bytes,
            max_depth: config.max_depth,
        }
    }
}

/// Everything a run needs from its caller. Not modified once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    pub repository: Option<String>,
    pub requirements: Option<String>,
    pub target: TargetStack,
    pub options: AnalysisOptions,
}

impl PipelineInput {
    pub fn new(target: TargetStack) -> Self {
        Self {
            repository: None,
            requirements: None,
            target,
            options: AnalysisOptions::default(),
        }
    }

    pub fn with_repository(mut self, reference: impl Into<String>) -> Self {
        self.repository = Some(reference.into());
        self
    }

    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = Some(requirements.into());
        self
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    /// Initial stage data every chain draws its consumed keys from. The
    /// repository reference is normalized, and local trees carry a
    /// `repository_revision` so edits invalidate cached analysis.
    pub fn seed(&self) -> StageData {
        let mut seed = StageData::new();
        if let Some(ref repo) = self.repository {
            let identity = reference_identity(repo, &self.options);
            seed.insert("repository".to_string(), Value::String(identity.reference));
            if let Some(revision) = identity.revision {
                seed.insert("repository_revision".to_string(), Value::String(revision));
            }
        }
        if let Some(ref req) = self.requirements {
            seed.insert("requirements".to_string(), Value::String(req.clone()));
        }
        // Both structs serialize to plain objects; failure is impossible here.
        if let Ok(target) = serde_json::to_value(self.target) {
            seed.insert("target_stack".to_string(), target);
        }
        if let Ok(options) = serde_json::to_value(self.options) {
            seed.insert("analysis_options".to_string(), options);
        }
        seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_aliases_case_insensitive() {
        assert_eq!(Backend::from_str("FastAPI").unwrap(), Backend::FastApi);
        assert_eq!(Backend::from_str("fastapi").unwrap(), Backend::FastApi);
        assert_eq!(Backend::from_str("spring-boot").unwrap(), Backend::SpringBoot);
        assert_eq!(Backend::from_str("Spring Boot").unwrap(), Backend::SpringBoot);
        assert_eq!(Backend::from_str("ASP.NET Core").unwrap(), Backend::AspNetCore);
        assert_eq!(Backend::from_str("actix-web").unwrap(), Backend::Actix);
        assert!(Backend::from_str("rails").is_err());
    }

    #[test]
    fn test_frontend_and_database_parse() {
        assert_eq!(Frontend::from_str("next.js").unwrap(), Frontend::NextJs);
        assert_eq!(Frontend::from_str("none").unwrap(), Frontend::None);
        assert_eq!(Database::from_str("Postgres").unwrap(), Database::PostgreSql);
        assert_eq!(Database::from_str("mongo").unwrap(), Database::MongoDb);
        assert!(Database::from_str("cassandra").is_err());
    }

    #[test]
    fn test_display_names_roundtrip_through_from_str() {
        for b in [
            Backend::FastApi,
            Backend::NestJs,
            Backend::SpringBoot,
            Backend::AspNetCore,
        ] {
            assert_eq!(Backend::from_str(b.as_str()).unwrap(), b);
        }
        assert_eq!(Frontend::from_str(Frontend::NextJs.as_str()).unwrap(), Frontend::NextJs);
        assert_eq!(Database::from_str(Database::Sqlite.as_str()).unwrap(), Database::Sqlite);
    }

    #[test]
    fn test_target_stack_serializes_display_names() {
        let target = TargetStack::new(Backend::FastApi)
            .with_frontend(Frontend::React)
            .with_database(Database::PostgreSql);
        let value = serde_json::to_value(target).unwrap();
        assert_eq!(value["backend"], "FastAPI");
        assert_eq!(value["frontend"], "React");
        assert_eq!(value["database"], "PostgreSQL");
        assert_eq!(target.to_string(), "FastAPI + React + PostgreSQL");
    }

    #[test]
    fn test_seed_omits_absent_optionals() {
        let input = PipelineInput::new(TargetStack::new(Backend::Gin));
        let seed = input.seed();
        assert!(!seed.contains_key("repository"));
        assert!(!seed.contains_key("requirements"));
        assert!(seed.contains_key("target_stack"));
        assert_eq!(seed["analysis_options"]["max_files"], 50);

        let seed = input
            .with_repository("https://github.com/acme/widgets")
            .seed();
        assert_eq!(seed["repository"], "acme/widgets");
        assert!(!seed.contains_key("repository_revision"));
    }

    #[test]
    fn test_seed_resolves_local_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "import flask\n").unwrap();
        let seed = PipelineInput::new(TargetStack::new(Backend::FastApi))
            .with_repository(dir.path().join(".").to_string_lossy())
            .seed();
        assert_eq!(
            seed["repository"],
            dir.path().canonicalize().unwrap().to_string_lossy().as_ref()
        );
        assert!(seed["repository_revision"].is_string());
    }
}
