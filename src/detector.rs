use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    JavaScript,
    TypeScript,
    Go,
    Rust,
    CSharp,
}

impl Language {
    pub fn as_str(&self) -> &str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::CSharp => "csharp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" | "pyx" => Some(Language::Python),
            "java" => Some(Language::Java),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "tsx" => Some(Language::TypeScript),
            "go" => Some(Language::Go),
            "rs" => Some(Language::Rust),
            "cs" => Some(Language::CSharp),
            _ => None,
        }
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "go" | "golang" => Ok(Language::Go),
            "rust" | "rs" => Ok(Language::Rust),
            "csharp" | "c#" | "cs" => Ok(Language::CSharp),
            _ => bail!("Unknown language: {}", s),
        }
    }
}

/// Language of a file by extension, or None for unsupported/non-code files.
pub fn detect_language(path: &Path) -> Option<Language> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(Language::from_extension)
}

struct FrameworkPattern {
    name: &'static str,
    category: &'static str,
    language: Language,
    needles: &'static [&'static str],
}

const FRAMEWORKS: &[FrameworkPattern] = &[
    FrameworkPattern { name: "Django", category: "Web", language: Language::Python, needles: &["django"] },
    FrameworkPattern { name: "Flask", category: "Web", language: Language::Python, needles: &["flask"] },
    FrameworkPattern { name: "FastAPI", category: "Web", language: Language::Python, needles: &["fastapi"] },
    FrameworkPattern { name: "Spring Boot", category: "Web", language: Language::Java, needles: &["org.springframework.boot", "spring-boot"] },
    FrameworkPattern { name: "Spring", category: "Web", language: Language::Java, needles: &["org.springframework"] },
    FrameworkPattern { name: "Express", category: "Web", language: Language::JavaScript, needles: &["express"] },
    FrameworkPattern { name: "React", category: "Frontend", language: Language::JavaScript, needles: &["react"] },
    FrameworkPattern { name: "Vue", category: "Frontend", language: Language::JavaScript, needles: &["vue"] },
    FrameworkPattern { name: "Angular", category: "Frontend", language: Language::TypeScript, needles: &["@angular"] },
    FrameworkPattern { name: "Next.js", category: "Web", language: Language::JavaScript, needles: &["next/", "next.config"] },
    FrameworkPattern { name: "Gin", category: "Web", language: Language::Go, needles: &["github.com/gin-gonic/gin"] },
    FrameworkPattern { name: "Echo", category: "Web", language: Language::Go, needles: &["github.com/labstack/echo"] },
];

const LIBRARIES: &[(&str, &str, &[&str])] = &[
    ("SQLAlchemy", "ORM", &["sqlalchemy"]),
    ("Hibernate", "ORM", &["org.hibernate"]),
    ("Pandas", "Data", &["pandas"]),
    ("NumPy", "Data", &["numpy"]),
    ("pytest", "Testing", &["pytest"]),
    ("unittest", "Testing", &["unittest"]),
    ("JUnit", "Testing", &["org.junit"]),
    ("Jest", "Testing", &["jest"]),
    ("asyncio", "Async", &["asyncio"]),
    ("Celery", "Task", &["celery"]),
    ("RabbitMQ", "Queue", &["pika", "amqp"]),
];

const DATABASES: &[(&str, &[&str])] = &[
    ("PostgreSQL", &["postgresql", "psycopg2", "pg8000", "postgres"]),
    ("MySQL", &["mysql", "pymysql"]),
    ("MongoDB", &["mongodb", "pymongo", "mongoose"]),
    ("Redis", &["redis"]),
    ("SQLite", &["sqlite3", "sqlite"]),
    ("Oracle", &["cx_oracle", "oracledb"]),
    ("DynamoDB", &["dynamodb", "boto3"]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFramework {
    pub name: String,
    pub category: String,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLibrary {
    pub name: String,
    pub kind: String,
}

/// Frameworks whose needles appear in any of the given identifiers
/// (import modules, config file names).
pub fn detect_frameworks<S: AsRef<str>>(identifiers: &[S]) -> Vec<DetectedFramework> {
    let lowered: Vec<String> = identifiers
        .iter()
        .map(|s| s.as_ref().to_lowercase())
        .collect();
    FRAMEWORKS
        .iter()
        .filter(|fw| {
            lowered
                .iter()
                .any(|id| fw.needles.iter().any(|n| id.contains(n)))
        })
        .map(|fw| DetectedFramework {
            name: fw.name.to_string(),
            category: fw.category.to_string(),
            language: fw.language,
        })
        .collect()
}

pub fn detect_libraries<S: AsRef<str>>(identifiers: &[S]) -> Vec<DetectedLibrary> {
    let lowered: Vec<String> = identifiers
        .iter()
        .map(|s| s.as_ref().to_lowercase())
        .collect();
    LIBRARIES
        .iter()
        .filter(|(_, _, needles)| {
            lowered
                .iter()
                .any(|id| needles.iter().any(|n| id.contains(n)))
        })
        .map(|(name, kind, _)| DetectedLibrary {
            name: name.to_string(),
            kind: kind.to_string(),
        })
        .collect()
}

/// Database name -> number of identifiers that mention it.
pub fn detect_databases<S: AsRef<str>>(identifiers: &[S]) -> BTreeMap<String, usize> {
    let mut found = BTreeMap::new();
    for id in identifiers {
        let id = id.as_ref().to_lowercase();
        for (name, needles) in DATABASES {
            if needles.iter().any(|n| id.contains(n)) {
                *found.entry(name.to_string()).or_insert(0) += 1;
            }
        }
    }
    found
}
