//! Line-oriented structural extraction.
//!
//! Parsers pull out class names, function names and imported modules with
//! regular expressions. They do not build an AST; the analyzer only needs
//! enough structure to count, detect frameworks and find entry points.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::detector::{detect_language, Language};
use crate::error::ParseError;

pub mod java;
pub mod javascript;
pub mod python;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,
    pub language: Option<Language>,
    pub classes: Vec<String>,
    pub functions: Vec<String>,
    pub imports: Vec<String>,
    pub line_count: usize,
}

impl ParsedFile {
    /// Result used when a parser fails: the file still counts, with no structure.
    pub fn empty(path: &str, language: Option<Language>, content: &str) -> Self {
        Self {
            path: path.to_string(),
            language,
            line_count: content.lines().count(),
            ..Default::default()
        }
    }
}

pub trait LanguageParser: Send + Sync {
    fn language(&self) -> Language;

    fn parse(&self, path: &str, content: &str) -> Result<ParsedFile, ParseError>;
}

/// Rejects content no source parser should be handed.
pub(crate) fn check_text(path: &str, language: Language, content: &str) -> Result<(), ParseError> {
    if content.contains('\0') {
        return Err(ParseError {
            path: path.to_string(),
            language: language.as_str().to_string(),
            reason: "file contains NUL bytes (binary?)".to_string(),
        });
    }
    Ok(())
}

/// Push `item` unless already present, keeping first-seen order.
pub(crate) fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

/// Parsers by language.
pub struct ParserRegistry {
    parsers: HashMap<Language, Box<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Python, JavaScript, TypeScript and Java.
    pub fn with_defaults() -> anyhow::Result<Self> {
        Ok(Self::empty()
            .register(Box::new(python::PythonParser::new()?))
            .register(Box::new(javascript::JavaScriptParser::javascript()?))
            .register(Box::new(javascript::JavaScriptParser::typescript()?))
            .register(Box::new(java::JavaParser::new()?)))
    }

    pub fn register(mut self, parser: Box<dyn LanguageParser>) -> Self {
        self.parsers.insert(parser.language(), parser);
        self
    }

    pub fn supports(&self, language: Language) -> bool {
        self.parsers.contains_key(&language)
    }

    /// Parse by extension. `None` when no parser handles the file's language.
    pub fn parse(&self, path: &str, content: &str) -> Option<Result<ParsedFile, ParseError>> {
        let language = detect_language(std::path::Path::new(path))?;
        let parser = self.parsers.get(&language)?;
        Some(parser.parse(path, content))
    }
}
