use anyhow::Result;
use regex::Regex;

use super::{check_text, push_unique, LanguageParser, ParsedFile};
use crate::detector::Language;
use crate::error::ParseError;

pub struct PythonParser {
    class_re: Regex,
    def_re: Regex,
    import_re: Regex,
    from_re: Regex,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            class_re: Regex::new(r"^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)")?,
            def_re: Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(")?,
            import_re: Regex::new(r"^\s*import\s+(.+)$")?,
            from_re: Regex::new(r"^\s*from\s+(\.*[A-Za-z0-9_.]*)\s+import\b")?,
        })
    }
}

impl LanguageParser for PythonParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, path: &str, content: &str) -> Result<ParsedFile, ParseError> {
        check_text(path, Language::Python, content)?;
        let mut parsed = ParsedFile::empty(path, Some(Language::Python), content);

        for line in content.lines() {
            if let Some(c) = self.class_re.captures(line) {
                push_unique(&mut parsed.classes, &c[1]);
            } else if let Some(c) = self.def_re.captures(line) {
                push_unique(&mut parsed.functions, &c[1]);
            } else if let Some(c) = self.from_re.captures(line) {
                push_unique(&mut parsed.imports, &c[1]);
            } else if let Some(c) = self.import_re.captures(line) {
                // import a, b.c as d
                for module in c[1].split(',') {
                    let name = module.split_whitespace().next().unwrap_or("");
                    if !name.is_empty() {
                        push_unique(&mut parsed.imports, name);
                    }
                }
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLASK_APP: &str = r#"""Sample Flask application."""

from flask import Flask, jsonify
from flask_sqlalchemy import SQLAlchemy
from .models import User
import os, logging as log

app = Flask(__name__)
db = SQLAlchemy(app)


class User(db.Model):
    def to_dict(self):
        return {}


@app.route("/users")
def list_users():
    return jsonify([])


async def fetch_remote():
    pass
"#;

    #[test]
    fn test_extracts_classes_functions_imports() {
        let parser = PythonParser::new().unwrap();
        let parsed = parser.parse("app.py", FLASK_APP).unwrap();
        assert_eq!(parsed.classes, vec!["User"]);
        assert_eq!(parsed.functions, vec!["to_dict", "list_users", "fetch_remote"]);
        assert_eq!(
            parsed.imports,
            vec!["flask", "flask_sqlalchemy", ".models", "os", "logging"]
        );
        assert_eq!(parsed.line_count, FLASK_APP.lines().count());
    }

    #[test]
    fn test_empty_file() {
        let parser = PythonParser::new().unwrap();
        let parsed = parser.parse("empty.py", "").unwrap();
        assert!(parsed.classes.is_empty());
        assert_eq!(parsed.line_count, 0);
    }
}
