use anyhow::Result;
use regex::Regex;

use super::{check_text, push_unique, LanguageParser, ParsedFile};
use crate::detector::Language;
use crate::error::ParseError;

/// Handles both JavaScript and TypeScript; the syntax we look at is shared.
pub struct JavaScriptParser {
    language: Language,
    class_re: Regex,
    function_re: Regex,
    arrow_re: Regex,
    import_re: Regex,
    require_re: Regex,
}

impl JavaScriptParser {
    pub fn new(language: Language) -> Result<Self> {
        Ok(Self {
            language,
            class_re: Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)")?,
            function_re: Regex::new(
                r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(",
            )?,
            arrow_re: Regex::new(
                r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
            )?,
            import_re: Regex::new(r#"^\s*import\s+(?:.+?\s+from\s+)?['"]([^'"]+)['"]"#)?,
            require_re: Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#)?,
        })
    }

    pub fn javascript() -> Result<Self> {
        Self::new(Language::JavaScript)
    }

    pub fn typescript() -> Result<Self> {
        Self::new(Language::TypeScript)
    }
}

impl LanguageParser for JavaScriptParser {
    fn language(&self) -> Language {
        self.language
    }

    fn parse(&self, path: &str, content: &str) -> Result<ParsedFile, ParseError> {
        check_text(path, self.language, content)?;
        let mut parsed = ParsedFile::empty(path, Some(self.language), content);

        for line in content.lines() {
            if let Some(c) = self.class_re.captures(line) {
                push_unique(&mut parsed.classes, &c[1]);
            }
            if let Some(c) = self.function_re.captures(line) {
                push_unique(&mut parsed.functions, &c[1]);
            } else if let Some(c) = self.arrow_re.captures(line) {
                push_unique(&mut parsed.functions, &c[1]);
            }
            if let Some(c) = self.import_re.captures(line) {
                push_unique(&mut parsed.imports, &c[1]);
            }
            for c in self.require_re.captures_iter(line) {
                push_unique(&mut parsed.imports, &c[1]);
            }
        }
        Ok(parsed)
    }
}
