use anyhow::Result;
use regex::Regex;

use super::{check_text, push_unique, LanguageParser, ParsedFile};
use crate::detector::Language;
use crate::error::ParseError;

pub struct JavaParser {
    type_re: Regex,
    method_re: Regex,
    import_re: Regex,
}

impl JavaParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            type_re: Regex::new(
                r"^\s*(?:(?:public|protected|private|abstract|final|static)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_]\w*)",
            )?,
            method_re: Regex::new(
                r"^\s*(?:(?:public|protected|private|static|final|abstract|synchronized)\s+)+(?:<[^>]+>\s+)?[\w<>\[\],.?\s]+?\s+([a-zA-Z_]\w*)\s*\(",
            )?,
            import_re: Regex::new(r"^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;")?,
        })
    }
}

impl LanguageParser for JavaParser {
    fn language(&self) -> Language {
        Language::Java
    }

    fn parse(&self, path: &str, content: &str) -> Result<ParsedFile, ParseError> {
        check_text(path, Language::Java, content)?;
        let mut parsed = ParsedFile::empty(path, Some(Language::Java), content);

        for line in content.lines() {
            if let Some(c) = self.import_re.captures(line) {
                push_unique(&mut parsed.imports, &c[1]);
            } else if let Some(c) = self.type_re.captures(line) {
                push_unique(&mut parsed.classes, &c[1]);
            } else if let Some(c) = self.method_re.captures(line) {
                push_unique(&mut parsed.functions, &c[1]);
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLER: &str = r#"package com.example.demo;

import org.springframework.web.bind.annotation.*;
import org.springframework.beans.factory.annotation.Autowired;
import static org.junit.Assert.assertEquals;
import java.util.List;

@RestController
@RequestMapping("/api/users")
public class UserController {

    @Autowired
    private UserService userService;

    @GetMapping
    public List<User> getAllUsers() {
        return userService.findAll();
    }

    public static void main(String[] args) {
    }

    private interface Callback {}
}
"#;

    #[test]
    fn test_spring_controller() {
        let parser = JavaParser::new().unwrap();
        let parsed = parser.parse("UserController.java", CONTROLLER).unwrap();
        assert_eq!(parsed.classes, vec!["UserController", "Callback"]);
        assert_eq!(parsed.functions, vec!["getAllUsers", "main"]);
        assert_eq!(
            parsed.imports,
            vec![
                "org.springframework.web.bind.annotation.*",
                "org.springframework.beans.factory.annotation.Autowired",
                "org.junit.Assert.assertEquals",
                "java.util.List",
            ]
        );
    }

    #[test]
    fn test_field_is_not_a_method() {
        let parser = JavaParser::new().unwrap();
        let parsed = parser
            .parse("A.java", "class A {\n    private UserService userService;\n}\n")
            .unwrap();
        assert!(parsed.functions.is_empty());
    }
}
