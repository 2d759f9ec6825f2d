use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::{ReportData, ReportFormat};
use crate::error::AssemblyError;
use crate::pipeline::StageOutcome;

pub trait Renderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    fn render(&self, report: &ReportData<'_>) -> Result<String, AssemblyError>;
}

pub struct RendererRegistry {
    renderers: BTreeMap<ReportFormat, Box<dyn Renderer>>,
}

impl RendererRegistry {
    pub fn empty() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::empty()
            .register(Box::new(MarkdownRenderer))
            .register(Box::new(HtmlRenderer))
            .register(Box::new(JsonRenderer))
    }

    pub fn register(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderers.insert(renderer.format(), renderer);
        self
    }

    pub fn get(&self, format: ReportFormat) -> Result<&dyn Renderer, AssemblyError> {
        self.renderers
            .get(&format)
            .map(|r| r.as_ref())
            .ok_or_else(|| AssemblyError::MissingRenderer(format.to_string()))
    }
}

/// Rows of the execution history table: chain, stage, outcome, attempts, duration.
fn history_rows(report: &ReportData<'_>) -> Vec<[String; 5]> {
    report
        .run
        .history
        .iter()
        .map(|r| {
            [
                r.chain.clone(),
                r.stage.clone(),
                r.outcome.label().to_string(),
                r.attempts.to_string(),
                format!("{} ms", r.duration_ms),
            ]
        })
        .collect()
}

/// Every failed stage as (chain/stage, policy word, cause), in history order.
fn failures(report: &ReportData<'_>) -> Vec<(String, &'static str, String)> {
    report
        .run
        .history
        .iter()
        .filter_map(|r| match &r.outcome {
            StageOutcome::Failed { cause, fatal } => Some((
                format!("{}/{}", r.chain, r.stage),
                if *fatal { "fatal" } else { "best-effort" },
                cause.clone(),
            )),
            _ => None,
        })
        .collect()
}

pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Markdown
    }

    fn render(&self, report: &ReportData<'_>) -> Result<String, AssemblyError> {
        let run = report.run;
        let mut out = String::new();
        let _ = writeln!(out, "# Modernization Report\n");
        let _ = writeln!(out, "- Run: `{}`", run.run_id);
        let _ = writeln!(out, "- Generated: {}", report.generated_at.to_rfc3339());
        let _ = writeln!(out, "- Status: {}", run.status);
        let _ = writeln!(out, "- Target stack: {}", run.input.target);
        if let Some(repo) = &report.analysis.repository {
            let _ = writeln!(out, "- Repository: {}", repo);
        }

        let _ = writeln!(out, "\n## Analysis\n");
        let _ = writeln!(out, "- Files: {}", report.analysis.file_count);
        if let Some(lang) = &report.analysis.primary_language {
            let _ = writeln!(out, "- Primary language: {}", lang);
        }
        if !report.analysis.architecture_patterns.is_empty() {
            let _ = writeln!(
                out,
                "- Patterns: {}",
                report.analysis.architecture_patterns.join(", ")
            );
        }
        if let Some(m) = &report.analysis.metrics {
            let _ = writeln!(
                out,
                "- Lines of code: {} (complexity {}/10, maintainability {}/10)",
                m.total_lines, m.complexity_score, m.maintainability_score
            );
        }
        if let Some(arch) = &report.analysis.architecture {
            if !arch.summary.is_empty() {
                let _ = writeln!(out, "\n{}", arch.summary);
            }
        }

        if let Some(stack) = &report.tech_stack {
            let _ = writeln!(out, "\n## Technology Stack\n");
            let _ = writeln!(out, "- Maturity: {}", stack.maturity);
            for fw in &stack.frameworks {
                let _ = writeln!(out, "- {} ({})", fw.name, fw.category);
            }
            for db in &stack.databases {
                let _ = writeln!(out, "- {} (database)", db.name);
            }
        }

        if let Some(plan) = &report.migration_plan {
            let _ = writeln!(out, "\n## Migration Plan\n");
            let _ = writeln!(
                out,
                "{} → {}: **{}**, {} hours over {} weeks.\n",
                plan.current_stack,
                plan.target_stack,
                plan.difficulty,
                plan.estimated_effort_hours,
                plan.estimated_duration_weeks
            );
            let _ = writeln!(out, "| Phase | Name | Effort |");
            let _ = writeln!(out, "|---|---|---|");
            for phase in &plan.phases {
                let _ = writeln!(out, "| {} | {} | {}h |", phase.number, phase.name, phase.effort_hours);
            }
            if !plan.breaking_changes.is_empty() {
                let _ = writeln!(out, "\n### Breaking Changes\n");
                for change in &plan.breaking_changes {
                    let _ = writeln!(out, "- **{}**: {}", change.area, change.description);
                }
            }
        }

        if !report.sections.is_empty() {
            let _ = writeln!(out, "\n## Documents\n");
            for section in &report.sections {
                let _ = writeln!(out, "- {}", section.title);
            }
        }
        if !report.generated_files.is_empty() {
            let _ = writeln!(out, "\n## Generated Files\n");
            for file in &report.generated_files {
                let _ = writeln!(out, "- `{}`: {}", file.path, file.description);
            }
        }

        let failed = failures(report);
        if !failed.is_empty() {
            let _ = writeln!(out, "\n## Failures\n");
            for (stage, policy, cause) in &failed {
                let _ = writeln!(out, "- `{}` ({}): {}", stage, policy, cause);
            }
        }

        let _ = writeln!(out, "\n## Execution History\n");
        let _ = writeln!(out, "| Chain | Stage | Outcome | Attempts | Duration |");
        let _ = writeln!(out, "|---|---|---|---|---|");
        for row in history_rows(report) {
            let _ = writeln!(out, "| {} |", row.join(" | "));
        }
        Ok(out)
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn render(&self, report: &ReportData<'_>) -> Result<String, AssemblyError> {
        let run = report.run;
        let mut out = String::new();
        let _ = writeln!(out, "<!DOCTYPE html>");
        let _ = writeln!(out, "<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">");
        let _ = writeln!(out, "<title>Modernization Report {}</title>", run.run_id);
        let _ = writeln!(out, "</head>\n<body>");
        let _ = writeln!(out, "<h1>Modernization Report</h1>");
        let _ = writeln!(out, "<ul>");
        let _ = writeln!(out, "<li>Run: <code>{}</code></li>", run.run_id);
        let _ = writeln!(out, "<li>Generated: {}</li>", report.generated_at.to_rfc3339());
        let _ = writeln!(out, "<li>Status: {}</li>", run.status);
        let _ = writeln!(
            out,
            "<li>Target stack: {}</li>",
            escape_html(&run.input.target.to_string())
        );
        let _ = writeln!(out, "</ul>");

        if let Some(plan) = &report.migration_plan {
            let _ = writeln!(out, "<h2>Migration Plan</h2>");
            let _ = writeln!(
                out,
                "<p>{} &rarr; {}: <strong>{}</strong>, {} hours over {} weeks.</p>",
                escape_html(&plan.current_stack),
                escape_html(&plan.target_stack),
                plan.difficulty,
                plan.estimated_effort_hours,
                plan.estimated_duration_weeks
            );
            let _ = writeln!(out, "<ol>");
            for phase in &plan.phases {
                let _ = writeln!(
                    out,
                    "<li>{} ({}h)</li>",
                    escape_html(&phase.name),
                    phase.effort_hours
                );
            }
            let _ = writeln!(out, "</ol>");
        }

        for section in &report.sections {
            let _ = writeln!(out, "<section>");
            let _ = writeln!(out, "<h2>{}</h2>", escape_html(&section.title));
            let _ = writeln!(out, "<pre>{}</pre>", escape_html(section.content.trim_end()));
            let _ = writeln!(out, "</section>");
        }

        if !report.generated_files.is_empty() {
            let _ = writeln!(out, "<h2>Generated Files</h2>\n<ul>");
            for file in &report.generated_files {
                let _ = writeln!(
                    out,
                    "<li><code>{}</code> {}</li>",
                    escape_html(&file.path),
                    escape_html(&file.description)
                );
            }
            let _ = writeln!(out, "</ul>");
        }

        let failed = failures(report);
        if !failed.is_empty() {
            let _ = writeln!(out, "<h2>Failures</h2>\n<ul>");
            for (stage, policy, cause) in &failed {
                let _ = writeln!(
                    out,
                    "<li><code>{}</code> ({}): {}</li>",
                    escape_html(stage),
                    policy,
                    escape_html(cause)
                );
            }
            let _ = writeln!(out, "</ul>");
        }

        let _ = writeln!(out, "<h2>Execution History</h2>\n<table>");
        let _ = writeln!(
            out,
            "<tr><th>Chain</th><th>Stage</th><th>Outcome</th><th>Attempts</th><th>Duration</th></tr>"
        );
        for row in history_rows(report) {
            let cells: String = row
                .iter()
                .map(|c| format!("<td>{}</td>", escape_html(c)))
                .collect();
            let _ = writeln!(out, "<tr>{}</tr>", cells);
        }
        let _ = writeln!(out, "</table>\n</body>\n</html>");
        Ok(out)
    }
}

pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn render(&self, report: &ReportData<'_>) -> Result<String, AssemblyError> {
        let mut json = serde_json::to_string_pretty(report)
            .map_err(|e| AssemblyError::Write(format!("JSON report: {}", e)))?;
        json.push('\n');
        Ok(json)
    }
}
