// Prompt templates for the model-backed parts of each agent.
//
// Every template opens with a task marker line so offline clients and tests
// can tell prompts apart without parsing them.

pub const ARCHITECTURE_MARKER: &str = "TASK: architecture-summary";
pub const MATURITY_MARKER: &str = "TASK: stack-maturity";
pub const MIGRATION_MARKER: &str = "TASK: migration-risks";
pub const CODEGEN_MARKER: &str = "TASK: starter-code";
pub const DOCUMENTATION_MARKER: &str = "TASK: modernization-docs";

/// Documents every run produces, in bundle order.
pub const DOCUMENT_TITLES: [&str; 9] = [
    "Executive Summary",
    "Business Requirements",
    "Functional Overview",
    "Non-Functional Requirements",
    "Current Architecture",
    "Target Architecture",
    "API Contracts",
    "Risks and Assumptions",
    "Migration Plan",
];

pub fn architecture_summary(repository: &str, structure_json: &str) -> String {
    format!(
        r#"{marker}
You are a software architect reviewing the repository {repo}.

Below is a structural summary extracted by static analysis: language
distribution, entry points, configuration files, dependencies, detected
architecture patterns and code metrics.

Describe the architecture in a few sentences, name its main components and
list the most pressing architectural concerns.

Respond with ONLY a JSON object:
{{
  "summary": "...",
  "components": ["..."],
  "concerns": ["..."]
}}

Structure:
{structure}
"#,
        marker = ARCHITECTURE_MARKER,
        repo = repository,
        structure = structure_json
    )
}

pub fn stack_maturity(detected_json: &str) -> String {
    format!(
        r#"{marker}
You are assessing how current a technology stack is.

Detected stack (languages, frameworks, libraries, databases):
{detected}

Classify the stack as one of "legacy", "mature" or "modern" and list concrete
modernization opportunities.

Respond with ONLY a JSON object:
{{
  "maturity": "legacy" | "mature" | "modern",
  "opportunities": ["..."]
}}
"#,
        marker = MATURITY_MARKER,
        detected = detected_json
    )
}

pub fn migration_risks(current: &str, target: &str, plan_json: &str, requirements: &str) -> String {
    format!(
        r#"{marker}
You are planning a migration from {current} to {target}.

Draft plan (difficulty, phases, risks):
{plan}

Additional requirements from the stakeholders:
{requirements}

Identify breaking changes specific to this migration and give actionable
recommendations. Do not repeat the phases.

Respond with ONLY a JSON object:
{{
  "breaking_changes": [{{"area": "...", "description": "...", "mitigation": "..."}}],
  "recommendations": ["..."]
}}
"#,
        marker = MIGRATION_MARKER,
        current = current,
        target = target,
        plan = plan_json,
        requirements = if requirements.is_empty() {
            "(none provided)"
        } else {
            requirements
        }
    )
}

pub fn starter_code(target: &str, scaffold_paths: &[String], plan_json: &str) -> String {
    format!(
        r#"{marker}
You are generating starter code for a new {target} project.

These files are already provided by the scaffold and must not be repeated:
{scaffold}

Migration plan:
{plan}

Add a small number of additional files that demonstrate the target structure
(routers, services, data access). Paths must be relative and must not contain
"..".

Respond with ONLY a JSON object:
{{
  "files": [{{"path": "...", "content": "...", "description": "..."}}]
}}
"#,
        marker = CODEGEN_MARKER,
        target = target,
        scaffold = scaffold_paths.join("\n"),
        plan = plan_json
    )
}

pub fn modernization_docs(target: &str, context_json: &str) -> String {
    let titles = DOCUMENT_TITLES
        .iter()
        .map(|t| format!("- {}", t))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"{marker}
You are writing modernization documentation for a move to {target}.

Write one Markdown section for each of these documents, using exactly these
titles:
{titles}

Project context (analysis, detected stack, migration plan, generated files):
{context}

Respond with ONLY a JSON object:
{{
  "sections": [{{"title": "...", "content": "..."}}]
}}
"#,
        marker = DOCUMENTATION_MARKER,
        target = target,
        titles = titles,
        context = context_json
    )
}
