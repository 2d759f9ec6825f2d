pub mod fingerprint;
pub mod store;

pub use fingerprint::fingerprint;
pub use store::{CacheEntry, CacheStats, CacheStore};

/// Cache namespaces, one per stage plus the per-file parse cache.
pub mod category {
    pub const REPO_STRUCTURE: &str = "repo_structure";
    pub const TECH_STACK: &str = "tech_stack";
    pub const MIGRATION_PLAN: &str = "migration_plan";
    pub const GENERATED_CODE: &str = "generated_code";
    pub const DOCUMENTATION: &str = "documentation";
    pub const FILE_ANALYSIS: &str = "file_analysis";
}
