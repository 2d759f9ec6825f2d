use async_trait::async_trait;

use crate::error::RepositoryError;
use crate::pipeline::input::AnalysisOptions;

pub mod github;
pub mod snapshot;

pub use github::{
    parse_reference, reference_identity, GitRepositoryProvider, ReferenceIdentity, RepoReference,
};
pub use snapshot::{RepoMetadata, RepoSnapshot, SnapshotFile};

/// Turns a repository reference into a local file tree.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    async fn fetch(
        &self,
        reference: &str,
        options: &AnalysisOptions,
    ) -> Result<RepoSnapshot, RepositoryError>;
}
