use async_trait::async_trait;
use auth_git2::GitAuthenticator;
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::TempDir;
use tracing::{debug, info};

use super::snapshot::{walk, RepoMetadata, RepoSnapshot};
use super::RepositoryProvider;
use crate::config::GithubConfig;
use crate::error::RepositoryError;
use crate::pipeline::input::AnalysisOptions;
use crate::util::{sha256_hex, SecretString};

/// Where a repository reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoReference {
    Local(PathBuf),
    GitHub { owner: String, name: String },
}

/// Accepts an existing local directory, `https://github.com/o/r(.git)`,
/// `git@github.com:o/r(.git)` or the `o/r` shorthand.
pub fn parse_reference(reference: &str) -> Result<RepoReference, RepositoryError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::InvalidReference(reference.to_string()));
    }

    let local = Path::new(trimmed);
    if local.is_dir() {
        return Ok(RepoReference::Local(local.to_path_buf()));
    }

    let patterns = [
        r"^https?://(?:www\.)?github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$",
        r"^git@github\.com:([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?$",
        r"^([A-Za-z0-9_-][A-Za-z0-9_.-]*)/([A-Za-z0-9_.-]+?)(?:\.git)?$",
    ];
    for pattern in patterns {
        let re = Regex::new(pattern)
            .map_err(|e| RepositoryError::InvalidReference(format!("{}: {}", reference, e)))?;
        if let Some(c) = re.captures(trimmed) {
            let owner = c[1].to_string();
            let name = c[2].to_string();
            if owner == ".." || name == ".." || owner == "." || name == "." {
                break;
            }
            return Ok(RepoReference::GitHub { owner, name });
        }
    }

    Err(RepositoryError::InvalidReference(reference.to_string()))
}

/// What a reference resolves to for caching: GitHub forms collapse to
/// `owner/name`, local directories to their canonical path plus a digest
/// of the tree the analyzer would walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceIdentity {
    pub reference: String,
    pub revision: Option<String>,
}

pub fn reference_identity(reference: &str, options: &AnalysisOptions) -> ReferenceIdentity {
    match parse_reference(reference) {
        Ok(RepoReference::GitHub { owner, name }) => ReferenceIdentity {
            reference: format!("{}/{}", owner, name),
            revision: None,
        },
        Ok(RepoReference::Local(path)) => {
            let path = path.canonicalize().unwrap_or(path);
            let revision = local_revision(&path, options);
            ReferenceIdentity {
                reference: path.to_string_lossy().into_owned(),
                revision,
            }
        }
        // Left as given; the fetch reports the error
        Err(_) => ReferenceIdentity {
            reference: reference.trim().to_string(),
            revision: None,
        },
    }
}

fn head_oid(path: &Path) -> Option<git2::Oid> {
    let repo = git2::Repository::open(path).ok()?;
    let oid = repo.head().ok()?.target();
    oid
}

/// HEAD commit when the directory is a git work tree, then path, size and
/// modification time of every walked file.
fn local_revision(path: &Path, options: &AnalysisOptions) -> Option<String> {
    let files = walk(path, options).ok()?;
    let mut material = String::new();
    if let Some(oid) = head_oid(path) {
        let _ = writeln!(material, "{}", oid);
    }
    for file in &files {
        let modified = fs::metadata(path.join(&file.path))
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let _ = writeln!(material, "{}\t{}\t{}", file.path, file.size_bytes, modified);
    }
    Some(sha256_hex(material.as_bytes()))
}

/// Clones GitHub repositories with libgit2; uses local directories in place.
pub struct GitRepositoryProvider {
    token: Option<SecretString>,
    clone_depth: u32,
}

impl GitRepositoryProvider {
    pub fn new() -> Self {
        Self {
            token: None,
            clone_depth: 1,
        }
    }

    pub fn from_config(config: &GithubConfig) -> Self {
        Self {
            token: config.get_token(),
            clone_depth: config.clone_depth,
        }
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_clone_depth(mut self, depth: u32) -> Self {
        self.clone_depth = depth;
        self
    }
}

impl Default for GitRepositoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_into(
    url: &str,
    dest: &Path,
    depth: u32,
    token: Option<&SecretString>,
) -> Result<git2::Repository, git2::Error> {
    let mut auth = GitAuthenticator::default();
    if let Some(token) = token {
        auth = auth.add_plaintext_credentials("github.com", "x-access-token", token.expose());
    }
    let git_config = git2::Config::open_default()?;

    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(auth.credentials(&git_config));

    let mut fetch = git2::FetchOptions::new();
    fetch.remote_callbacks(callbacks);
    if depth > 0 {
        fetch.depth(depth as i32);
    }

    // Bound first so the builder drops before the callbacks' borrows end.
    let repo = git2::build::RepoBuilder::new()
        .fetch_options(fetch)
        .clone(url, dest);
    repo
}

fn head_branch(repo: &git2::Repository) -> Option<String> {
    repo.head()
        .ok()
        .and_then(|h| h.shorthand().map(|s| s.to_string()))
}

fn local_metadata(path: &Path) -> RepoMetadata {
    let name = path
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "repository".to_string());
    RepoMetadata {
        owner: "local".to_string(),
        full_name: format!("local/{}", name),
        name,
        default_branch: git2::Repository::open(path)
            .ok()
            .and_then(|r| head_branch(&r)),
        size_bytes: 0,
    }
}

fn snapshot_blocking(
    reference: &str,
    parsed: RepoReference,
    options: AnalysisOptions,
    depth: u32,
    token: Option<SecretString>,
) -> Result<RepoSnapshot, RepositoryError> {
    match parsed {
        RepoReference::Local(path) => {
            let mut metadata = local_metadata(&path);
            let files = walk(&path, &options)?;
            metadata.size_bytes = files.iter().map(|f| f.size_bytes).sum();
            Ok(RepoSnapshot::new(path, metadata, files))
        }
        RepoReference::GitHub { owner, name } => {
            let url = format!("https://github.com/{}/{}.git", owner, name);
            let checkout = TempDir::new().map_err(|e| RepositoryError::Snapshot(e.to_string()))?;
            let dest = checkout.path().join(&name);
            info!("Cloning {} (depth {})", url, depth);
            let repo = clone_into(&url, &dest, depth, token.as_ref()).map_err(|e| {
                RepositoryError::Unreachable {
                    reference: reference.to_string(),
                    reason: e.message().to_string(),
                }
            })?;
            let files = walk(&dest, &options)?;
            let metadata = RepoMetadata {
                full_name: format!("{}/{}", owner, name),
                owner,
                name,
                default_branch: head_branch(&repo),
                size_bytes: files.iter().map(|f| f.size_bytes).sum(),
            };
            debug!("Cloned {} files from {}", files.len(), metadata.full_name);
            Ok(RepoSnapshot::new(dest, metadata, files).with_checkout(checkout))
        }
    }
}

#[async_trait]
impl RepositoryProvider for GitRepositoryProvider {
    async fn fetch(
        &self,
        reference: &str,
        options: &AnalysisOptions,
    ) -> Result<RepoSnapshot, RepositoryError> {
        let parsed = parse_reference(reference)?;
        let reference = reference.to_string();
        let options = *options;
        let depth = self.clone_depth;
        let token = self.token.clone();
        // libgit2 and the directory walk both block
        tokio::task::spawn_blocking(move || {
            snapshot_blocking(&reference, parsed, options, depth, token)
        })
        .await
        .map_err(|e| RepositoryError::Snapshot(format!("snapshot task failed: {}", e)))?
    }
}
