use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::error::RepositoryError;
use crate::pipeline::input::AnalysisOptions;

/// Directories never worth walking into.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".git",
    ".venv",
    "venv",
    "env",
    "dist",
    "build",
    "target",
    "bin",
    "obj",
    "out",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    ".vscode",
    ".idea",
    ".gradle",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub default_branch: Option<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Forward-slash path relative to the snapshot root.
    pub path: String,
    pub size_bytes: u64,
}

/// A repository checked out (or found) on the local filesystem.
///
/// A cloned snapshot owns its temporary directory; dropping the snapshot
/// removes the clone.
#[derive(Debug)]
pub struct RepoSnapshot {
    pub root: PathBuf,
    pub metadata: RepoMetadata,
    pub files: Vec<SnapshotFile>,
    _checkout: Option<TempDir>,
}

impl RepoSnapshot {
    pub fn new(root: PathBuf, metadata: RepoMetadata, files: Vec<SnapshotFile>) -> Self {
        Self {
            root,
            metadata,
            files,
            _checkout: None,
        }
    }

    pub(crate) fn with_checkout(mut self, checkout: TempDir) -> Self {
        self._checkout = Some(checkout);
        self
    }

    pub fn read_to_string(&self, file: &SnapshotFile) -> std::io::Result<String> {
        let bytes = std::fs::read(self.root.join(&file.path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name) || name.ends_with(".egg-info")
}

/// Every regular file below `root`, honouring the depth limit and the
/// exclusion list, sorted by path.
pub fn walk(root: &Path, options: &AnalysisOptions) -> Result<Vec<SnapshotFile>, RepositoryError> {
    if !root.is_dir() {
        return Err(RepositoryError::Snapshot(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let walker = WalkBuilder::new(root)
        .max_depth(Some(options.max_depth))
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .follow_links(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir && entry.depth() > 0 && is_excluded(&entry.file_name().to_string_lossy()))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        // Paths escaping the root (via odd symlink setups) are never listed
        if relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            continue;
        }
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        files.push(SnapshotFile {
            path: relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            size_bytes,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Walked {} files under {}", files.len(), root.display());
    Ok(files)
}
