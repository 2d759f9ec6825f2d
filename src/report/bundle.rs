use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::error::AssemblyError;
use crate::util::sha256_hex;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ARCHIVE_FILE: &str = "bundle.tar.gz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    /// Forward-slash path relative to the bundle root.
    pub path: String,
    pub content: Vec<u8>,
}

impl BundleFile {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
}

/// Rendered reports, documents and artifacts of one run, plus their manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<BundleFile>,
    pub manifest: Vec<ManifestEntry>,
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> AssemblyError {
    AssemblyError::Write(format!("{}: {}", path.display(), e))
}

impl Bundle {
    pub fn new(run_id: Uuid, generated_at: DateTime<Utc>, files: Vec<BundleFile>) -> Self {
        let manifest = files
            .iter()
            .map(|f| ManifestEntry {
                path: f.path.clone(),
                size_bytes: f.content.len() as u64,
                sha256: sha256_hex(&f.content),
            })
            .collect();
        Self {
            run_id,
            generated_at,
            files,
            manifest,
        }
    }

    pub fn file(&self, path: &str) -> Option<&BundleFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Paths under `prefix` (e.g. "docs/"), in bundle order.
    pub fn paths_under(&self, prefix: &str) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.path.starts_with(prefix))
            .map(|f| f.path.as_str())
            .collect()
    }

    pub fn manifest_json(&self) -> Result<String, AssemblyError> {
        let manifest = Manifest {
            run_id: self.run_id,
            generated_at: self.generated_at,
            files: self.manifest.clone(),
        };
        serde_json::to_string_pretty(&manifest).map_err(|e| AssemblyError::Write(e.to_string()))
    }

    /// Write every file, `manifest.json` and `bundle.tar.gz` under `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, AssemblyError> {
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        for file in &self.files {
            let target = dir.join(&file.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            fs::write(&target, &file.content).map_err(|e| io_error(&target, e))?;
        }
        let manifest = self.manifest_json()?;
        let manifest_path = dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, &manifest).map_err(|e| io_error(&manifest_path, e))?;

        let archive_path = dir.join(ARCHIVE_FILE);
        let archive = fs::File::create(&archive_path).map_err(|e| io_error(&archive_path, e))?;
        self.write_archive(archive, manifest.as_bytes())
            .map_err(|e| io_error(&archive_path, e))?;

        info!(
            "Wrote {} files and {} to {}",
            self.files.len(),
            ARCHIVE_FILE,
            dir.display()
        );
        Ok(archive_path)
    }

    fn write_archive<W: std::io::Write>(&self, out: W, manifest: &[u8]) -> std::io::Result<()> {
        let encoder = GzEncoder::new(out, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let entries = self
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.content.as_slice()))
            .chain(std::iter::once((MANIFEST_FILE, manifest)));
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_cksum();
            builder.append_data(&mut header, path, content)?;
        }
        builder.into_inner()?.finish()?;
        Ok(())
    }
}
