//! Repository fetch collaborator.
//!
//! Cloning from a forge is outside this crate; the shipped implementation
//! reads an existing checkout from disk. The trait keeps the seam mockable.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, trace, warn};

use crate::classifier::{FileEntry, FileTree};

/// Files larger than this are never read into a tree.
const MAX_FETCH_FILE_BYTES: u64 = 512 * 1024;

/// Directories skipped during a local walk.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", ".venv", "__pycache__"];

/// Errors surfaced while obtaining a repository's file tree.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    #[error("repository not found: {source_ref}")]
    NotFound { source_ref: String },
    #[error("authentication required for {source_ref}")]
    AuthRequired { source_ref: String },
    #[error("fetch rate limited for {source_ref}")]
    RateLimited { source_ref: String },
    #[error("network error fetching {source_ref}: {message}")]
    Network { source_ref: String, message: String },
}

/// Turns a repository identifier into a file tree with contents.
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    async fn fetch(&self, source_ref: &str) -> Result<FileTree, FetchError>;
}

/// Fetcher that walks a local checkout directory.
#[derive(Debug, Default, Clone)]
pub struct LocalFetcher;

impl LocalFetcher {
    pub fn new() -> Self {
        Self
    }

    fn walk(root: &Path, dir: &Path, files: &mut Vec<FileEntry>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() {
                if SKIP_DIRS.contains(&name.as_str()) {
                    continue;
                }
                Self::walk(root, &path, files)?;
                continue;
            }
            let metadata = entry.metadata()?;
            if metadata.len() > MAX_FETCH_FILE_BYTES {
                trace!(path = %path.display(), size = metadata.len(), "skipping oversized file");
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => files.push(FileEntry {
                    path: relative_path(root, &path),
                    content,
                }),
                // Binary or non-UTF-8 files carry no analyzable text.
                Err(err) => trace!(path = %path.display(), %err, "skipping unreadable file"),
            }
        }
        Ok(())
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl RepositoryFetcher for LocalFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, source_ref: &str) -> Result<FileTree, FetchError> {
        let root = PathBuf::from(source_ref);
        if !root.is_dir() {
            return Err(FetchError::NotFound {
                source_ref: source_ref.to_string(),
            });
        }
        let mut files = Vec::new();
        Self::walk(&root, &root, &mut files).map_err(|err| {
            warn!(%err, "local walk failed");
            FetchError::Network {
                source_ref: source_ref.to_string(),
                message: err.to_string(),
            }
        })?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(FileTree::new(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let err = LocalFetcher::new()
            .fetch("/definitely/not/here")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn walks_checkout_and_skips_noise() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/auth.py"), "token").unwrap();
        fs::write(root.join(".git/HEAD"), "ref: main").unwrap();
        fs::write(root.join("logo.png"), [0u8, 159, 146, 150]).unwrap();

        let tree = LocalFetcher::new()
            .fetch(root.to_str().unwrap())
            .await
            .unwrap();
        let paths: Vec<_> = tree.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/auth.py"]);
    }

    #[tokio::test]
    async fn paths_are_relative_and_sorted() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("b/main.py"), "run").unwrap();
        fs::write(root.join("a.py"), "pass").unwrap();

        let tree = LocalFetcher::new()
            .fetch(root.to_str().unwrap())
            .await
            .unwrap();
        let paths: Vec<_> = tree.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b/main.py"]);
    }
}
