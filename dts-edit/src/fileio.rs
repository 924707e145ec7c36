//! File access collaborators for the tokenizer (spec.md §4.1, §6).
//!
//! The tokenizer is parameterized over a [`FileOpener`] so that the same
//! inclusion-following logic works whether sources come from the local
//! filesystem or from a git branch (`-b BRANCH`). Both implementations are
//! external collaborators in the sense of spec.md §1: their own I/O
//! mechanics are not normative, only the trait they satisfy.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{DtsError, IoErrorMsg};

/// A pluggable source of file bytes, keyed by the path text that appeared
/// in an `#include`/`/include/` directive.
pub trait FileOpener {
    fn open(&self, path: &str) -> Result<Vec<u8>, DtsError>;
    fn exists(&self, path: &str) -> bool;
}

/// Reads files straight off the local filesystem, resolving relative
/// include paths against a list of search directories (checked in order,
/// the way a C preprocessor's `-I` search path works).
pub struct LocalFileOpener {
    pub search_dirs: Vec<PathBuf>,
}

impl LocalFileOpener {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let p = Path::new(path);
        if p.is_absolute() && p.exists() {
            return Some(p.to_path_buf());
        }
        for dir in &self.search_dirs {
            let candidate = dir.join(path);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        if p.exists() {
            return Some(p.to_path_buf());
        }
        None
    }
}

impl FileOpener for LocalFileOpener {
    fn open(&self, path: &str) -> Result<Vec<u8>, DtsError> {
        let resolved = self
            .resolve(path)
            .ok_or_else(|| DtsError::IncludeNotFound {
                file: String::new(),
                path: path.to_string(),
            })?;
        std::fs::read(&resolved).map_err(|e| DtsError::Io {
            path: resolved.display().to_string(),
            source: IoErrorMsg::from(e),
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }
}

/// Reads files out of a git branch via `git show BRANCH:./PATH`, probing
/// existence with `git cat-file -e` (spec.md §6).
pub struct GitBranchOpener {
    pub branch: String,
}

impl GitBranchOpener {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
        }
    }

    fn spec(&self, path: &str) -> String {
        format!("{}:./{}", self.branch, path.trim_start_matches("./"))
    }
}

impl FileOpener for GitBranchOpener {
    fn open(&self, path: &str) -> Result<Vec<u8>, DtsError> {
        let output = Command::new("git")
            .arg("show")
            .arg(self.spec(path))
            .output()
            .map_err(|e| DtsError::Io {
                path: path.to_string(),
                source: IoErrorMsg::from(e),
            })?;
        if !output.status.success() {
            return Err(DtsError::IncludeNotFound {
                file: String::new(),
                path: path.to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn exists(&self, path: &str) -> bool {
        Command::new("git")
            .arg("cat-file")
            .arg("-e")
            .arg(self.spec(path))
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
