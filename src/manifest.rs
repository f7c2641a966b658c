//! Discovery of requested package names from a metadata tree.
//!
//! The tree is laid out as `<module>/<os>/<release>/...`; any directory may
//! hold a `package.list` with one package name per line. The first three
//! directory levels can be narrowed with shell globs.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::ui::prelude::*;

pub const MANIFEST_FILE: &str = "package.list";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Invalid {level} filter '{pattern}': {source}")]
    BadPattern {
        level: &'static str,
        pattern: String,
        source: glob::PatternError,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Glob filters for the module, OS and release directory levels.
#[derive(Debug, Default, Clone)]
pub struct ManifestFilter {
    module: Option<Pattern>,
    os: Option<Pattern>,
    release: Option<Pattern>,
}

fn compile(level: &'static str, pattern: Option<&str>) -> Result<Option<Pattern>, ManifestError> {
    pattern
        .map(|p| {
            Pattern::new(p).map_err(|source| ManifestError::BadPattern {
                level,
                pattern: p.to_string(),
                source,
            })
        })
        .transpose()
}

impl ManifestFilter {
    pub fn new(
        module: Option<&str>,
        os: Option<&str>,
        release: Option<&str>,
    ) -> Result<Self, ManifestError> {
        Ok(Self {
            module: compile("module", module)?,
            os: compile("os", os)?,
            release: compile("release", release)?,
        })
    }

    fn pattern_for_depth(&self, depth: usize) -> Option<&Pattern> {
        match depth {
            1 => self.module.as_ref(),
            2 => self.os.as_ref(),
            3 => self.release.as_ref(),
            _ => None,
        }
    }

    fn admits(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return true;
        }
        match self.pattern_for_depth(entry.depth()) {
            Some(pattern) => pattern.matches(&entry.file_name().to_string_lossy()),
            None => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ManifestScan {
    /// Merged, deduplicated names in sorted order.
    pub names: BTreeSet<String>,
    pub manifests: Vec<PathBuf>,
}

/// Names listed in one manifest: trimmed, blank lines dropped.
pub fn parse_manifest(content: &str) -> impl Iterator<Item = &str> {
    content.lines().map(str::trim).filter(|l| !l.is_empty())
}

pub fn scan(root: &Path, filter: &ManifestFilter) -> Result<ManifestScan, ManifestError> {
    if !root.is_dir() {
        return Err(ManifestError::RootNotFound(root.to_path_buf()));
    }

    let mut result = ManifestScan::default();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| filter.admits(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                emit(
                    Level::Warn,
                    "manifest.walk.error",
                    &format!("Skipping unreadable path: {}", e),
                    None,
                );
                continue;
            }
        };

        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILE {
            continue;
        }

        let path = entry.path();
        emit(
            Level::Debug,
            "manifest.found",
            &format!("Found manifest: {}", path.display()),
            None,
        );
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        result
            .names
            .extend(parse_manifest(&content).map(str::to_string));
        result.manifests.push(path.to_path_buf());
    }

    Ok(result)
}
