//! Tree merger
//!
//! Folds every split's extracted tree into the base tree. Directories are
//! created as needed, files are copied when absent, and path collisions
//! follow the base-wins policy. Colliding values documents are the
//! exception: their entries are appended into the base document so the
//! rewriter can deduplicate them by identifier instead of dropping whole
//! files.

use crate::config::MergeConfig;
use crate::discovery::{FileKind, SplitTree};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Merge errors, all fatal to the run
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to copy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Path collision between file and directory at {0}")]
    KindCollision(PathBuf),
    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("Malformed resource document {0}: missing <resources> element")]
    MalformedValues(PathBuf),
}

/// Per-split merge counts
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeStats {
    pub files_copied: usize,
    pub files_skipped: usize,
    pub values_merged: usize,
    pub dirs_created: usize,
}

impl MergeStats {
    pub fn absorb(&mut self, other: MergeStats) {
        self.files_copied += other.files_copied;
        self.files_skipped += other.files_skipped;
        self.values_merged += other.values_merged;
        self.dirs_created += other.dirs_created;
    }
}

/// Folds split trees into the base tree, in place.
///
/// Not re-entrant: after a failed run the base tree must be re-extracted
/// before merging again.
pub struct TreeMerger<'a> {
    base_root: PathBuf,
    config: &'a MergeConfig,
}

impl<'a> TreeMerger<'a> {
    pub fn new(base_root: &Path, config: &'a MergeConfig) -> Self {
        Self {
            base_root: base_root.to_path_buf(),
            config,
        }
    }

    /// Merge one split's tree into the base tree
    pub fn merge_split(&self, split: &SplitTree) -> Result<MergeStats, MergeError> {
        debug!("Merging {} into base", split.name);
        let mut stats = MergeStats::default();

        let skip_dirs = &self.config.skip_dirs;
        let walker = walkdir::WalkDir::new(&split.root)
            .into_iter()
            .filter_entry(|e| {
                // Decompiler metadata at the split root never merges
                let name = e.file_name().to_string_lossy();
                e.depth() != 1
                    || !e.file_type().is_dir()
                    || !skip_dirs.iter().any(|d| name == d.as_str())
            });

        for entry in walker {
            let entry = entry.map_err(|source| MergeError::Walk {
                path: split.root.clone(),
                source,
            })?;
            if entry.depth() == 0 {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&split.root)
                .unwrap_or(entry.path());
            let target = self.base_root.join(rel);

            if entry.file_type().is_dir() {
                if target.is_file() {
                    return Err(MergeError::KindCollision(target));
                }
                if !target.exists() {
                    trace!("Creating directory {}", rel.display());
                    std::fs::create_dir_all(&target).map_err(|source| MergeError::Io {
                        path: target.clone(),
                        source,
                    })?;
                    stats.dirs_created += 1;
                }
                continue;
            }

            // Each split carries its own manifest and decompiler config;
            // only base's are authoritative.
            let file_name = entry.file_name().to_string_lossy();
            if entry.depth() == 1
                && self
                    .config
                    .skip_root_files
                    .iter()
                    .any(|f| file_name == f.as_str())
            {
                trace!("Skipping split-local file {}", rel.display());
                continue;
            }

            if !target.exists() {
                trace!("Copying {}", rel.display());
                std::fs::copy(entry.path(), &target).map_err(|source| MergeError::Io {
                    path: target.clone(),
                    source,
                })?;
                stats.files_copied += 1;
                continue;
            }
            if target.is_dir() {
                return Err(MergeError::KindCollision(target));
            }

            if FileKind::from_relative(rel).is_values() {
                trace!("Merging values document {}", rel.display());
                merge_values_file(entry.path(), &target)?;
                stats.values_merged += 1;
            } else {
                trace!("Base wins collision at {}", rel.display());
                stats.files_skipped += 1;
            }
        }

        Ok(stats)
    }
}

/// Append the entries of a split's values document into the base's copy.
///
/// Entries are appended verbatim before the closing tag; duplicate
/// (type, name) definitions are left for the rewriter's dedup pass.
fn merge_values_file(split_path: &Path, base_path: &Path) -> Result<(), MergeError> {
    let split_text = std::fs::read_to_string(split_path).map_err(|source| MergeError::Io {
        path: split_path.to_path_buf(),
        source,
    })?;
    let base_text = std::fs::read_to_string(base_path).map_err(|source| MergeError::Io {
        path: base_path.to_path_buf(),
        source,
    })?;

    let inner = values_body(&split_text)
        .ok_or_else(|| MergeError::MalformedValues(split_path.to_path_buf()))?;
    if inner.trim().is_empty() {
        return Ok(());
    }

    let merged = insert_into_resources(&base_text, inner)
        .ok_or_else(|| MergeError::MalformedValues(base_path.to_path_buf()))?;

    std::fs::write(base_path, merged).map_err(|source| MergeError::Io {
        path: base_path.to_path_buf(),
        source,
    })
}

/// The text between a document's `<resources>` tags
fn values_body(text: &str) -> Option<&str> {
    let open = text.find("<resources")?;
    let gt = text[open..].find('>')? + open;
    if text[..gt].ends_with('/') {
        // Self-closing document, empty body
        return Some("");
    }
    let close = text.rfind("</resources>")?;
    if close < gt + 1 {
        return None;
    }
    Some(&text[gt + 1..close])
}

/// Insert entries before a document's closing `</resources>` tag,
/// expanding a self-closing document when needed
fn insert_into_resources(base_text: &str, inner: &str) -> Option<String> {
    if let Some(close) = base_text.rfind("</resources>") {
        let mut merged = String::with_capacity(base_text.len() + inner.len() + 1);
        merged.push_str(&base_text[..close]);
        merged.push_str(inner.trim_end());
        merged.push('\n');
        merged.push_str(&base_text[close..]);
        return Some(merged);
    }
    let open = base_text.find("<resources")?;
    let gt = base_text[open..].find('>')? + open;
    if !base_text[..gt].ends_with('/') {
        return None;
    }
    let mut merged = String::with_capacity(base_text.len() + inner.len() + 16);
    merged.push_str(&base_text[..gt - 1]);
    merged.push('>');
    merged.push_str(inner.trim_end());
    merged.push('\n');
    merged.push_str("</resources>");
    merged.push_str(&base_text[gt + 1..]);
    Some(merged)
}
