//! Reference rewriter
//!
//! Rewrites every occurrence of a placeholder resource name in the merged
//! tree to its true name, at definition sites (`name="…"` in values
//! documents) and reference sites (`@type/name`, `?type/name`, style
//! parents, element text). Renaming can leave a document with two
//! definitions of the same resource, so values documents get a dedup pass
//! afterwards: first definition wins, references are never dropped.

use crate::catalog::{PlaceholderPattern, TrueNameMap};
use crate::discovery::FileKind;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Rewrite errors, fatal to the run
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Failed to parse {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
    #[error("Failed to rewrite {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Rewrite counts surfaced to the caller
#[derive(Debug, Default, Clone, Copy)]
pub struct RewriteStats {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub definitions_renamed: usize,
    pub references_updated: usize,
    pub duplicates_dropped: usize,
}

/// Rewrites placeholder names across the merged tree's resource documents
pub struct ReferenceRewriter<'a> {
    map: &'a TrueNameMap,
    token_regex: &'a Regex,
    definition_regex: Regex,
}

impl<'a> ReferenceRewriter<'a> {
    pub fn new(map: &'a TrueNameMap, pattern: &'a PlaceholderPattern) -> Self {
        let token = pattern.token_regex().as_str();
        let definition_regex =
            Regex::new(&format!("name=\"({token})\"")).expect("valid pattern");
        Self {
            map,
            token_regex: pattern.token_regex(),
            definition_regex,
        }
    }

    /// Rewrite every resource document under `res_dir`
    pub fn rewrite_tree(&self, res_dir: &Path) -> Result<RewriteStats, RewriteError> {
        let mut stats = RewriteStats::default();
        if !res_dir.exists() {
            return Ok(stats);
        }

        for entry in walkdir::WalkDir::new(res_dir) {
            let entry = entry.map_err(|source| RewriteError::Walk {
                path: res_dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_xml = entry
                .path()
                .extension()
                .map(|e| e.eq_ignore_ascii_case("xml"))
                .unwrap_or(false);
            if !is_xml {
                continue;
            }
            let rel = res_dir
                .parent()
                .and_then(|p| entry.path().strip_prefix(p).ok())
                .unwrap_or(entry.path());
            self.rewrite_document(entry.path(), FileKind::from_relative(rel), &mut stats)?;
        }

        debug!(
            "Rewrote {} of {} documents: {} definitions, {} references, {} duplicates dropped",
            stats.files_changed,
            stats.files_scanned,
            stats.definitions_renamed,
            stats.references_updated,
            stats.duplicates_dropped
        );
        Ok(stats)
    }

    fn rewrite_document(
        &self,
        path: &Path,
        kind: FileKind,
        stats: &mut RewriteStats,
    ) -> Result<(), RewriteError> {
        let original = std::fs::read_to_string(path).map_err(|source| RewriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        stats.files_scanned += 1;

        let mut definitions = 0usize;
        let mut references = 0usize;

        // Definition sites first so the remaining token matches are all
        // references.
        let renamed = if kind.is_values() {
            self.definition_regex
                .replace_all(&original, |caps: &regex::Captures<'_>| {
                    match self.map.resolve(&caps[1]) {
                        Some(true_name) => {
                            definitions += 1;
                            format!("name=\"{true_name}\"")
                        }
                        None => caps[0].to_string(),
                    }
                })
        } else {
            Cow::Borrowed(original.as_str())
        };

        let renamed = self
            .token_regex
            .replace_all(&renamed, |caps: &regex::Captures<'_>| {
                match self.map.resolve(&caps[0]) {
                    Some(true_name) => {
                        references += 1;
                        true_name.to_string()
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned();

        let mut dropped = 0usize;
        let deduped = if kind.is_values() {
            self.drop_duplicate_definitions(path, &renamed, kind, &mut dropped)?
        } else {
            renamed
        };

        stats.definitions_renamed += definitions;
        stats.references_updated += references;
        stats.duplicates_dropped += dropped;

        if deduped != original {
            trace!(
                "{}: {} definitions, {} references, {} duplicates",
                path.display(),
                definitions,
                references,
                dropped
            );
            stats.files_changed += 1;
            std::fs::write(path, deduped).map_err(|source| RewriteError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Remove top-level definitions that duplicate an earlier entry.
    ///
    /// Identifier tables are keyed by numeric id, other values documents by
    /// (type, name) — renaming two placeholder stubs to one true name must
    /// leave a single definition either way.
    fn drop_duplicate_definitions(
        &self,
        path: &Path,
        text: &str,
        kind: FileKind,
        dropped: &mut usize,
    ) -> Result<String, RewriteError> {
        let mut reader = Reader::from_str(text);
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut remove: Vec<(usize, usize)> = Vec::new();
        let mut depth = 0usize;

        loop {
            let start_pos = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let duplicate = depth == 1
                        && self
                            .definition_key(&e, kind)
                            .map(|key| !seen.insert(key))
                            .unwrap_or(false);
                    if duplicate {
                        reader.read_to_end(e.name()).map_err(|source| {
                            RewriteError::Malformed {
                                path: path.to_path_buf(),
                                source,
                            }
                        })?;
                        remove.push((start_pos, reader.buffer_position()));
                        *dropped += 1;
                    } else {
                        depth += 1;
                    }
                }
                Ok(Event::Empty(e)) => {
                    if depth == 1 {
                        if let Some(key) = self.definition_key(&e, kind) {
                            if !seen.insert(key) {
                                remove.push((start_pos, reader.buffer_position()));
                                *dropped += 1;
                            }
                        }
                    }
                }
                Ok(Event::End(_)) => {
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Eof) => break,
                Err(source) => {
                    return Err(RewriteError::Malformed {
                        path: path.to_path_buf(),
                        source,
                    })
                }
                _ => {}
            }
        }

        if remove.is_empty() {
            return Ok(text.to_string());
        }

        let mut result = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for (start, end) in remove {
            result.push_str(&text[cursor..start]);
            cursor = end;
        }
        result.push_str(&text[cursor..]);
        Ok(result)
    }

    /// Dedup key of a top-level values element, if it defines a resource
    fn definition_key(
        &self,
        e: &quick_xml::events::BytesStart<'_>,
        kind: FileKind,
    ) -> Option<(String, String)> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let mut name = None;
        let mut id = None;
        let mut res_type = None;
        for attr in e.attributes().filter_map(|a| a.ok()) {
            let value = String::from_utf8_lossy(&attr.value).to_string();
            match attr.key.as_ref() {
                b"name" => name = Some(value),
                b"id" => id = Some(value),
                b"type" => res_type = Some(value),
                _ => {}
            }
        }

        if kind == FileKind::PublicTable && tag == "public" {
            return id.map(|id| ("id".to_string(), id));
        }
        let type_key = res_type.filter(|_| tag == "item").unwrap_or(tag);
        name.map(|name| (type_key, name))
    }
}
