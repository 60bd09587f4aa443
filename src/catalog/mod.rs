//! Resource identifier catalog
//!
//! Each split of an app bundle is compiled separately, so a resource that
//! lives in one split is only known to the others by its numeric id. When
//! the decompiler cannot recover a name it assigns a synthetic placeholder
//! (`APKTOOL_DUMMY_<hex>`). This module parses every split's
//! public-identifier table, groups entries by numeric id and binds each
//! placeholder to the true name recovered from whichever split defined it.

use crate::discovery::SplitSet;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to parse {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
    #[error("Invalid resource id {value:?} in {path}")]
    InvalidId { path: PathBuf, value: String },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A compiled resource identifier: package, type and entry packed as
/// `0xPPTTEEEE` in the identifier tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u32);

impl ResourceId {
    pub fn parse(text: &str) -> Option<Self> {
        let hex = text.strip_prefix("0x").unwrap_or(text);
        u32::from_str_radix(hex, 16).ok().map(Self)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Package byte (0x7f for app resources)
    pub fn package(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Type byte, assigned per compilation unit
    pub fn type_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Entry index within the type
    pub fn entry(self) -> u16 {
        self.0 as u16
    }

    pub fn from_parts(package: u8, type_id: u8, entry: u16) -> Self {
        Self(((package as u32) << 24) | ((type_id as u32) << 16) | entry as u32)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// One entry of a public-identifier table
#[derive(Debug, Clone)]
pub struct IdentifierEntry {
    pub id: ResourceId,
    pub res_type: String,
    pub name: String,
    pub placeholder: bool,
}

/// Matcher for synthetic placeholder names: a fixed prefix followed by a
/// hexadecimal id. The prefix is configurable; a name that carries the
/// prefix but no hex suffix is treated as user-defined.
#[derive(Debug, Clone)]
pub struct PlaceholderPattern {
    regex: Regex,
    token_regex: Regex,
}

impl PlaceholderPattern {
    pub fn new(prefix: &str) -> Self {
        let escaped = regex::escape(prefix);
        let regex = Regex::new(&format!("^{escaped}[0-9a-fA-F]+$")).expect("valid pattern");
        let token_regex =
            Regex::new(&format!(r"\b{escaped}[0-9a-fA-F]+\b")).expect("valid pattern");
        Self { regex, token_regex }
    }

    /// Whole-name check, used when classifying table entries
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Token matcher for scanning document text, bounded so that names
    /// merely sharing the prefix are not corrupted
    pub fn token_regex(&self) -> &Regex {
        &self.token_regex
    }
}

/// A parsed public-identifier table
#[derive(Debug)]
pub struct PublicTable {
    pub path: PathBuf,
    pub entries: Vec<IdentifierEntry>,
}

impl PublicTable {
    /// Parse a `public.xml` identifier table
    pub fn parse(path: &Path, pattern: &PlaceholderPattern) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = Reader::from_str(&contents);
        let mut entries = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    if e.name().as_ref() != b"public" {
                        continue;
                    }
                    let mut res_type = None;
                    let mut name = None;
                    let mut id = None;
                    for attr in e.attributes().filter_map(|a| a.ok()) {
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        match attr.key.as_ref() {
                            b"type" => res_type = Some(value),
                            b"name" => name = Some(value),
                            b"id" => id = Some(value),
                            _ => {}
                        }
                    }
                    if let (Some(res_type), Some(name), Some(id_text)) = (res_type, name, id) {
                        let id = ResourceId::parse(&id_text).ok_or_else(|| {
                            CatalogError::InvalidId {
                                path: path.to_path_buf(),
                                value: id_text,
                            }
                        })?;
                        let placeholder = pattern.matches(&name);
                        entries.push(IdentifierEntry {
                            id,
                            res_type,
                            name,
                            placeholder,
                        });
                    }
                }
                Ok(Event::Eof) => break,
                Err(source) => {
                    return Err(CatalogError::Malformed {
                        path: path.to_path_buf(),
                        source,
                    })
                }
                _ => {}
            }
        }

        debug!("Parsed {}: {} entries", path.display(), entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Highest entry index per (package, type), used when allocating fresh
    /// ids for publicized resources
    pub fn max_entries(&self) -> HashMap<(u8, u8), u16> {
        let mut max: HashMap<(u8, u8), u16> = HashMap::new();
        for entry in &self.entries {
            let key = (entry.id.package(), entry.id.type_id());
            let current = max.entry(key).or_insert(0);
            if entry.id.entry() > *current {
                *current = entry.id.entry();
            }
        }
        max
    }
}

/// A conflicting binding: two splits recovered different true names for
/// the same identifier. Base's binding wins.
#[derive(Debug, Clone)]
pub struct BindingConflict {
    pub id: ResourceId,
    pub kept: String,
    pub discarded: String,
}

/// Immutable placeholder-name to true-name mapping, built once by the
/// catalog and passed read-only to the rewriter.
#[derive(Debug, Default)]
pub struct TrueNameMap {
    map: HashMap<String, String>,
    unresolved: HashSet<String>,
}

impl TrueNameMap {
    pub fn resolve(&self, placeholder: &str) -> Option<&str> {
        self.map.get(placeholder).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn unresolved(&self) -> &HashSet<String> {
        &self.unresolved
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            map: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            unresolved: HashSet::new(),
        }
    }
}

/// Resolution counts surfaced to the caller
#[derive(Debug, Default)]
pub struct CatalogReport {
    pub tables_scanned: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub conflicts: Vec<BindingConflict>,
}

/// Builds the [`TrueNameMap`] from the identifier tables of a split set
pub struct IdentifierCatalog {
    pattern: PlaceholderPattern,
}

impl IdentifierCatalog {
    pub fn new(pattern: PlaceholderPattern) -> Self {
        Self { pattern }
    }

    pub fn pattern(&self) -> &PlaceholderPattern {
        &self.pattern
    }

    /// Scan every split's identifier table and cross-reference the entries.
    ///
    /// Read-only: the returned map and report are plain data for the later
    /// stages. Splits without a table contribute nothing.
    pub fn build(&self, set: &SplitSet) -> Result<(TrueNameMap, CatalogReport), CatalogError> {
        let mut report = CatalogReport::default();

        // Entries from all tables grouped by numeric id; base's table is
        // scanned first so its bindings win every tie-break below.
        let mut groups: BTreeMap<ResourceId, Vec<IdentifierEntry>> = BTreeMap::new();
        for tree in set.iter() {
            let Some(table_path) = tree.public_table_path() else {
                debug!("{}: no identifier table, skipping", tree.name);
                continue;
            };
            let table = PublicTable::parse(&table_path, &self.pattern)?;
            report.tables_scanned += 1;
            for entry in table.entries {
                groups.entry(entry.id).or_default().push(entry);
            }
        }

        let mut map = TrueNameMap::default();
        for (id, entries) in &groups {
            let mut true_names: Vec<&str> = Vec::new();
            for entry in entries.iter().filter(|e| !e.placeholder) {
                if !true_names.contains(&entry.name.as_str()) {
                    true_names.push(&entry.name);
                }
            }

            // More than one distinct true name for one identifier: keep the
            // first in scan order (base first), report the rest.
            if true_names.len() > 1 {
                for discarded in &true_names[1..] {
                    warn!(
                        "Conflicting names for {}: keeping {:?}, discarding {:?}",
                        id, true_names[0], discarded
                    );
                    report.conflicts.push(BindingConflict {
                        id: *id,
                        kept: true_names[0].to_string(),
                        discarded: discarded.to_string(),
                    });
                }
            }

            for entry in entries.iter().filter(|e| e.placeholder) {
                match true_names.first() {
                    Some(true_name) => {
                        let previous = map
                            .map
                            .insert(entry.name.clone(), true_name.to_string());
                        if let Some(previous) = previous {
                            if previous != *true_name {
                                // The same placeholder name can stand in for
                                // two identifiers when entry indices collide
                                // across types; first binding wins.
                                warn!(
                                    "Placeholder {} already bound to {:?}, ignoring {:?}",
                                    entry.name, previous, true_name
                                );
                                report.conflicts.push(BindingConflict {
                                    id: *id,
                                    kept: previous.clone(),
                                    discarded: true_name.to_string(),
                                });
                                map.map.insert(entry.name.clone(), previous);
                            }
                        }
                    }
                    None => {
                        map.unresolved.insert(entry.name.clone());
                    }
                }
            }
        }

        report.resolved = map.map.len();
        report.unresolved = map.unresolved.len();
        info!(
            "Resolved {} placeholder name(s), {} unresolved, {} conflict(s)",
            report.resolved,
            report.unresolved,
            report.conflicts.len()
        );
        Ok((map, report))
    }
}
