use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No AndroidManifest.xml found in {0}")]
    MissingManifest(PathBuf),
    #[error("Failed to parse {path}: {source}")]
    MalformedManifest {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Role of a decompiled tree within an app bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitRole {
    Base,
    Split,
}

/// One decompiled package tree
#[derive(Debug, Clone)]
pub struct SplitTree {
    /// Root directory of the extracted tree
    pub root: PathBuf,

    /// Display name (directory name, or the manifest's split id)
    pub name: String,

    /// Base or configuration split
    pub role: SplitRole,
}

impl SplitTree {
    pub fn new(root: PathBuf, role: SplitRole) -> Self {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());
        Self { root, name, role }
    }

    pub fn is_base(&self) -> bool {
        self.role == SplitRole::Base
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("AndroidManifest.xml")
    }

    pub fn resource_dir(&self) -> PathBuf {
        self.root.join("res")
    }

    /// Path of the public-identifier table, if the split has one
    pub fn public_table_path(&self) -> Option<PathBuf> {
        let path = self.root.join("res").join("values").join("public.xml");
        path.exists().then_some(path)
    }
}

/// The classified inputs of one reconciliation run
#[derive(Debug)]
pub struct SplitSet {
    pub base: SplitTree,
    pub splits: Vec<SplitTree>,
}

impl SplitSet {
    /// Build a split set from tree roots, with `base_index` naming the base.
    pub fn from_roots(roots: &[PathBuf], base_index: usize) -> Self {
        let base = SplitTree::new(roots[base_index].clone(), SplitRole::Base);
        let splits = roots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != base_index)
            .map(|(_, root)| SplitTree::new(root.clone(), SplitRole::Split))
            .collect();
        Self { base, splits }
    }

    /// Indices of trees whose manifest does not declare a split identity.
    ///
    /// A well-formed bundle yields exactly one candidate; zero or several
    /// means the caller has to disambiguate.
    pub fn base_candidates(roots: &[PathBuf]) -> Result<Vec<usize>, DiscoveryError> {
        let mut candidates = Vec::new();
        for (i, root) in roots.iter().enumerate() {
            if split_id(root)?.is_none() {
                candidates.push(i);
            }
        }
        debug!("{} base candidate(s) among {} trees", candidates.len(), roots.len());
        Ok(candidates)
    }

    /// All trees, base first
    pub fn iter(&self) -> impl Iterator<Item = &SplitTree> {
        std::iter::once(&self.base).chain(self.splits.iter())
    }
}

/// Read the `split` attribute of a tree's manifest element, if any
fn split_id(root: &Path) -> Result<Option<String>, DiscoveryError> {
    let manifest = root.join("AndroidManifest.xml");
    if !manifest.exists() {
        return Err(DiscoveryError::MissingManifest(root.to_path_buf()));
    }
    let contents = std::fs::read_to_string(&manifest).map_err(|source| DiscoveryError::Io {
        path: manifest.clone(),
        source,
    })?;

    let mut reader = Reader::from_str(&contents);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"manifest" {
                    for attr in e.attributes().filter_map(|a| a.ok()) {
                        if attr.key.as_ref() == b"split" {
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            return Ok(Some(value));
                        }
                    }
                    return Ok(None);
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(source) => {
                return Err(DiscoveryError::MalformedManifest {
                    path: manifest,
                    source,
                })
            }
            _ => {}
        }
    }
}

/// Kind of file within a decompiled tree, relative to the tree root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// AndroidManifest.xml at the tree root
    Manifest,
    /// apktool.yml at the tree root
    ApktoolConfig,
    /// res/values*/public.xml
    PublicTable,
    /// XML under a res/values* directory (resource definitions)
    ValuesResource,
    /// Any other XML under res/
    ResourceXml,
    /// Non-XML file under res/ (drawables, raw assets)
    ResourceOther,
    /// Everything else (code, libs, assets)
    Other,
}

impl FileKind {
    /// Classify a path relative to its tree root
    pub fn from_relative(rel: &Path) -> Self {
        let mut components = rel.components().filter_map(|c| c.as_os_str().to_str());
        let first = components.next();
        let second = components.next();
        let rest: Vec<&str> = components.collect();

        match (first, second) {
            (Some("AndroidManifest.xml"), None) => FileKind::Manifest,
            (Some("apktool.yml"), None) => FileKind::ApktoolConfig,
            (Some("res"), Some(dir)) => {
                let file_name = rest.last().copied().or(Some(dir));
                let is_xml = file_name
                    .map(|f| f.to_lowercase().ends_with(".xml"))
                    .unwrap_or(false);
                if dir.starts_with("values") && is_xml {
                    if file_name == Some("public.xml") {
                        FileKind::PublicTable
                    } else {
                        FileKind::ValuesResource
                    }
                } else if is_xml {
                    FileKind::ResourceXml
                } else {
                    FileKind::ResourceOther
                }
            }
            _ => FileKind::Other,
        }
    }

    /// Resource documents the rewriter and normalizers scan
    pub fn is_resource_xml(&self) -> bool {
        matches!(
            self,
            FileKind::PublicTable | FileKind::ValuesResource | FileKind::ResourceXml
        )
    }

    /// Definition-carrying documents deduplicated by identifier, not path
    pub fn is_values(&self) -> bool {
        matches!(self, FileKind::PublicTable | FileKind::ValuesResource)
    }
}

/// Check a tree for ProGuard/AndResGuard traces.
///
/// Obfuscated packages often fail the decompile/recompile round trip, so
/// the result is surfaced as a warning on the run summary.
pub fn detect_obfuscation(root: &Path) -> bool {
    let meta_inf = root.join("original").join("META-INF");
    if meta_inf.join("proguard").exists() {
        return true;
    }
    let manifest_mf = meta_inf.join("MANIFEST.MF");
    if let Ok(contents) = std::fs::read_to_string(&manifest_mf) {
        if contents.to_lowercase().contains("proguard") {
            return true;
        }
    }
    false
}
