//! Reconciliation engine
//!
//! Runs the full pipeline over a classified split set: identifier catalog,
//! tree merge, reference rewrite, manifest/style normalization, ampersand
//! repair and visibility normalization. The engine owns the base tree for
//! the duration of the run; an in-progress marker distinguishes a finished
//! tree from one abandoned mid-merge.

use crate::catalog::{CatalogError, IdentifierCatalog, PlaceholderPattern};
use crate::config::Config;
use crate::discovery::{detect_obfuscation, SplitSet};
use crate::merge::{MergeError, MergeStats, TreeMerger};
use crate::normalize::{
    AmpersandRepairer, ManifestNormalizer, NormalizeError, StyleDeduper, VisibilityNormalizer,
};
use crate::rewrite::{ReferenceRewriter, RewriteError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Marker file present while a tree is being mutated. A tree carrying it
/// must never be handed to the rebuild step.
pub const INCOMPLETE_MARKER: &str = ".apkmerge-incomplete";

/// Engine errors, all fatal
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("Failed to update marker {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Reconciliation cancelled, working tree left marked incomplete")]
    Cancelled,
}

/// Cooperative cancellation flag, checked between pipeline stages
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Structured result of one reconciliation run
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileSummary {
    pub splits_merged: usize,
    pub identifiers_resolved: usize,
    pub identifiers_unresolved: usize,
    pub identifier_conflicts: usize,
    /// Rendered conflict descriptions, one per discarded binding
    pub conflicts: Vec<String>,
    pub files_copied: usize,
    pub files_skipped: usize,
    pub values_documents_merged: usize,
    pub dirs_created: usize,
    pub definitions_renamed: usize,
    pub references_updated: usize,
    pub duplicates_dropped: usize,
    pub manifest_attributes_removed: usize,
    pub manifest_elements_removed: usize,
    pub style_items_dropped: usize,
    pub ampersand_fixes: usize,
    pub resources_publicized: usize,
    pub publicize_skipped: usize,
    pub obfuscation_detected: bool,
}

/// Runs the reconciliation pipeline over a split set
pub struct Reconciler<'a> {
    config: &'a Config,
    cancel: CancelToken,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(config: &'a Config, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Reconcile the split set into its base tree.
    ///
    /// On success the base tree is complete and the marker removed; on any
    /// error the marker stays behind and the tree must be re-extracted.
    pub fn reconcile(&self, set: &SplitSet) -> Result<ReconcileSummary, ReconcileError> {
        let mut summary = ReconcileSummary::default();
        let base_root = set.base.root.clone();

        summary.obfuscation_detected = set.iter().any(|tree| detect_obfuscation(&tree.root));
        if summary.obfuscation_detected {
            warn!("ProGuard/AndResGuard traces detected, rebuild may not succeed");
        }

        // Read-only pass over every identifier table
        let pattern = PlaceholderPattern::new(&self.config.placeholder_prefix);
        let catalog = IdentifierCatalog::new(pattern);
        let (names, catalog_report) = catalog.build(set)?;
        summary.identifiers_resolved = catalog_report.resolved;
        summary.identifiers_unresolved = catalog_report.unresolved;
        summary.identifier_conflicts = catalog_report.conflicts.len();
        summary.conflicts = catalog_report
            .conflicts
            .iter()
            .map(|c| format!("{}: kept {:?}, discarded {:?}", c.id, c.kept, c.discarded))
            .collect();
        self.check_cancel()?;

        let marker = InProgressMarker::create(&base_root)?;

        let merger = TreeMerger::new(&base_root, &self.config.merge);
        let mut merge_stats = MergeStats::default();
        for split in &set.splits {
            info!("Merging {} into base", split.name);
            merge_stats.absorb(merger.merge_split(split)?);
            summary.splits_merged += 1;
            self.check_cancel()?;
        }
        summary.files_copied = merge_stats.files_copied;
        summary.files_skipped = merge_stats.files_skipped;
        summary.values_documents_merged = merge_stats.values_merged;
        summary.dirs_created = merge_stats.dirs_created;

        let res_dir = set.base.resource_dir();

        // No splits and no placeholders means nothing to rewrite
        if summary.splits_merged > 0 || !names.is_empty() || !names.unresolved().is_empty() {
            let rewriter = ReferenceRewriter::new(&names, catalog.pattern());
            let rewrite_stats = rewriter.rewrite_tree(&res_dir)?;
            summary.definitions_renamed = rewrite_stats.definitions_renamed;
            summary.references_updated = rewrite_stats.references_updated;
            summary.duplicates_dropped = rewrite_stats.duplicates_dropped;
        }
        self.check_cancel()?;

        if self.config.normalize.disable_splitting && summary.splits_merged > 0 {
            let manifest_stats =
                ManifestNormalizer::new().normalize(&set.base.manifest_path())?;
            summary.manifest_attributes_removed = manifest_stats.attributes_removed;
            summary.manifest_elements_removed = manifest_stats.elements_removed;
        }

        if self.config.normalize.dedup_style_items && summary.splits_merged > 0 {
            let styles_path = res_dir.join("values").join("styles.xml");
            summary.style_items_dropped = StyleDeduper::new().dedup(&styles_path)?;
        }

        if self.config.normalize.fix_ampersands && summary.splits_merged > 0 {
            summary.ampersand_fixes = AmpersandRepairer::new().repair_tree(&res_dir)?;
        }
        self.check_cancel()?;

        if self.config.normalize.publicize_resources {
            let normalizer = VisibilityNormalizer::new(catalog.pattern());
            let visibility_stats = normalizer.publicize(&res_dir)?;
            summary.resources_publicized = visibility_stats.publicized;
            summary.publicize_skipped = visibility_stats.skipped;
        }

        marker.finish()?;
        debug!("Reconciliation finished: {:?}", summary);
        Ok(summary)
    }

    fn check_cancel(&self) -> Result<(), ReconcileError> {
        if self.cancel.is_cancelled() {
            Err(ReconcileError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Marks the base tree incomplete from first mutation until success.
///
/// Deliberately not removed on drop: a failed or cancelled run must leave
/// the marker behind.
struct InProgressMarker {
    path: PathBuf,
}

impl InProgressMarker {
    fn create(base_root: &Path) -> Result<Self, ReconcileError> {
        let path = base_root.join(INCOMPLETE_MARKER);
        std::fs::write(&path, "reconciliation in progress\n").map_err(|source| {
            ReconcileError::Marker {
                path: path.clone(),
                source,
            }
        })?;
        Ok(Self { path })
    }

    fn finish(self) -> Result<(), ReconcileError> {
        std::fs::remove_file(&self.path).map_err(|source| ReconcileError::Marker {
            path: self.path.clone(),
            source,
        })
    }
}
