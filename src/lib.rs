//! apkmerge - Merge decompiled split APKs into a single rebuildable package
//!
//! App bundles ship as a base APK plus configuration splits, each compiled
//! separately. Folding their decompiled trees back into one package leaves
//! placeholder resource names behind wherever the decompiler could not
//! recover a symbol from a split alone. This library reconciles the trees
//! into a self-consistent whole.
//!
//! # Pipeline
//!
//! 1. **Discovery** - Classify the input trees into base and splits
//! 2. **Catalog** - Cross-reference identifier tables, recover true names
//! 3. **Merge** - Fold split trees into the base tree
//! 4. **Rewrite** - Replace placeholder names, drop duplicate definitions
//! 5. **Normalize** - De-split the manifest, repair ampersands, dedup
//!    style items, force resources public
//! 6. **Report** - Surface the run's counts to the caller

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod merge;
pub mod normalize;
pub mod report;
pub mod rewrite;

pub use catalog::{IdentifierCatalog, PlaceholderPattern, ResourceId, TrueNameMap};
pub use config::Config;
pub use discovery::{SplitRole, SplitSet, SplitTree};
pub use engine::{CancelToken, ReconcileError, ReconcileSummary, Reconciler};
pub use merge::TreeMerger;
pub use report::{ReportFormat, Reporter};
pub use rewrite::ReferenceRewriter;
