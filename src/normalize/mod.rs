//! Pre-rebuild normalization passes
//!
//! After the merge the tree is self-consistent but still declares itself a
//! split bundle, may carry text corruption from concatenated resource
//! values, and keeps split-private resources that are now referenced
//! across former split boundaries. These passes repair all three before
//! the external rebuild. Every pass is idempotent.

mod ampersand;
mod manifest;
mod styles;
mod visibility;

pub use ampersand::AmpersandRepairer;
pub use manifest::{ManifestNormalizer, ManifestStats};
pub use styles::StyleDeduper;
pub use visibility::{VisibilityNormalizer, VisibilityStats};

use std::path::PathBuf;
use thiserror::Error;

/// Normalization errors, fatal to the run
#[derive(Error, Debug)]
pub enum NormalizeError {
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
    #[error("Malformed resource document {0}: missing <resources> element")]
    MalformedValues(PathBuf),
    #[error(transparent)]
    Table(#[from] crate::catalog::CatalogError),
}
