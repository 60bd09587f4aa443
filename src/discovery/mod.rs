mod split_finder;

pub use split_finder::{
    detect_obfuscation, DiscoveryError, FileKind, SplitRole, SplitSet, SplitTree,
};
