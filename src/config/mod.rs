mod loader;

pub use loader::{Config, MergeConfig, NormalizeConfig, ReportConfig};
