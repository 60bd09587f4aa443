use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a split-APK merge run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix of synthetic resource names assigned by the decompiler.
    ///
    /// Overridable for apps whose real resource names happen to collide
    /// with the default pattern.
    pub placeholder_prefix: String,

    /// Merge configuration
    pub merge: MergeConfig,

    /// Normalization configuration
    pub normalize: NormalizeConfig,

    /// Report configuration
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Directory names at a split's root that are never merged
    pub skip_dirs: Vec<String>,

    /// File names at a split's root that are never merged
    pub skip_root_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Strip split declarations from the base AndroidManifest.xml
    pub disable_splitting: bool,

    /// Rewrite bare ampersands in resource documents to valid entities
    pub fix_ampersands: bool,

    /// Remove duplicate <item> entries inside <style> elements
    pub dedup_style_items: bool,

    /// Force all resource entries public before rebuild
    pub publicize_resources: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Output format: terminal, json
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            placeholder_prefix: "APKTOOL_DUMMY_".to_string(),
            merge: MergeConfig::default(),
            normalize: NormalizeConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            skip_dirs: vec!["original".to_string()],
            skip_root_files: vec![
                "AndroidManifest.xml".to_string(),
                "apktool.yml".to_string(),
            ],
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            disable_splitting: true,
            fix_ampersands: true,
            dedup_style_items: true,
            publicize_resources: true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: "terminal".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                // Try YAML first, then TOML
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try to load configuration from default locations
    pub fn from_default_locations(working_dir: &Path) -> Result<Self> {
        let default_names = [
            ".apkmerge.yml",
            ".apkmerge.yaml",
            ".apkmerge.toml",
            "apkmerge.yml",
            "apkmerge.yaml",
            "apkmerge.toml",
        ];

        for name in &default_names {
            let path = working_dir.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // No config file found, use defaults
        Ok(Self::default())
    }
}
