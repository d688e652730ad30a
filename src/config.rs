//! Configuration management for the model scanner
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (metamodel.toml)
//! - Environment variables (METAMODEL__*)
//!
//! ## Example config file (metamodel.toml):
//! ```toml
//! [library]
//! paths = ["./model"]
//! include_builtins = true
//! skip_prefixes = ["drafts/"]
//!
//! [scan]
//! roots = ["model.resource.Patient"]
//! scan_all_resources = false
//!
//! [export]
//! output_format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::{LoadConfig, TypeId};

/// Main configuration for the model scanner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Where type descriptions come from
    #[serde(default)]
    pub library: LibraryConfig,

    /// What to scan
    #[serde(default)]
    pub scan: ScanConfig,

    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,
}

/// Library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directories holding type description files
    #[serde(default = "default_paths")]
    pub paths: Vec<PathBuf>,

    /// Merge the built-in types into the library
    #[serde(default = "default_true")]
    pub include_builtins: bool,

    /// Skip files matching these path prefixes
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,

    /// Only load files matching these path prefixes
    #[serde(default)]
    pub include_prefixes: Vec<String>,
}

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Root type ids
    #[serde(default)]
    pub roots: Vec<TypeId>,

    /// Use every concrete resource type as a root
    #[serde(default = "default_true")]
    pub scan_all_resources: bool,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output format (pretty or compact)
    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

// Default value functions
fn default_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("model")]
}

fn default_true() -> bool {
    true
}

fn default_skip_prefixes() -> Vec<String> {
    LoadConfig::default().skip_prefixes
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            include_builtins: true,
            skip_prefixes: default_skip_prefixes(),
            include_prefixes: Vec::new(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            scan_all_resources: true,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Pretty,
        }
    }
}

impl ScannerConfig {
    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["metamodel.toml", ".metamodel.toml", "config/metamodel.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "fhir", "metamodel") {
            let xdg_config = config_dir.config_dir().join("metamodel.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (METAMODEL__*)
        builder = builder.add_source(
            Environment::with_prefix("METAMODEL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> std::io::Result<String> {
        toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_toml()?)
    }

    /// Loader settings derived from the `[library]` section
    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            include_builtins: self.library.include_builtins,
            skip_prefixes: self.library.skip_prefixes.clone(),
            include_prefixes: self.library.include_prefixes.clone(),
        }
    }

    /// Library paths, with relative paths resolved against the working directory
    pub fn library_paths(&self) -> Vec<PathBuf> {
        self.library
            .paths
            .iter()
            .map(|p| {
                if p.is_absolute() {
                    p.clone()
                } else {
                    std::env::current_dir().unwrap_or_default().join(p)
                }
            })
            .collect()
    }

    pub fn pretty_output(&self) -> bool {
        self.export.output_format == OutputFormat::Pretty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();
        assert!(config.library.include_builtins);
        assert!(config.scan.scan_all_resources);
        assert!(config.pretty_output());
        assert_eq!(config.load_config().skip_prefixes, LoadConfig::default().skip_prefixes);
    }

    #[test]
    fn test_serialize_config() {
        let config = ScannerConfig::default();
        let toml_str = config.to_toml().unwrap();
        assert!(toml_str.contains("[library]"));
        assert!(toml_str.contains("[scan]"));
        assert!(toml_str.contains("[export]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[scan]\nroots = [\"model.resource.Patient\"]\nscan_all_resources = false\n\n[export]\noutput_format = \"compact\"\n",
        )
        .unwrap();

        let config = ScannerConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.scan.roots, vec!["model.resource.Patient".to_string()]);
        assert!(!config.scan.scan_all_resources);
        assert!(!config.pretty_output());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = ScannerConfig::default();
        config.library.include_prefixes = vec!["core/".to_string()];
        config.scan.roots = vec!["model.resource.Patient".to_string()];
        config.scan.scan_all_resources = false;
        config.save(&path).unwrap();

        let loaded = ScannerConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.library.include_prefixes, vec!["core/".to_string()]);
        assert_eq!(loaded.scan.roots, config.scan.roots);
        assert!(!loaded.scan.scan_all_resources);
        assert!(loaded.pretty_output());
    }
}
