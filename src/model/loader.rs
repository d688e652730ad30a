//! Model Loading
//!
//! Loads type descriptions from a filesystem directory or an embedded
//! directory. Each `*.json` file holds either one description or an array of
//! them.

use include_dir::Dir;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use super::{builtins, ModelLibrary, TypeDef};
use crate::error::{ConfigurationError, Result};

/// Configuration for model loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Merge the built-in types into the loaded library
    pub include_builtins: bool,
    /// Skip files matching these path prefixes
    pub skip_prefixes: Vec<String>,
    /// Only load files matching these path prefixes
    pub include_prefixes: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            include_builtins: true,
            skip_prefixes: vec![
                "target/".to_string(),
                ".git/".to_string(),
                "node_modules/".to_string(),
            ],
            include_prefixes: Vec::new(),
        }
    }
}

impl LoadConfig {
    fn accepts(&self, relative: &str) -> bool {
        if !self.include_prefixes.is_empty()
            && !self.include_prefixes.iter().any(|p| relative.starts_with(p))
        {
            return false;
        }
        !self.skip_prefixes.iter().any(|p| relative.starts_with(p))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptionFile {
    Many(Vec<TypeDef>),
    One(Box<TypeDef>),
}

impl DescriptionFile {
    fn into_defs(self) -> Vec<TypeDef> {
        match self {
            DescriptionFile::Many(defs) => defs,
            DescriptionFile::One(def) => vec![*def],
        }
    }
}

fn starting_library(config: &LoadConfig) -> ModelLibrary {
    if config.include_builtins {
        builtins::library()
    } else {
        ModelLibrary::new()
    }
}

fn parse_into(library: &mut ModelLibrary, path: &Path, content: &str) -> Result<usize> {
    let file: DescriptionFile =
        serde_json::from_str(content).map_err(|source| ConfigurationError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let defs = file.into_defs();
    let count = defs.len();
    for def in defs {
        library.insert(def)?;
    }
    Ok(count)
}

/// Load type descriptions from a filesystem directory
pub fn load_from_directory(model_dir: &Path, config: &LoadConfig) -> Result<ModelLibrary> {
    let mut library = starting_library(config);

    // Sorted walk keeps duplicate-id errors deterministic
    for entry in WalkDir::new(model_dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }

        let relative = path.strip_prefix(model_dir).unwrap_or(path);
        if !config.accepts(&relative.to_string_lossy()) {
            continue;
        }

        let content = fs::read_to_string(path)?;
        let count = parse_into(&mut library, relative, &content)?;
        debug!("Loaded {} type description(s) from {}", count, relative.display());
    }

    Ok(library)
}

/// Load type descriptions from an embedded directory (compiled via include_dir!)
pub fn load_from_embedded(embedded_dir: &'static Dir<'static>, config: &LoadConfig) -> Result<ModelLibrary> {
    let mut library = starting_library(config);
    let mut files: Vec<(&Path, &str)> = Vec::new();
    collect_embedded_files(embedded_dir, &mut files);
    files.sort_by(|a, b| a.0.cmp(b.0));

    for (path, content) in files {
        if !config.accepts(&path.to_string_lossy()) {
            continue;
        }
        parse_into(&mut library, path, content)?;
    }

    Ok(library)
}

/// Recursively collect JSON files from embedded directory
pub(crate) fn collect_embedded_files<'a>(dir: &'a Dir<'static>, files: &mut Vec<(&'a Path, &'a str)>) {
    for file in dir.files() {
        let path = file.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Some(content) = file.contents_utf8() {
                files.push((path, content));
            }
        }
    }

    for subdir in dir.dirs() {
        collect_embedded_files(subdir, files);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_single_and_array_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("patient.json"),
            r#"{ "id": "res.Patient", "resource": { "name": "Patient" } }"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("datatypes")).unwrap();
        fs::write(
            dir.path().join("datatypes/strings.json"),
            r#"[
                { "id": "dt.A", "datatype": { "name": "a" } },
                { "id": "dt.B", "datatype": { "name": "b" } }
            ]"#,
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a model").unwrap();

        let config = LoadConfig { include_builtins: false, ..LoadConfig::default() };
        let library = load_from_directory(dir.path(), &config).unwrap();
        assert_eq!(library.len(), 3);
        assert!(library.contains("res.Patient"));
        assert!(library.contains("dt.B"));
    }

    #[test]
    fn test_builtins_merged_by_default() {
        let dir = tempdir().unwrap();
        let library = load_from_directory(dir.path(), &LoadConfig::default()).unwrap();
        assert!(library.contains(builtins::DATE_TYPE));
        assert!(library.contains(builtins::NARRATIVE_TYPE));
    }

    #[test]
    fn test_skip_prefixes() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("drafts")).unwrap();
        fs::write(dir.path().join("drafts/x.json"), r#"{ "id": "x" }"#).unwrap();

        let config = LoadConfig {
            include_builtins: false,
            skip_prefixes: vec!["drafts/".to_string()],
            include_prefixes: Vec::new(),
        };
        let library = load_from_directory(dir.path(), &config).unwrap();
        assert!(library.is_empty());
    }

    #[test]
    fn test_include_prefixes() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("core")).unwrap();
        fs::create_dir_all(dir.path().join("extra")).unwrap();
        fs::write(dir.path().join("core/a.json"), r#"{ "id": "core.A" }"#).unwrap();
        fs::write(dir.path().join("extra/b.json"), r#"{ "id": "extra.B" }"#).unwrap();
        fs::write(dir.path().join("top.json"), r#"{ "id": "top.C" }"#).unwrap();

        let config = LoadConfig {
            include_builtins: false,
            skip_prefixes: Vec::new(),
            include_prefixes: vec!["core/".to_string()],
        };
        let library = load_from_directory(dir.path(), &config).unwrap();
        assert_eq!(library.len(), 1);
        assert!(library.contains("core.A"));

        // Skips win over includes
        let config = LoadConfig {
            skip_prefixes: vec!["core/".to_string()],
            include_prefixes: vec!["core/".to_string(), "extra/".to_string()],
            ..config
        };
        let library = load_from_directory(dir.path(), &config).unwrap();
        assert_eq!(library.len(), 1);
        assert!(library.contains("extra.B"));
    }

    #[test]
    fn test_malformed_json_names_the_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ \"id\": ").unwrap();

        let err = load_from_directory(dir.path(), &LoadConfig::default()).unwrap_err();
        match err {
            ConfigurationError::Json { path, .. } => assert_eq!(path, Path::new("broken.json")),
            other => panic!("Expected Json error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_across_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{ "id": "x" }"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"{ "id": "x" }"#).unwrap();

        let config = LoadConfig { include_builtins: false, ..LoadConfig::default() };
        let err = load_from_directory(dir.path(), &config).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateTypeId { .. }));
    }
}
