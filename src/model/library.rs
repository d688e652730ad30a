//! Model Library
//!
//! The closed universe of candidate type descriptions a scan runs over.

use include_dir::Dir;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::{builtins, load_from_directory, load_from_embedded, Capability, LoadConfig, TypeDef, TypeId};
use crate::error::{ConfigurationError, Result};

/// All type descriptions known to a scan, keyed by [`TypeId`]
#[derive(Debug, Clone, Default)]
pub struct ModelLibrary {
    types: BTreeMap<TypeId, TypeDef>,
}

impl ModelLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a library holding only the built-in types
    pub fn with_builtins() -> Self {
        builtins::library()
    }

    /// Load descriptions from a directory, built-ins included
    pub fn from_directory(model_dir: &Path) -> Result<Self> {
        load_from_directory(model_dir, &LoadConfig::default())
    }

    /// Load descriptions from an embedded directory (compiled into binary via include_dir!)
    pub fn from_embedded(embedded_dir: &'static Dir<'static>) -> Result<Self> {
        load_from_embedded(embedded_dir, &LoadConfig::default())
    }

    /// Add one type description; a second description of the same id is rejected
    pub fn insert(&mut self, def: TypeDef) -> Result<()> {
        if self.types.contains_key(&def.id) {
            return Err(ConfigurationError::DuplicateTypeId { type_id: def.id });
        }
        self.types.insert(def.id.clone(), def);
        Ok(())
    }

    /// Builder form of [`ModelLibrary::insert`]
    pub fn with(mut self, def: TypeDef) -> Result<Self> {
        self.insert(def)?;
        Ok(self)
    }

    /// Move every description of `other` into this library
    pub fn merge(&mut self, other: ModelLibrary) -> Result<()> {
        for def in other.types.into_values() {
            self.insert(def)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TypeDef> {
        self.types.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.types.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    /// Whether `id` is an abstract type (interface or abstract base)
    pub fn is_abstract(&self, id: &str) -> bool {
        self.types.get(id).map(|d| d.is_abstract).unwrap_or(false)
    }

    /// Ancestor chain of `id`, starting with `id` itself.
    ///
    /// Stops at the first parent missing from the library, and on parent cycles.
    pub fn ancestors(&self, id: &str) -> Vec<&TypeDef> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.types.get(id);

        while let Some(def) = current {
            if !seen.insert(def.id.as_str()) {
                break;
            }
            chain.push(def);
            current = def.parent.as_deref().and_then(|p| self.types.get(p));
        }

        chain
    }

    /// Whether `id` (or one of its ancestors) implements `capability`
    pub fn implements(&self, id: &str, capability: Capability) -> bool {
        self.ancestors(id)
            .into_iter()
            .flat_map(|def| def.capabilities.iter())
            .any(|c| c.implies(capability))
    }

    /// Capability check for a description that may not be in the library itself
    pub fn def_implements(&self, def: &TypeDef, capability: Capability) -> bool {
        def.capabilities.iter().any(|c| c.implies(capability))
            || def
                .parent
                .as_deref()
                .map(|parent| self.implements(parent, capability))
                .unwrap_or(false)
    }

    /// Ids of every non-abstract type carrying a `resource` tag
    pub fn resource_types(&self) -> Vec<&TypeId> {
        self.types
            .values()
            .filter(|d| d.resource.is_some() && !d.is_abstract)
            .map(|d| &d.id)
            .collect()
    }

    /// SHA256 over the canonical JSON form of every description
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for def in self.types.values() {
            let canonical = serde_json::to_vec(def).unwrap_or_default();
            hasher.update(&canonical);
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelLibrary {
        ModelLibrary::new()
            .with(TypeDef::new("base.Resource").abstract_type().with_capability(Capability::Resource))
            .unwrap()
            .with(TypeDef::new("res.Patient").extends("base.Resource").resource("Patient", Some(0)))
            .unwrap()
            .with(TypeDef::new("res.Orphan").extends("missing.Base"))
            .unwrap()
    }

    #[test]
    fn test_inherited_capabilities() {
        let library = sample();
        assert!(library.implements("res.Patient", Capability::Resource));
        assert!(library.implements("res.Patient", Capability::CompositeElement));
        assert!(!library.implements("res.Patient", Capability::Datatype));
        assert!(!library.implements("res.Orphan", Capability::Element));
        assert!(!library.implements("no.such.Type", Capability::Element));
    }

    #[test]
    fn test_ancestors_stop_at_unknown_parent() {
        let library = sample();
        let chain: Vec<_> = library.ancestors("res.Patient").into_iter().map(|d| d.id.as_str()).collect();
        assert_eq!(chain, vec!["res.Patient", "base.Resource"]);

        let chain = library.ancestors("res.Orphan");
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let library = ModelLibrary::new()
            .with(TypeDef::new("a").extends("b"))
            .unwrap()
            .with(TypeDef::new("b").extends("a"))
            .unwrap();
        assert_eq!(library.ancestors("a").len(), 2);
    }

    #[test]
    fn test_duplicate_type_id_rejected() {
        let result = sample().with(TypeDef::new("res.Patient"));
        assert!(matches!(result, Err(ConfigurationError::DuplicateTypeId { .. })));
    }

    #[test]
    fn test_resource_types_skip_abstract() {
        let library = sample();
        assert_eq!(library.resource_types(), vec!["res.Patient"]);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(sample().fingerprint(), sample().fingerprint());
        assert_ne!(sample().fingerprint(), ModelLibrary::new().fingerprint());
    }
}
