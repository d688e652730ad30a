//! Model Scanner
//!
//! Builds a [`ModelRegistry`] from a [`ModelLibrary`] and a set of root types.
//!
//! Scanning runs in discovery rounds. Each round classifies and scans every
//! pending type, registering its descriptor before its children are
//! introspected. Structured types referenced by those children are only
//! recorded as discovered and become the next round's work, so cyclic type
//! graphs never cause recursion. When a round discovers nothing new, the
//! collected descriptors are sealed into the registry.

pub mod classify;
mod flatten;
mod introspect;

pub use classify::{classify, TypeCategory};

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use crate::descriptor::{DescriptorKind, DescriptorRef, TypeDescriptor};
use crate::error::{ConfigurationError, Result};
use crate::model::{builtins, Capability, ModelLibrary, NamedTag, ResourceTag, TypeDef, TypeId};
use crate::registry::{ModelRegistry, ScanOutput};
use flatten::flatten_children;

/// Types referenced during a round, waiting to be scanned
pub(crate) struct Discovery<'lib> {
    library: &'lib ModelLibrary,
    discovered: BTreeSet<TypeId>,
    code_tables: BTreeSet<TypeId>,
}

impl<'lib> Discovery<'lib> {
    fn new(library: &'lib ModelLibrary) -> Self {
        Self {
            library,
            discovered: BTreeSet::new(),
            code_tables: BTreeSet::new(),
        }
    }

    /// Queue a referenced type for a later round. Abstract types are skipped.
    pub(crate) fn queue(&mut self, type_id: &str) {
        if self.library.is_abstract(type_id) {
            return;
        }
        if !self.discovered.contains(type_id) {
            self.discovered.insert(type_id.to_string());
        }
    }

    /// Remember a code table associated with a coded value
    pub(crate) fn record_code_table(&mut self, type_id: &str) {
        self.code_tables.insert(type_id.to_string());
    }

    fn take(&mut self) -> BTreeSet<TypeId> {
        std::mem::take(&mut self.discovered)
    }
}

/// Single-use builder holding the working registry of one scan
pub struct ModelScanner<'lib> {
    library: &'lib ModelLibrary,
    descriptors: Vec<TypeDescriptor>,
    by_type: BTreeMap<TypeId, DescriptorRef>,
    by_resource_name: BTreeMap<String, DescriptorRef>,
    discovery: Discovery<'lib>,
}

impl<'lib> ModelScanner<'lib> {
    fn new(library: &'lib ModelLibrary) -> Self {
        Self {
            library,
            descriptors: Vec::new(),
            by_type: BTreeMap::new(),
            by_resource_name: BTreeMap::new(),
            discovery: Discovery::new(library),
        }
    }

    /// Scan `roots` plus the always-included built-ins and seal the result.
    ///
    /// Any configuration error aborts the whole scan; no partial registry is
    /// ever returned.
    pub fn scan<I, S>(library: &'lib ModelLibrary, roots: I) -> Result<ModelRegistry>
    where
        I: IntoIterator<Item = S>,
        S: Into<TypeId>,
    {
        let mut to_scan: BTreeSet<TypeId> = roots.into_iter().map(Into::into).collect();
        to_scan.extend(builtins::ALWAYS_SCANNED.iter().map(|id| id.to_string()));

        let mut scanner = Self::new(library);
        scanner.run(to_scan)?;
        Ok(scanner.seal())
    }

    /// Scan every non-abstract type carrying a `resource` tag
    pub fn scan_all(library: &'lib ModelLibrary) -> Result<ModelRegistry> {
        Self::scan(library, library.resource_types().into_iter().cloned())
    }

    fn run(&mut self, mut to_scan: BTreeSet<TypeId>) -> Result<()> {
        let mut round = 0usize;
        while !to_scan.is_empty() {
            round += 1;
            trace!("Discovery round {}: {} type(s) to scan", round, to_scan.len());

            for type_id in &to_scan {
                self.classify_and_scan(type_id)?;
            }

            let mut discovered = self.discovery.take();
            discovered.retain(|id| !self.by_type.contains_key(id));
            to_scan = discovered;
        }
        Ok(())
    }

    fn classify_and_scan(&mut self, type_id: &str) -> Result<()> {
        if self.by_type.contains_key(type_id) {
            return Ok(());
        }

        let library = self.library;
        let def = library.get(type_id).ok_or_else(|| ConfigurationError::UnknownType {
            type_id: type_id.to_string(),
        })?;

        match classify(library, def)? {
            TypeCategory::Resource(tag) => self.scan_resource(def, tag),
            TypeCategory::CompositeDatatype(tag) => {
                self.scan_structure(def, tag, DescriptorKind::CompositeDatatype)
            }
            TypeCategory::PrimitiveDatatype(tag) => {
                self.scan_primitive(def, tag);
                Ok(())
            }
            TypeCategory::Block(tag) => self.scan_structure(def, tag, DescriptorKind::Block),
            TypeCategory::CodeTable(_) => {
                debug!("Code table {} recorded without resolution", def.id);
                self.discovery.record_code_table(&def.id);
                Ok(())
            }
        }
    }

    fn register(&mut self, descriptor: TypeDescriptor) -> DescriptorRef {
        let handle = DescriptorRef::new(self.descriptors.len());
        self.by_type.insert(descriptor.type_id.clone(), handle);
        self.descriptors.push(descriptor);
        handle
    }

    fn scan_children(&mut self, handle: DescriptorRef, def: &TypeDef, identifier_order: Option<u32>) -> Result<()> {
        let children = flatten_children(self.library, def, identifier_order, &mut self.discovery)?;
        self.descriptors[handle.index()].set_children(children);
        Ok(())
    }

    fn scan_resource(&mut self, def: &TypeDef, tag: &ResourceTag) -> Result<()> {
        debug!("Scanning resource type: {}", def.id);

        // Registered types never get here, so any hit is a different type
        if let Some(&existing) = self.by_resource_name.get(&tag.name) {
            return Err(ConfigurationError::DuplicateResourceName {
                name: tag.name.clone(),
                existing: self.descriptors[existing.index()].type_id.clone(),
                duplicate: def.id.clone(),
            });
        }

        let kind = DescriptorKind::Resource {
            identifier_order: tag.identifier_order,
        };
        let handle = self.register(TypeDescriptor::new(def.id.as_str(), tag.name.as_str(), kind));
        self.by_resource_name.insert(tag.name.clone(), handle);

        self.scan_children(handle, def, tag.identifier_order)
    }

    fn scan_structure(&mut self, def: &TypeDef, tag: &NamedTag, kind: DescriptorKind) -> Result<()> {
        debug!("Scanning {} type: {}", kind.label(), def.id);

        let handle = self.register(TypeDescriptor::new(def.id.as_str(), tag.name.as_str(), kind));
        self.scan_children(handle, def, None)
    }

    fn scan_primitive(&mut self, def: &TypeDef, tag: &NamedTag) {
        debug!("Scanning primitive type: {}", def.id);

        let markup = self.library.def_implements(def, Capability::NarrativeMarkup);
        self.register(TypeDescriptor::new(
            def.id.as_str(),
            tag.name.as_str(),
            DescriptorKind::PrimitiveDatatype { markup },
        ));
    }

    fn seal(self) -> ModelRegistry {
        ModelRegistry::seal(ScanOutput {
            descriptors: self.descriptors,
            by_type: self.by_type,
            by_resource_name: self.by_resource_name,
            code_tables: self.discovery.code_tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ChildDescriptor;
    use crate::model::{builtins::BASE_COMPOSITE, builtins::STRING_TYPE, FieldDef};

    fn library_with(defs: Vec<TypeDef>) -> ModelLibrary {
        let mut library = ModelLibrary::with_builtins();
        for def in defs {
            library.insert(def).unwrap();
        }
        library
    }

    #[test]
    fn test_builtins_always_scanned() {
        let library = ModelLibrary::with_builtins();
        let registry = ModelScanner::scan(&library, Vec::<TypeId>::new()).unwrap();

        assert!(registry.get(builtins::DATE_TYPE).is_some());
        assert!(registry.get(builtins::CODE_TYPE).is_some());
        // Narrative pulls in its markup primitive
        let xhtml = registry.get(builtins::XHTML_TYPE).unwrap();
        assert_eq!(xhtml.kind, DescriptorKind::PrimitiveDatatype { markup: true });
    }

    #[test]
    fn test_unknown_root() {
        let library = ModelLibrary::with_builtins();
        let err = ModelScanner::scan(&library, ["no.such.Type"]).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownType { .. }));
    }

    #[test]
    fn test_abstract_reference_not_queued() {
        let library = library_with(vec![TypeDef::new("dt.Holder")
            .extends(BASE_COMPOSITE)
            .datatype("Holder")
            .with_field(FieldDef::child("anything", BASE_COMPOSITE, 0))]);

        let registry = ModelScanner::scan(&library, ["dt.Holder"]).unwrap();
        assert!(registry.get(BASE_COMPOSITE).is_none());

        let holder = registry.get("dt.Holder").unwrap();
        let ChildDescriptor::Plain(child) = &holder.children()[0] else {
            panic!("Expected plain child");
        };
        assert_eq!(child.value.descriptor, None);
    }

    #[test]
    fn test_code_table_recorded_not_described() {
        let library = library_with(vec![
            TypeDef::new("codes.Gender").with_capability(Capability::CodeEnum).code_table("Gender"),
            TypeDef::new("dt.Holder")
                .extends(BASE_COMPOSITE)
                .datatype("Holder")
                .with_field(FieldDef::child("gender", builtins::CODE_TYPE, 0).coded_by("codes.Gender"))
                .with_field(FieldDef::child("label", STRING_TYPE, 1)),
        ]);

        let registry = ModelScanner::scan(&library, ["dt.Holder", "codes.Gender"]).unwrap();
        assert!(registry.get("codes.Gender").is_none());
        assert!(registry.referenced_code_tables().contains("codes.Gender"));
    }

    #[test]
    fn test_resource_reached_twice_registered_once() {
        let library = library_with(vec![
            TypeDef::new("res.Target").extends(builtins::BASE_RESOURCE).resource("Target", None),
            TypeDef::new("res.Source")
                .extends(builtins::BASE_RESOURCE)
                .resource("Source", None)
                .with_field(FieldDef::child("target", builtins::RESOURCE_REFERENCE_TYPE, 0).referencing(["res.Target"]))
                .with_field(FieldDef::child("self", builtins::RESOURCE_REFERENCE_TYPE, 1).referencing(["res.Source"])),
        ]);

        let registry = ModelScanner::scan(&library, ["res.Source", "res.Target"]).unwrap();
        let names: Vec<&str> = registry.resource_names().collect();
        assert_eq!(names, vec!["Source", "Target"]);
        assert_eq!(registry.resources().count(), 2);
    }
}
