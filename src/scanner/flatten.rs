//! Hierarchy Flattening
//!
//! Collects the children declared across a type's composite ancestors into one
//! ordered list. Base types are introspected first; element and extension
//! slots keep separate order keys and are merged at the end.

use std::collections::{BTreeMap, BTreeSet};

use super::introspect::scan_level;
use super::Discovery;
use crate::descriptor::ChildDescriptor;
use crate::error::{ConfigurationError, Result};
use crate::model::{Capability, ModelLibrary, TypeDef};

/// Child name placed at a resource's declared identifier order
const IDENTIFIER: &str = "identifier";

/// Children gathered so far for the type being flattened
#[derive(Debug, Default)]
pub(crate) struct ChildCollector {
    pub names: BTreeSet<String>,
    pub elements: BTreeMap<i32, ChildDescriptor>,
    pub extensions: BTreeMap<i32, ChildDescriptor>,
    pub narrative: Option<ChildDescriptor>,
}

impl ChildCollector {
    /// Place unknown-order children and merge into the final child list
    fn finish(self, type_id: &str, identifier_order: Option<u32>) -> Result<Vec<ChildDescriptor>> {
        let ChildCollector {
            elements,
            extensions,
            narrative,
            ..
        } = self;

        let mut elements = place_unordered(type_id, elements, identifier_order)?;
        let mut extensions = place_unordered(type_id, extensions, identifier_order)?;

        let keys: BTreeSet<i32> = elements.keys().chain(extensions.keys()).copied().collect();
        let mut children = Vec::with_capacity(elements.len() + extensions.len() + 1);
        children.extend(narrative);
        for key in keys {
            // Element before extension when both share a key
            children.extend(elements.remove(&key));
            children.extend(extensions.remove(&key));
        }
        Ok(children)
    }
}

/// Relocate every child stored under a synthetic negative key.
///
/// Only a child named `identifier` on a resource with a declared identifier
/// order can be placed; any other unordered child is an error.
fn place_unordered(
    type_id: &str,
    mut children: BTreeMap<i32, ChildDescriptor>,
    identifier_order: Option<u32>,
) -> Result<BTreeMap<i32, ChildDescriptor>> {
    while let Some(entry) = children.first_entry() {
        if *entry.key() >= 0 {
            break;
        }
        let mut child = entry.remove();
        let name = child.name().to_string();

        let target = match identifier_order {
            Some(order) if name == IDENTIFIER => {
                i32::try_from(order).map_err(|_| ConfigurationError::InvalidOrder {
                    type_id: type_id.to_string(),
                    name: name.clone(),
                    order: i32::MAX,
                })?
            }
            _ => {
                return Err(ConfigurationError::UnplaceableField {
                    type_id: type_id.to_string(),
                    name,
                })
            }
        };

        if children.contains_key(&target) {
            return Err(ConfigurationError::DuplicateFieldOrder {
                type_id: type_id.to_string(),
                name,
                order: target,
            });
        }
        if let Some(slot) = child.slot_mut() {
            slot.order = target;
        }
        children.insert(target, child);
    }
    Ok(children)
}

/// Levels contributing children to `def`, base-most first
fn hierarchy<'a>(library: &'a ModelLibrary, def: &'a TypeDef) -> Vec<&'a TypeDef> {
    let mut levels = vec![def];
    let mut current = def;

    while let Some(parent_id) = current.parent.as_deref() {
        let Some(parent) = library.get(parent_id) else {
            break;
        };
        if !library.implements(parent_id, Capability::CompositeElement)
            || levels.iter().any(|level| level.id == parent.id)
        {
            break;
        }
        levels.push(parent);
        current = parent;
    }

    levels.reverse();
    levels
}

/// Build the ordered child list of `def`
pub(crate) fn flatten_children(
    library: &ModelLibrary,
    def: &TypeDef,
    identifier_order: Option<u32>,
    discovery: &mut Discovery<'_>,
) -> Result<Vec<ChildDescriptor>> {
    let mut collector = ChildCollector::default();
    for level in hierarchy(library, def) {
        scan_level(library, level, &mut collector, discovery)?;
    }
    collector.finish(&def.id, identifier_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ChildSlot, DatatypeKind, PlainChild, TypeLink};

    fn plain(name: &str, order: i32) -> ChildDescriptor {
        ChildDescriptor::Plain(PlainChild {
            slot: ChildSlot {
                name: name.to_string(),
                field: name.to_string(),
                min: 0,
                max: Some(1),
                order,
            },
            value: TypeLink::new("dt.String"),
            datatype: DatatypeKind::Primitive,
            code_table: None,
        })
    }

    #[test]
    fn test_identifier_relocated() {
        let mut collector = ChildCollector::default();
        collector.elements.insert(0, plain("name", 0));
        collector.elements.insert(-1, plain("identifier", -1));

        let children = collector.finish("res.Patient", Some(2)).unwrap();
        let placed: Vec<_> = children.iter().map(|c| (c.name(), c.order())).collect();
        assert_eq!(placed, vec![("name", Some(0)), ("identifier", Some(2))]);
    }

    #[test]
    fn test_unordered_field_without_identifier_order() {
        let mut collector = ChildCollector::default();
        collector.elements.insert(-1, plain("identifier", -1));

        let err = collector.finish("dt.Period", None).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnplaceableField { .. }));
    }

    #[test]
    fn test_relocation_collision() {
        let mut collector = ChildCollector::default();
        collector.elements.insert(0, plain("name", 0));
        collector.elements.insert(-1, plain("identifier", -1));

        let err = collector.finish("res.Patient", Some(0)).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateFieldOrder { order: 0, .. }));
    }

    #[test]
    fn test_element_precedes_extension_at_same_order() {
        let mut collector = ChildCollector::default();
        collector.elements.insert(1, plain("gender", 1));
        collector.extensions.insert(0, plain("ext", 0));
        collector.extensions.insert(1, plain("ext2", 1));

        let children = collector.finish("res.Patient", None).unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["ext", "gender", "ext2"]);
    }
}
