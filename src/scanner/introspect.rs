//! Field Introspection
//!
//! Turns the declared fields of one hierarchy level into child descriptors.
//! Referenced structured types are handed to the discovery set, never scanned
//! from here.

use tracing::debug;

use super::flatten::ChildCollector;
use super::Discovery;
use crate::descriptor::{
    BlockChild, ChildDescriptor, ChildSlot, ChoiceChild, DatatypeKind, ExtensionChild, NarrativeChild,
    PlainChild, ReferenceChild, TypeLink,
};
use crate::error::{ConfigurationError, Result};
use crate::model::{
    Capability, ChildTag, Container, FieldDef, ModelLibrary, NarrativeTag, TypeDef, MAX_UNLIMITED,
    ORDER_UNKNOWN,
};

/// Introspect every field declared on `level`
pub(crate) fn scan_level(
    library: &ModelLibrary,
    level: &TypeDef,
    collector: &mut ChildCollector,
    discovery: &mut Discovery<'_>,
) -> Result<()> {
    for field in &level.fields {
        if let Some(tag) = &field.narrative {
            scan_narrative(level, field, tag, collector, discovery)?;
            continue;
        }

        let Some(child) = &field.child else {
            debug!("Ignoring non-schema field '{}' on type {}", field.field, level.id);
            continue;
        };

        scan_child(library, level, field, child, collector, discovery)?;
    }
    Ok(())
}

fn scan_narrative(
    level: &TypeDef,
    field: &FieldDef,
    tag: &NarrativeTag,
    collector: &mut ChildCollector,
    discovery: &mut Discovery<'_>,
) -> Result<()> {
    if tag.name.trim().is_empty() {
        return Err(ConfigurationError::MissingFieldName {
            type_id: level.id.clone(),
            field: field.field.clone(),
            tag: "narrative",
        });
    }
    if collector.narrative.is_some() {
        return Err(ConfigurationError::DuplicateNarrative {
            type_id: level.id.clone(),
        });
    }

    discovery.queue(&field.value_type);
    collector.narrative = Some(ChildDescriptor::Narrative(NarrativeChild {
        name: tag.name.clone(),
        field: field.field.clone(),
        narrative: TypeLink::new(field.value_type.as_str()),
    }));
    Ok(())
}

/// Element type of a field, unwrapping the one supported container
fn element_type<'f>(level: &TypeDef, field: &'f FieldDef) -> Result<&'f str> {
    match field.container {
        None | Some(Container::List) => Ok(field.value_type.as_str()),
        Some(other) => Err(ConfigurationError::UnsupportedContainer {
            type_id: level.id.clone(),
            field: field.field.clone(),
            container: other.label(),
        }),
    }
}

/// Upper bound of a child, `None` when unbounded
fn cardinality_max(level: &TypeDef, name: &str, child: &ChildTag) -> Result<Option<u32>> {
    if child.max == MAX_UNLIMITED {
        return Ok(None);
    }
    match u32::try_from(child.max) {
        Ok(max) if child.min <= max => Ok(Some(max)),
        _ => Err(ConfigurationError::InvalidCardinality {
            type_id: level.id.clone(),
            name: name.to_string(),
            min: child.min,
            max: child.max,
        }),
    }
}

fn scan_child(
    library: &ModelLibrary,
    level: &TypeDef,
    field: &FieldDef,
    child: &ChildTag,
    collector: &mut ChildCollector,
    discovery: &mut Discovery<'_>,
) -> Result<()> {
    let name = child.name.as_str();
    if name.trim().is_empty() {
        return Err(ConfigurationError::MissingFieldName {
            type_id: level.id.clone(),
            field: field.field.clone(),
            tag: "child",
        });
    }

    let element_type = element_type(level, field)?;

    if child.order < ORDER_UNKNOWN {
        return Err(ConfigurationError::InvalidOrder {
            type_id: level.id.clone(),
            name: name.to_string(),
            order: child.order,
        });
    }

    let order_map = if field.extension.is_some() {
        &mut collector.extensions
    } else {
        &mut collector.elements
    };

    // Unknown orders get unique keys below zero so they can be placed later
    let mut order = child.order;
    if order == ORDER_UNKNOWN {
        while order_map.contains_key(&order) {
            order -= 1;
        }
    }

    if order_map.contains_key(&order) {
        return Err(ConfigurationError::DuplicateFieldOrder {
            type_id: level.id.clone(),
            name: name.to_string(),
            order,
        });
    }
    if collector.names.contains(name) {
        return Err(ConfigurationError::DuplicateFieldName {
            type_id: level.id.clone(),
            name: name.to_string(),
        });
    }

    let slot = ChildSlot {
        name: name.to_string(),
        field: field.field.clone(),
        min: child.min,
        max: cardinality_max(level, name, child)?,
        order,
    };

    let descriptor = build_child(library, level, field, child, slot, element_type, discovery)?;
    order_map.insert(order, descriptor);
    collector.names.insert(name.to_string());
    Ok(())
}

fn build_child(
    library: &ModelLibrary,
    level: &TypeDef,
    field: &FieldDef,
    child: &ChildTag,
    slot: ChildSlot,
    element_type: &str,
    discovery: &mut Discovery<'_>,
) -> Result<ChildDescriptor> {
    if !child.choice.is_empty() {
        for candidate in &child.choice {
            discovery.queue(candidate);
        }
        return Ok(ChildDescriptor::Choice(ChoiceChild {
            slot,
            candidates: child.choice.iter().map(|t| TypeLink::new(t.as_str())).collect(),
            child_names: Default::default(),
        }));
    }

    if let Some(extension) = &field.extension {
        if library.implements(element_type, Capability::Element) {
            discovery.queue(element_type);
        }
        return Ok(ChildDescriptor::Extension(ExtensionChild {
            slot,
            url: extension.url.clone(),
            value: TypeLink::new(element_type),
        }));
    }

    if library.implements(element_type, Capability::ResourceReference) {
        let permitted = field
            .child_resource
            .as_ref()
            .map(|r| r.types.as_slice())
            .unwrap_or_default();
        if permitted.is_empty() {
            return Err(ConfigurationError::MissingReferenceTypes {
                type_id: level.id.clone(),
                name: slot.name,
            });
        }
        for target in permitted {
            discovery.queue(target);
        }
        return Ok(ChildDescriptor::ResourceReference(ReferenceChild {
            slot,
            permitted: permitted.iter().map(|t| TypeLink::new(t.as_str())).collect(),
        }));
    }

    if library.implements(element_type, Capability::ResourceBlock) {
        discovery.queue(element_type);
        return Ok(ChildDescriptor::NestedBlock(BlockChild {
            slot,
            block: TypeLink::new(element_type),
        }));
    }

    if library.implements(element_type, Capability::Datatype) {
        discovery.queue(element_type);

        let datatype = if library.implements(element_type, Capability::PrimitiveDatatype) {
            DatatypeKind::Primitive
        } else {
            DatatypeKind::Composite
        };

        let code_table = match &field.coded_value {
            Some(coded) => {
                if !library.implements(element_type, Capability::CodedDatatype) {
                    return Err(ConfigurationError::NotCodedDatatype {
                        type_id: level.id.clone(),
                        name: slot.name,
                        value_type: element_type.to_string(),
                    });
                }
                discovery.record_code_table(&coded.code_table);
                Some(coded.code_table.clone())
            }
            None => None,
        };

        return Ok(ChildDescriptor::Plain(PlainChild {
            slot,
            value: TypeLink::new(element_type),
            datatype,
            code_table,
        }));
    }

    Err(ConfigurationError::InvalidChildType {
        type_id: level.id.clone(),
        name: slot.name,
        value_type: element_type.to_string(),
    })
}
