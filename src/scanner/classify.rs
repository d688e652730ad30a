//! Type Classification
//!
//! Decides which single schema category a type description belongs to, from
//! its type-level tag and the capabilities it implements.

use crate::error::{ConfigurationError, Result};
use crate::model::{Capability, ModelLibrary, NamedTag, ResourceTag, TypeDef};

/// Category of a classified type, borrowing the tag that selected it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory<'a> {
    Resource(&'a ResourceTag),
    CompositeDatatype(&'a NamedTag),
    PrimitiveDatatype(&'a NamedTag),
    Block(&'a NamedTag),
    CodeTable(&'a NamedTag),
}

impl TypeCategory<'_> {
    /// Tag name used in diagnostics
    pub fn tag(&self) -> &'static str {
        match self {
            TypeCategory::Resource(_) => "resource",
            TypeCategory::CompositeDatatype(_) | TypeCategory::PrimitiveDatatype(_) => "datatype",
            TypeCategory::Block(_) => "block",
            TypeCategory::CodeTable(_) => "code_table",
        }
    }

    /// Name declared on the selecting tag
    pub fn name(&self) -> &str {
        match self {
            TypeCategory::Resource(tag) => &tag.name,
            TypeCategory::CompositeDatatype(tag)
            | TypeCategory::PrimitiveDatatype(tag)
            | TypeCategory::Block(tag)
            | TypeCategory::CodeTable(tag) => &tag.name,
        }
    }
}

fn present_tags(def: &TypeDef) -> Vec<&'static str> {
    let mut tags = Vec::new();
    if def.resource.is_some() {
        tags.push("resource");
    }
    if def.datatype.is_some() {
        tags.push("datatype");
    }
    if def.code_table.is_some() {
        tags.push("code_table");
    }
    if def.block.is_some() {
        tags.push("block");
    }
    tags
}

fn missing(def: &TypeDef, tag: &'static str, capability: Capability) -> ConfigurationError {
    ConfigurationError::MissingCapability {
        type_id: def.id.clone(),
        tag,
        capability: capability.label(),
    }
}

/// Classify one type description.
///
/// Exactly one type-level tag must be present, and the type must implement the
/// capability that tag requires. Descriptor-producing categories must also
/// carry a non-blank name.
pub fn classify<'a>(library: &ModelLibrary, def: &'a TypeDef) -> Result<TypeCategory<'a>> {
    let tags = present_tags(def);
    if tags.len() > 1 {
        return Err(ConfigurationError::ConflictingTags {
            type_id: def.id.clone(),
            tags,
        });
    }

    let implements = |capability| library.def_implements(def, capability);

    let category = if let Some(tag) = &def.resource {
        if !implements(Capability::Resource) {
            return Err(missing(def, "resource", Capability::Resource));
        }
        TypeCategory::Resource(tag)
    } else if let Some(tag) = &def.datatype {
        if implements(Capability::CompositeDatatype) {
            TypeCategory::CompositeDatatype(tag)
        } else if implements(Capability::PrimitiveDatatype) {
            TypeCategory::PrimitiveDatatype(tag)
        } else {
            return Err(missing(def, "datatype", Capability::Datatype));
        }
    } else if let Some(tag) = &def.code_table {
        if !implements(Capability::CodeEnum) {
            return Err(missing(def, "code_table", Capability::CodeEnum));
        }
        TypeCategory::CodeTable(tag)
    } else if let Some(tag) = &def.block {
        if !implements(Capability::ResourceBlock) {
            return Err(missing(def, "block", Capability::ResourceBlock));
        }
        TypeCategory::Block(tag)
    } else {
        return Err(ConfigurationError::NoSchemaAnnotation {
            type_id: def.id.clone(),
        });
    };

    if !matches!(category, TypeCategory::CodeTable(_)) && category.name().trim().is_empty() {
        return Err(ConfigurationError::MissingTypeName {
            type_id: def.id.clone(),
            tag: category.tag(),
        });
    }

    Ok(category)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> ModelLibrary {
        ModelLibrary::with_builtins()
    }

    #[test]
    fn test_classify_resource() {
        let def = TypeDef::new("res.Patient")
            .with_capability(Capability::Resource)
            .resource("Patient", Some(0));
        let category = classify(&library(), &def).unwrap();
        assert!(matches!(category, TypeCategory::Resource(tag) if tag.name == "Patient"));
    }

    #[test]
    fn test_classify_datatypes_by_capability() {
        let composite = TypeDef::new("dt.HumanName")
            .with_capability(Capability::CompositeDatatype)
            .datatype("HumanName");
        let primitive = TypeDef::new("dt.Integer")
            .with_capability(Capability::PrimitiveDatatype)
            .datatype("integer");

        let library = library();
        assert!(matches!(classify(&library, &composite).unwrap(), TypeCategory::CompositeDatatype(_)));
        assert!(matches!(classify(&library, &primitive).unwrap(), TypeCategory::PrimitiveDatatype(_)));
    }

    #[test]
    fn test_resource_tag_without_capability() {
        let def = TypeDef::new("res.Fake").resource("Fake", None);
        let err = classify(&library(), &def).unwrap_err();
        match err {
            ConfigurationError::MissingCapability { tag, capability, .. } => {
                assert_eq!(tag, "resource");
                assert_eq!(capability, "resource");
            }
            other => panic!("Expected MissingCapability, got {:?}", other),
        }
    }

    #[test]
    fn test_no_tag() {
        let def = TypeDef::new("plain.Thing").with_capability(Capability::CompositeElement);
        assert!(matches!(
            classify(&library(), &def),
            Err(ConfigurationError::NoSchemaAnnotation { .. })
        ));
    }

    #[test]
    fn test_conflicting_tags() {
        let def = TypeDef::new("odd.Both")
            .with_capability(Capability::Resource)
            .with_capability(Capability::ResourceBlock)
            .resource("Both", None)
            .block("Both");
        match classify(&library(), &def) {
            Err(ConfigurationError::ConflictingTags { tags, .. }) => {
                assert_eq!(tags, vec!["resource", "block"]);
            }
            other => panic!("Expected ConflictingTags, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_name_rejected() {
        let def = TypeDef::new("blk.Contact")
            .with_capability(Capability::ResourceBlock)
            .block("  ");
        assert!(matches!(
            classify(&library(), &def),
            Err(ConfigurationError::MissingTypeName { tag: "block", .. })
        ));
    }

    #[test]
    fn test_code_table_needs_no_name() {
        let def = TypeDef::new("codes.Gender")
            .with_capability(Capability::CodeEnum)
            .code_table("");
        assert!(matches!(classify(&library(), &def).unwrap(), TypeCategory::CodeTable(_)));
    }
}
