//! Error types for the model scanner
//!
//! Every error here is a build-time problem in the model description. A scan
//! that hits one aborts as a whole: there is no partially populated registry.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::TypeId;

/// Result type for scanner operations
pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Model configuration errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Type does not contain any recognized schema annotation: {type_id}")]
    NoSchemaAnnotation { type_id: TypeId },

    #[error("Type '{type_id}' carries conflicting schema annotations: {}", .tags.join(", "))]
    ConflictingTags { type_id: TypeId, tags: Vec<&'static str> },

    #[error("Type contains a @{tag} annotation but does not implement {capability}: {type_id}")]
    MissingCapability {
        type_id: TypeId,
        tag: &'static str,
        capability: &'static str,
    },

    #[error("Type @{tag} annotation contains no name: {type_id}")]
    MissingTypeName { type_id: TypeId, tag: &'static str },

    #[error("Field '{field}' in type '{type_id}' has a @{tag} annotation with no name")]
    MissingFieldName {
        type_id: TypeId,
        field: String,
        tag: &'static str,
    },

    #[error("Detected duplicate field name '{name}' in type '{type_id}'")]
    DuplicateFieldName { type_id: TypeId, name: String },

    #[error("Detected duplicate field order '{order}' for element named '{name}' in type '{type_id}'")]
    DuplicateFieldOrder {
        type_id: TypeId,
        name: String,
        order: i32,
    },

    #[error("Field '{name}' in type '{type_id}' declares invalid order {order}")]
    InvalidOrder {
        type_id: TypeId,
        name: String,
        order: i32,
    },

    #[error("Field '{name}' in type '{type_id}' declares invalid cardinality {min}..{max}")]
    InvalidCardinality {
        type_id: TypeId,
        name: String,
        min: u32,
        max: i32,
    },

    #[error("Don't know how to place element '{name}' with unspecified order in type '{type_id}'")]
    UnplaceableField { type_id: TypeId, name: String },

    #[error("Field '{field}' in type '{type_id}' is a {container} - only list is currently supported")]
    UnsupportedContainer {
        type_id: TypeId,
        field: String,
        container: &'static str,
    },

    #[error("Field '{name}' in type '{type_id}' is a resource reference but does not declare its permitted resource types")]
    MissingReferenceTypes { type_id: TypeId, name: String },

    #[error("Field '{name}' in type '{type_id}' is marked as a coded value but '{value_type}' is not a coded datatype")]
    NotCodedDatatype {
        type_id: TypeId,
        name: String,
        value_type: TypeId,
    },

    #[error("Field '{name}' in type '{type_id}' is not a valid child type ({value_type})")]
    InvalidChildType {
        type_id: TypeId,
        name: String,
        value_type: TypeId,
    },

    #[error("Type '{type_id}' declares more than one narrative field")]
    DuplicateNarrative { type_id: TypeId },

    #[error("Detected duplicate element name '{name}' in types '{existing}' and '{duplicate}'")]
    DuplicateResourceName {
        name: String,
        existing: TypeId,
        duplicate: TypeId,
    },

    #[error("Type '{type_id}' is referenced but not described in the model library")]
    UnknownType { type_id: TypeId },

    #[error("Type '{type_id}' is described more than once in the model library")]
    DuplicateTypeId { type_id: TypeId },

    #[error("Failed to parse model description {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
