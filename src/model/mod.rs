//! Model Description Table
//!
//! Plain-data description of every candidate model type: its structural
//! capabilities, its single schema tag and its declared fields. The scanner
//! consumes this table instead of inspecting types at runtime.
//!
//! Descriptions are usually loaded from JSON (see [`loader`]) but can also be
//! assembled in code with the small builder methods on [`TypeDef`] and
//! [`FieldDef`].

pub mod builtins;
pub mod library;
pub mod loader;

pub use library::ModelLibrary;
pub use loader::{load_from_directory, load_from_embedded, LoadConfig};

use serde::{Deserialize, Serialize};

/// Canonical type identifier (e.g. `model.resource.Patient`)
pub type TypeId = String;

/// Order value meaning "position not declared"
pub const ORDER_UNKNOWN: i32 = -1;

/// Maximum occurrence value meaning "unbounded"
pub const MAX_UNLIMITED: i32 = -1;

// =============================================================================
// Capabilities
// =============================================================================

/// Structural capability a type implements.
///
/// Capabilities are inherited down the parent chain, and each one implies its
/// super-capabilities (a resource is also a composite element, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Any model element
    Element,
    /// Element made of named child fields
    CompositeElement,
    /// Top-level resource
    Resource,
    /// Any datatype
    Datatype,
    /// Datatype with child fields
    CompositeDatatype,
    /// Datatype holding a single scalar value
    PrimitiveDatatype,
    /// Primitive whose values come from a code table
    CodedDatatype,
    /// Reusable sub-structure local to its parent
    ResourceBlock,
    /// Pointer to another resource
    ResourceReference,
    /// Enumerated code table
    CodeEnum,
    /// Human-readable markup primitive used by narratives
    NarrativeMarkup,
}

impl Capability {
    /// Capabilities directly implied by this one
    pub fn supers(self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Element | CodeEnum => &[],
            CompositeElement | Datatype => &[Element],
            Resource | ResourceBlock => &[CompositeElement],
            CompositeDatatype => &[Datatype, CompositeElement],
            PrimitiveDatatype => &[Datatype],
            CodedDatatype | NarrativeMarkup => &[PrimitiveDatatype],
            ResourceReference => &[CompositeDatatype],
        }
    }

    /// Whether holding `self` means also holding `other`
    pub fn implies(self, other: Capability) -> bool {
        self == other || self.supers().iter().any(|s| s.implies(other))
    }

    /// Human-facing label used in error messages
    pub fn label(self) -> &'static str {
        match self {
            Capability::Element => "element",
            Capability::CompositeElement => "composite element",
            Capability::Resource => "resource",
            Capability::Datatype => "datatype",
            Capability::CompositeDatatype => "composite datatype",
            Capability::PrimitiveDatatype => "primitive datatype",
            Capability::CodedDatatype => "coded datatype",
            Capability::ResourceBlock => "resource block",
            Capability::ResourceReference => "resource reference",
            Capability::CodeEnum => "code enumeration",
            Capability::NarrativeMarkup => "narrative markup",
        }
    }
}

// =============================================================================
// Type-level tags
// =============================================================================

/// `resource` tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTag {
    #[serde(default)]
    pub name: String,
    /// Canonical position of an `identifier` child declared without an order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_order: Option<u32>,
}

/// `datatype`, `block` and `code_table` tags only carry a name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTag {
    #[serde(default)]
    pub name: String,
}

impl NamedTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// =============================================================================
// Field-level tags
// =============================================================================

/// Multi-valued container a field may be declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// Ordered list; the only supported shape
    List,
    Set,
    Collection,
}

impl Container {
    pub fn label(self) -> &'static str {
        match self {
            Container::List => "list",
            Container::Set => "set",
            Container::Collection => "collection",
        }
    }
}

/// `child` tag: marks a field as part of the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildTag {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_order")]
    pub order: i32,
    #[serde(default)]
    pub min: u32,
    #[serde(default = "default_max")]
    pub max: i32,
    /// Closed set of candidate value types for a choice field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choice: Vec<TypeId>,
}

impl ChildTag {
    pub fn new(name: impl Into<String>, order: i32) -> Self {
        Self {
            name: name.into(),
            order,
            min: 0,
            max: default_max(),
            choice: Vec::new(),
        }
    }

    pub fn cardinality(mut self, min: u32, max: i32) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

/// `narrative` tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeTag {
    #[serde(default)]
    pub name: String,
}

/// `extension` tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionTag {
    #[serde(default)]
    pub url: String,
}

/// `child_resource` tag: permitted targets of a reference field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildResourceTag {
    #[serde(default)]
    pub types: Vec<TypeId>,
}

/// `coded_value` tag: associates a code table with a coded field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedValueTag {
    pub code_table: TypeId,
}

fn default_order() -> i32 {
    ORDER_UNKNOWN
}

fn default_max() -> i32 {
    1
}

// =============================================================================
// Definitions
// =============================================================================

/// One declared field of one type (inherited fields live on the parent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Source field name, for diagnostics
    pub field: String,
    /// Declared value type (element type when `container` is set)
    pub value_type: TypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<ChildTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<NarrativeTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<ExtensionTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_resource: Option<ChildResourceTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coded_value: Option<CodedValueTag>,
}

impl FieldDef {
    pub fn new(field: impl Into<String>, value_type: impl Into<TypeId>) -> Self {
        Self {
            field: field.into(),
            value_type: value_type.into(),
            container: None,
            child: None,
            narrative: None,
            extension: None,
            child_resource: None,
            coded_value: None,
        }
    }

    /// Shorthand for a `child` tagged field
    pub fn child(field: impl Into<String>, value_type: impl Into<TypeId>, order: i32) -> Self {
        let field = field.into();
        let tag = ChildTag::new(field.clone(), order);
        Self::new(field, value_type).with_child(tag)
    }

    pub fn with_child(mut self, tag: ChildTag) -> Self {
        self.child = Some(tag);
        self
    }

    pub fn in_container(mut self, container: Container) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_choice<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TypeId>,
    {
        if let Some(child) = self.child.as_mut() {
            child.choice = types.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn as_extension(mut self, url: impl Into<String>) -> Self {
        self.extension = Some(ExtensionTag { url: url.into() });
        self
    }

    pub fn as_narrative(mut self, name: impl Into<String>) -> Self {
        self.narrative = Some(NarrativeTag { name: name.into() });
        self
    }

    pub fn referencing<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TypeId>,
    {
        self.child_resource = Some(ChildResourceTag {
            types: types.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn coded_by(mut self, code_table: impl Into<TypeId>) -> Self {
        self.coded_value = Some(CodedValueTag {
            code_table: code_table.into(),
        });
        self
    }
}

/// Description of one candidate model type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub id: TypeId,
    /// Direct supertype
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TypeId>,
    /// Interfaces and abstract bases are never scanned on discovery
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<NamedTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<NamedTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_table: Option<NamedTag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDef>,
}

impl TypeDef {
    pub fn new(id: impl Into<TypeId>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            is_abstract: false,
            capabilities: Vec::new(),
            resource: None,
            datatype: None,
            block: None,
            code_table: None,
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<TypeId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn resource(mut self, name: impl Into<String>, identifier_order: Option<u32>) -> Self {
        self.resource = Some(ResourceTag {
            name: name.into(),
            identifier_order,
        });
        self
    }

    pub fn datatype(mut self, name: impl Into<String>) -> Self {
        self.datatype = Some(NamedTag::new(name));
        self
    }

    pub fn block(mut self, name: impl Into<String>) -> Self {
        self.block = Some(NamedTag::new(name));
        self
    }

    pub fn code_table(mut self, name: impl Into<String>) -> Self {
        self.code_table = Some(NamedTag::new(name));
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}
