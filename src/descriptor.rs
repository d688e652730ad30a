//! Runtime Descriptors
//!
//! The resolved representation of one model type ([`TypeDescriptor`]) and of
//! each of its field slots ([`ChildDescriptor`]).
//!
//! During scanning, references to other types are recorded as raw
//! [`TypeId`]s inside [`TypeLink`]s. The sealing pass later resolves each link
//! to a [`DescriptorRef`] pointing into the finished registry, so descriptors
//! can reference each other cyclically without owning each other.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

use crate::model::TypeId;

// =============================================================================
// Links
// =============================================================================

/// Handle of a descriptor inside a [`crate::ModelRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DescriptorRef(u32);

impl DescriptorRef {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reference from a child slot to another model type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeLink {
    pub target: TypeId,
    /// Set by sealing; stays empty for abstract targets ("any type of this family")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<DescriptorRef>,
}

impl TypeLink {
    pub(crate) fn new(target: impl Into<TypeId>) -> Self {
        Self {
            target: target.into(),
            descriptor: None,
        }
    }
}

/// Kind of reference a link represents, used for the registry's reference graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Value,
    Choice,
    Reference,
    Block,
    Extension,
    Narrative,
}

/// Lookup tables handed to every descriptor during sealing
pub(crate) struct SealContext<'a> {
    pub by_type: &'a BTreeMap<TypeId, DescriptorRef>,
    pub names: &'a [String],
}

impl SealContext<'_> {
    fn resolve(&self, link: &mut TypeLink) {
        link.descriptor = self.by_type.get(&link.target).copied();
        if link.descriptor.is_none() {
            trace!("Link to '{}' left unresolved", link.target);
        }
    }

    fn name_of(&self, descriptor: DescriptorRef) -> &str {
        &self.names[descriptor.index()]
    }
}

/// Upper-case the first character (`quantity` -> `Quantity`)
pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Child descriptors
// =============================================================================

/// Name, cardinality and position shared by every ordered child
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildSlot {
    /// Element name, unique within the owning type
    pub name: String,
    /// Source field the slot was declared on
    pub field: String,
    pub min: u32,
    /// `None` means unbounded
    pub max: Option<u32>,
    pub order: i32,
}

/// Whether a plain value is a primitive or a composite datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatatypeKind {
    Primitive,
    Composite,
}

/// Field holding a datatype value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlainChild {
    #[serde(flatten)]
    pub slot: ChildSlot,
    pub value: TypeLink,
    pub datatype: DatatypeKind,
    /// Code table associated with a coded value; recorded, never resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_table: Option<TypeId>,
}

/// Field holding one of a closed set of value types
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceChild {
    #[serde(flatten)]
    pub slot: ChildSlot,
    pub candidates: Vec<TypeLink>,
    /// Wire name per candidate (`value` + `Quantity` -> `valueQuantity`), built at sealing
    pub child_names: BTreeMap<String, DescriptorRef>,
}

impl ChoiceChild {
    /// Wire name used when this choice holds a value of `descriptor`
    pub fn child_name_for(&self, descriptor: DescriptorRef) -> Option<&str> {
        self.child_names
            .iter()
            .find(|(_, d)| **d == descriptor)
            .map(|(name, _)| name.as_str())
    }

    /// Candidate type selected by a wire name
    pub fn type_for_child_name(&self, name: &str) -> Option<DescriptorRef> {
        self.child_names.get(name).copied()
    }
}

/// Field referencing one of a closed set of resource types
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceChild {
    #[serde(flatten)]
    pub slot: ChildSlot,
    pub permitted: Vec<TypeLink>,
}

/// Field holding a nested block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockChild {
    #[serde(flatten)]
    pub slot: ChildSlot,
    pub block: TypeLink,
}

/// Declared extension slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionChild {
    #[serde(flatten)]
    pub slot: ChildSlot,
    pub url: String,
    pub value: TypeLink,
}

/// Human-readable narrative slot; unordered, at most one per type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrativeChild {
    pub name: String,
    pub field: String,
    pub narrative: TypeLink,
}

/// One field slot of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ChildDescriptor {
    Plain(PlainChild),
    Choice(ChoiceChild),
    ResourceReference(ReferenceChild),
    NestedBlock(BlockChild),
    Extension(ExtensionChild),
    Narrative(NarrativeChild),
}

impl ChildDescriptor {
    pub fn name(&self) -> &str {
        match self {
            ChildDescriptor::Narrative(n) => &n.name,
            other => other.slot().map(|s| s.name.as_str()).unwrap_or_default(),
        }
    }

    /// Ordered slot data; `None` for the narrative
    pub fn slot(&self) -> Option<&ChildSlot> {
        match self {
            ChildDescriptor::Plain(c) => Some(&c.slot),
            ChildDescriptor::Choice(c) => Some(&c.slot),
            ChildDescriptor::ResourceReference(c) => Some(&c.slot),
            ChildDescriptor::NestedBlock(c) => Some(&c.slot),
            ChildDescriptor::Extension(c) => Some(&c.slot),
            ChildDescriptor::Narrative(_) => None,
        }
    }

    pub(crate) fn slot_mut(&mut self) -> Option<&mut ChildSlot> {
        match self {
            ChildDescriptor::Plain(c) => Some(&mut c.slot),
            ChildDescriptor::Choice(c) => Some(&mut c.slot),
            ChildDescriptor::ResourceReference(c) => Some(&mut c.slot),
            ChildDescriptor::NestedBlock(c) => Some(&mut c.slot),
            ChildDescriptor::Extension(c) => Some(&mut c.slot),
            ChildDescriptor::Narrative(_) => None,
        }
    }

    pub fn order(&self) -> Option<i32> {
        self.slot().map(|s| s.order)
    }

    pub fn is_extension(&self) -> bool {
        matches!(self, ChildDescriptor::Extension(_))
    }

    /// Every type this child points at
    pub fn links(&self) -> Vec<(LinkKind, &TypeLink)> {
        match self {
            ChildDescriptor::Plain(c) => vec![(LinkKind::Value, &c.value)],
            ChildDescriptor::Choice(c) => c.candidates.iter().map(|l| (LinkKind::Choice, l)).collect(),
            ChildDescriptor::ResourceReference(c) => {
                c.permitted.iter().map(|l| (LinkKind::Reference, l)).collect()
            }
            ChildDescriptor::NestedBlock(c) => vec![(LinkKind::Block, &c.block)],
            ChildDescriptor::Extension(c) => vec![(LinkKind::Extension, &c.value)],
            ChildDescriptor::Narrative(c) => vec![(LinkKind::Narrative, &c.narrative)],
        }
    }

    fn seal(&mut self, ctx: &SealContext<'_>) {
        match self {
            ChildDescriptor::Plain(c) => ctx.resolve(&mut c.value),
            ChildDescriptor::Choice(c) => {
                for candidate in &mut c.candidates {
                    ctx.resolve(candidate);
                    if let Some(descriptor) = candidate.descriptor {
                        let wire = format!("{}{}", c.slot.name, capitalize(ctx.name_of(descriptor)));
                        c.child_names.entry(wire).or_insert(descriptor);
                    }
                }
            }
            ChildDescriptor::ResourceReference(c) => {
                for permitted in &mut c.permitted {
                    ctx.resolve(permitted);
                }
            }
            ChildDescriptor::NestedBlock(c) => ctx.resolve(&mut c.block),
            ChildDescriptor::Extension(c) => ctx.resolve(&mut c.value),
            ChildDescriptor::Narrative(c) => ctx.resolve(&mut c.narrative),
        }
    }
}

// =============================================================================
// Type descriptors
// =============================================================================

/// Category of a type descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DescriptorKind {
    Resource {
        #[serde(skip_serializing_if = "Option::is_none")]
        identifier_order: Option<u32>,
    },
    CompositeDatatype,
    PrimitiveDatatype {
        /// Narrative markup primitive (xhtml)
        markup: bool,
    },
    Block,
}

impl DescriptorKind {
    pub fn label(&self) -> &'static str {
        match self {
            DescriptorKind::Resource { .. } => "resource",
            DescriptorKind::CompositeDatatype => "composite",
            DescriptorKind::PrimitiveDatatype { .. } => "primitive",
            DescriptorKind::Block => "block",
        }
    }
}

/// Resolved description of one model type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDescriptor {
    pub type_id: TypeId,
    pub name: String,
    #[serde(flatten)]
    pub kind: DescriptorKind,
    children: Vec<ChildDescriptor>,
    #[serde(skip)]
    by_name: BTreeMap<String, usize>,
    sealed: bool,
}

impl TypeDescriptor {
    pub(crate) fn new(type_id: impl Into<TypeId>, name: impl Into<String>, kind: DescriptorKind) -> Self {
        Self {
            type_id: type_id.into(),
            name: name.into(),
            kind,
            children: Vec::new(),
            by_name: BTreeMap::new(),
            sealed: false,
        }
    }

    pub(crate) fn set_children(&mut self, children: Vec<ChildDescriptor>) {
        self.children = children;
    }

    pub fn is_resource(&self) -> bool {
        matches!(self.kind, DescriptorKind::Resource { .. })
    }

    pub fn is_datatype(&self) -> bool {
        matches!(
            self.kind,
            DescriptorKind::CompositeDatatype | DescriptorKind::PrimitiveDatatype { .. }
        )
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// All children: the narrative first, then ordered slots by ascending order
    pub fn children(&self) -> &[ChildDescriptor] {
        &self.children
    }

    /// Declared extension slots, in order
    pub fn extensions(&self) -> impl Iterator<Item = &ExtensionChild> {
        self.children.iter().filter_map(|c| match c {
            ChildDescriptor::Extension(e) => Some(e),
            _ => None,
        })
    }

    pub fn narrative(&self) -> Option<&NarrativeChild> {
        self.children.iter().find_map(|c| match c {
            ChildDescriptor::Narrative(n) => Some(n),
            _ => None,
        })
    }

    /// Child by element name, or by a choice wire name such as `valueQuantity`
    pub fn child_by_name(&self, name: &str) -> Option<&ChildDescriptor> {
        self.by_name.get(name).map(|&i| &self.children[i])
    }

    pub(crate) fn seal(&mut self, ctx: &SealContext<'_>) {
        debug_assert!(!self.sealed, "descriptor {} sealed twice", self.type_id);

        for (index, child) in self.children.iter_mut().enumerate() {
            child.seal(ctx);
            self.by_name.insert(child.name().to_string(), index);
            if let ChildDescriptor::Choice(choice) = child {
                for wire in choice.child_names.keys() {
                    self.by_name.entry(wire.clone()).or_insert(index);
                }
            }
        }

        self.sealed = true;
    }
}

// =============================================================================
// Undeclared extensions
// =============================================================================

/// Any extension not declared on its owning type. One per registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UndeclaredExtensionDescriptor {
    /// `value<Datatype>` wire name -> datatype descriptor
    value_types: BTreeMap<String, DescriptorRef>,
    #[serde(skip)]
    names: BTreeMap<DescriptorRef, String>,
    sealed: bool,
}

impl UndeclaredExtensionDescriptor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seal(&mut self, descriptors: &[TypeDescriptor]) {
        for (index, descriptor) in descriptors.iter().enumerate() {
            let eligible = match descriptor.kind {
                DescriptorKind::CompositeDatatype => true,
                DescriptorKind::PrimitiveDatatype { markup } => !markup,
                _ => false,
            };
            if !eligible {
                continue;
            }

            let handle = DescriptorRef::new(index);
            let wire = format!("value{}", capitalize(&descriptor.name));
            if !self.value_types.contains_key(&wire) {
                self.value_types.insert(wire.clone(), handle);
                self.names.insert(handle, wire);
            }
        }
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn value_types(&self) -> &BTreeMap<String, DescriptorRef> {
        &self.value_types
    }

    /// Wire name for an extension value of the given datatype
    pub fn child_name_for(&self, descriptor: DescriptorRef) -> Option<&str> {
        self.names.get(&descriptor).map(String::as_str)
    }

    /// Datatype selected by a wire name such as `valueString`
    pub fn type_for_child_name(&self, name: &str) -> Option<DescriptorRef> {
        self.value_types.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(name: &str, order: i32) -> ChildSlot {
        ChildSlot {
            name: name.to_string(),
            field: format!("my{}", capitalize(name)),
            min: 0,
            max: Some(1),
            order,
        }
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("quantity"), "Quantity");
        assert_eq!(capitalize("Narrative"), "Narrative");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_seal_resolves_choice_names() {
        let by_type: BTreeMap<TypeId, DescriptorRef> = [
            ("dt.String".to_string(), DescriptorRef::new(0)),
            ("dt.Quantity".to_string(), DescriptorRef::new(1)),
        ]
        .into_iter()
        .collect();
        let names = vec!["string".to_string(), "Quantity".to_string()];
        let ctx = SealContext { by_type: &by_type, names: &names };

        let mut descriptor = TypeDescriptor::new("res.Observation", "Observation", DescriptorKind::Block);
        descriptor.set_children(vec![ChildDescriptor::Choice(ChoiceChild {
            slot: slot("value", 0),
            candidates: vec![TypeLink::new("dt.String"), TypeLink::new("dt.Quantity"), TypeLink::new("dt.Missing")],
            child_names: BTreeMap::new(),
        })]);
        descriptor.seal(&ctx);

        assert!(descriptor.is_sealed());
        let ChildDescriptor::Choice(choice) = &descriptor.children()[0] else {
            panic!("Expected choice child");
        };
        assert_eq!(choice.type_for_child_name("valueQuantity"), Some(DescriptorRef::new(1)));
        assert_eq!(choice.child_name_for(DescriptorRef::new(0)), Some("valueString"));
        assert_eq!(choice.candidates[2].descriptor, None);

        assert!(descriptor.child_by_name("value").is_some());
        assert!(descriptor.child_by_name("valueString").is_some());
        assert!(descriptor.child_by_name("valueMissing").is_none());
    }

    #[test]
    fn test_undeclared_extension_skips_markup_and_structures() {
        let descriptors = vec![
            TypeDescriptor::new("dt.String", "string", DescriptorKind::PrimitiveDatatype { markup: false }),
            TypeDescriptor::new("dt.Xhtml", "xhtml", DescriptorKind::PrimitiveDatatype { markup: true }),
            TypeDescriptor::new("res.Patient", "Patient", DescriptorKind::Resource { identifier_order: None }),
            TypeDescriptor::new("dt.Narrative", "Narrative", DescriptorKind::CompositeDatatype),
        ];

        let mut undeclared = UndeclaredExtensionDescriptor::new();
        undeclared.seal(&descriptors);

        assert!(undeclared.is_sealed());
        assert_eq!(undeclared.value_types().len(), 2);
        assert_eq!(undeclared.type_for_child_name("valueString"), Some(DescriptorRef::new(0)));
        assert_eq!(undeclared.child_name_for(DescriptorRef::new(3)), Some("valueNarrative"));
        assert_eq!(undeclared.type_for_child_name("valueXhtml"), None);
    }
}
