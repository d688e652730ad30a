//! Model Registry
//!
//! The sealed result of a scan: one [`TypeDescriptor`] per structured type,
//! a name index over resources, the undeclared-extension descriptor and a
//! petgraph view of every resolved type-to-type link.
//!
//! A registry is immutable once built and can be shared freely across
//! threads.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::descriptor::{
    DescriptorRef, LinkKind, SealContext, TypeDescriptor, TypeLink, UndeclaredExtensionDescriptor,
};
use crate::model::TypeId;

/// Working state handed over by the scanner once discovery is complete
pub(crate) struct ScanOutput {
    pub descriptors: Vec<TypeDescriptor>,
    pub by_type: BTreeMap<TypeId, DescriptorRef>,
    pub by_resource_name: BTreeMap<String, DescriptorRef>,
    pub code_tables: BTreeSet<TypeId>,
}

/// Search result
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub type_id: TypeId,
    pub name: String,
    pub kind: &'static str,
    pub score: i64,
}

/// Canonical serialized form of a registry
#[derive(Debug, Serialize)]
pub struct RegistryExport<'a> {
    pub descriptors: &'a [TypeDescriptor],
    pub resources: &'a BTreeMap<String, DescriptorRef>,
    pub undeclared_extension: &'a UndeclaredExtensionDescriptor,
    pub referenced_code_tables: &'a BTreeSet<TypeId>,
}

/// Sealed, immutable registry of model descriptors
#[derive(Debug)]
pub struct ModelRegistry {
    descriptors: Vec<TypeDescriptor>,
    by_type: BTreeMap<TypeId, DescriptorRef>,
    by_resource_name: BTreeMap<String, DescriptorRef>,
    undeclared_extension: UndeclaredExtensionDescriptor,
    code_tables: BTreeSet<TypeId>,
    /// Node `i` holds descriptor `i`
    graph: DiGraph<DescriptorRef, LinkKind>,
}

fn build_graph(descriptors: &[TypeDescriptor]) -> DiGraph<DescriptorRef, LinkKind> {
    let mut graph = DiGraph::with_capacity(descriptors.len(), descriptors.len() * 2);
    for index in 0..descriptors.len() {
        graph.add_node(DescriptorRef::new(index));
    }

    for (index, descriptor) in descriptors.iter().enumerate() {
        let source = NodeIndex::new(index);
        for child in descriptor.children() {
            for (kind, link) in child.links() {
                if let Some(target) = link.descriptor {
                    graph.add_edge(source, NodeIndex::new(target.index()), kind);
                }
            }
        }
    }

    graph
}

impl ModelRegistry {
    /// Seal every descriptor against the complete set of scanned types
    pub(crate) fn seal(output: ScanOutput) -> Self {
        let ScanOutput {
            mut descriptors,
            by_type,
            by_resource_name,
            code_tables,
        } = output;

        let names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        let ctx = SealContext {
            by_type: &by_type,
            names: &names,
        };
        for descriptor in &mut descriptors {
            descriptor.seal(&ctx);
        }

        let mut undeclared_extension = UndeclaredExtensionDescriptor::new();
        undeclared_extension.seal(&descriptors);

        let graph = build_graph(&descriptors);

        info!("Done scanning model library, found {} model entries", descriptors.len());

        Self {
            descriptors,
            by_type,
            by_resource_name,
            undeclared_extension,
            code_tables,
            graph,
        }
    }

    // ========== Lookups ==========

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptor of a scanned type
    pub fn get(&self, type_id: &str) -> Option<&TypeDescriptor> {
        self.handle(type_id).and_then(|r| self.descriptor(r))
    }

    /// Handle of a scanned type
    pub fn handle(&self, type_id: &str) -> Option<DescriptorRef> {
        self.by_type.get(type_id).copied()
    }

    pub fn descriptor(&self, handle: DescriptorRef) -> Option<&TypeDescriptor> {
        self.descriptors.get(handle.index())
    }

    /// Follow a sealed link to its descriptor
    pub fn resolve(&self, link: &TypeLink) -> Option<&TypeDescriptor> {
        link.descriptor.and_then(|r| self.descriptor(r))
    }

    /// Resource descriptor by its wire name (e.g. `Patient`)
    pub fn resource_by_name(&self, name: &str) -> Option<&TypeDescriptor> {
        self.by_resource_name.get(name).and_then(|&r| self.descriptor(r))
    }

    /// Resource lookup ignoring ASCII case; exact matches win
    pub fn resource_by_name_ignore_case(&self, name: &str) -> Option<&TypeDescriptor> {
        if let Some(descriptor) = self.resource_by_name(name) {
            return Some(descriptor);
        }
        self.by_resource_name
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .and_then(|(_, &r)| self.descriptor(r))
    }

    /// Resource names in sorted order
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.by_resource_name.keys().map(String::as_str)
    }

    /// Every descriptor, in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors.iter()
    }

    /// Resource descriptors, sorted by name
    pub fn resources(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.by_resource_name.values().filter_map(|&r| self.descriptor(r))
    }

    pub fn undeclared_extension(&self) -> &UndeclaredExtensionDescriptor {
        &self.undeclared_extension
    }

    /// Code tables named by coded values; never resolved into descriptors
    pub fn referenced_code_tables(&self) -> &BTreeSet<TypeId> {
        &self.code_tables
    }

    // ========== Reference Graph ==========

    /// Number of resolved type-to-type links
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn neighbours(&self, type_id: &str, direction: Direction) -> Vec<&TypeId> {
        let Some(handle) = self.handle(type_id) else {
            return Vec::new();
        };

        let ids: BTreeSet<&TypeId> = self
            .graph
            .edges_directed(NodeIndex::new(handle.index()), direction)
            .map(|e| match direction {
                Direction::Outgoing => e.target(),
                Direction::Incoming => e.source(),
            })
            .filter_map(|n| self.graph.node_weight(n))
            .filter_map(|&r| self.descriptor(r))
            .map(|d| &d.type_id)
            .collect();
        ids.into_iter().collect()
    }

    /// Types directly referenced by `type_id`
    pub fn refs_out(&self, type_id: &str) -> Vec<&TypeId> {
        self.neighbours(type_id, Direction::Outgoing)
    }

    /// Types directly referencing `type_id`
    pub fn refs_in(&self, type_id: &str) -> Vec<&TypeId> {
        self.neighbours(type_id, Direction::Incoming)
    }

    /// Groups of types that reference each other, directly or transitively.
    ///
    /// Self-referencing types form a group of one.
    pub fn cycles(&self) -> Vec<Vec<TypeId>> {
        let mut groups: Vec<Vec<TypeId>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut members: Vec<TypeId> = scc
                    .into_iter()
                    .filter_map(|n| self.graph.node_weight(n))
                    .filter_map(|&r| self.descriptor(r))
                    .map(|d| d.type_id.clone())
                    .collect();
                members.sort();
                members
            })
            .collect();
        groups.sort();
        groups
    }

    /// Search descriptors by name (fuzzy)
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let mut results: Vec<(i64, &TypeDescriptor)> = Vec::new();

        for descriptor in &self.descriptors {
            if let Some(score) = matcher.fuzzy_match(&descriptor.name, query) {
                results.push((score, descriptor));
                continue;
            }
            if let Some(score) = matcher.fuzzy_match(&descriptor.type_id, query) {
                results.push((score, descriptor));
            }
        }

        // Highest score first, ties by type id
        results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.type_id.cmp(&b.1.type_id)));

        results
            .into_iter()
            .take(limit)
            .map(|(score, d)| SearchResult {
                type_id: d.type_id.clone(),
                name: d.name.clone(),
                kind: d.kind.label(),
                score,
            })
            .collect()
    }

    // ========== Export ==========

    pub fn export(&self) -> RegistryExport<'_> {
        RegistryExport {
            descriptors: &self.descriptors,
            resources: &self.by_resource_name,
            undeclared_extension: &self.undeclared_extension,
            referenced_code_tables: &self.code_tables,
        }
    }

    /// Serialize the registry to JSON
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(&self.export())
        } else {
            serde_json::to_string(&self.export())
        }
    }

    /// SHA256 of the canonical JSON export; equal for identical scans
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(&self.export()).unwrap_or_default();
        format!("{:x}", Sha256::digest(&canonical))
    }

    /// Export the reference graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph ModelRegistry {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8, fontcolor=\"#808080\"];\n");
        output.push('\n');

        let color_map = [
            ("resource", "#795548"),
            ("composite", "#00BCD4"),
            ("primitive", "#607D8B"),
            ("block", "#FF9800"),
        ];

        for descriptor in &self.descriptors {
            let color = color_map
                .iter()
                .find(|(kind, _)| *kind == descriptor.kind.label())
                .map(|(_, color)| *color)
                .unwrap_or("#9E9E9E");
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                descriptor.type_id, descriptor.name, color
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let source = self.graph.node_weight(edge.source()).and_then(|&r| self.descriptor(r));
            let target = self.graph.node_weight(edge.target()).and_then(|&r| self.descriptor(r));
            if let (Some(source), Some(target)) = (source, target) {
                let label = match edge.weight() {
                    LinkKind::Value => "value",
                    LinkKind::Choice => "choice",
                    LinkKind::Reference => "reference",
                    LinkKind::Block => "block",
                    LinkKind::Extension => "extension",
                    LinkKind::Narrative => "narrative",
                };
                output.push_str(&format!(
                    "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                    source.type_id, target.type_id, label
                ));
            }
        }

        output.push_str("}\n");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BlockChild, ChildDescriptor, ChildSlot, DescriptorKind};

    fn output() -> ScanOutput {
        let mut a = TypeDescriptor::new("blk.A", "A", DescriptorKind::Block);
        a.set_children(vec![ChildDescriptor::NestedBlock(BlockChild {
            slot: ChildSlot {
                name: "b".to_string(),
                field: "myB".to_string(),
                min: 0,
                max: None,
                order: 0,
            },
            block: TypeLink::new("blk.B"),
        })]);
        let mut b = TypeDescriptor::new("blk.B", "B", DescriptorKind::Block);
        b.set_children(vec![ChildDescriptor::NestedBlock(BlockChild {
            slot: ChildSlot {
                name: "a".to_string(),
                field: "myA".to_string(),
                min: 0,
                max: Some(1),
                order: 0,
            },
            block: TypeLink::new("blk.A"),
        })]);

        ScanOutput {
            descriptors: vec![a, b],
            by_type: [
                ("blk.A".to_string(), DescriptorRef::new(0)),
                ("blk.B".to_string(), DescriptorRef::new(1)),
            ]
            .into_iter()
            .collect(),
            by_resource_name: BTreeMap::new(),
            code_tables: BTreeSet::new(),
        }
    }

    #[test]
    fn test_seal_links_and_graph() {
        let registry = ModelRegistry::seal(output());

        assert!(registry.descriptors().all(TypeDescriptor::is_sealed));
        assert!(registry.undeclared_extension().is_sealed());
        assert_eq!(registry.link_count(), 2);
        assert_eq!(registry.refs_out("blk.A"), vec!["blk.B"]);
        assert_eq!(registry.refs_in("blk.A"), vec!["blk.B"]);
        assert_eq!(registry.cycles(), vec![vec!["blk.A".to_string(), "blk.B".to_string()]]);
    }

    #[test]
    fn test_dot_export() {
        let dot = ModelRegistry::seal(output()).to_dot();
        assert!(dot.starts_with("digraph ModelRegistry {"));
        assert!(dot.contains("\"blk.A\" -> \"blk.B\" [label=\"block\"]"));
    }

    #[test]
    fn test_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ModelRegistry>();
    }
}
