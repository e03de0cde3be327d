//! Model lineage
//!
//! Only child edges are kept: the one question dbt-ci asks of the graph is
//! what a trailing `+` in a selector pulls in.

use std::collections::{BTreeMap, BTreeSet};

use crate::manifest::Manifest;

/// Node identifier (unique_id from manifest)
pub type NodeId = String;

/// Parent to child edges between manifest nodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    children: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl DependencyGraph {
    /// Edges from every node's `depends_on`, merged with dbt's `child_map`
    /// when the manifest carries one
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut graph = Self::default();

        for (child, node) in &manifest.nodes {
            for parent in &node.depends_on.nodes {
                graph.add_edge(parent, child);
            }
        }
        for (parent, children) in &manifest.child_map {
            for child in children {
                graph.add_edge(parent, child);
            }
        }

        graph
    }

    fn add_edge(&mut self, parent: &str, child: &str) {
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }

    /// Direct dependents of a node, sorted
    pub fn children(&self, node_id: &str) -> impl Iterator<Item = &str> {
        self.children
            .get(node_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Every node reachable through child edges, sorted, excluding the node itself
    pub fn downstream(&self, node_id: &str) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<&str> = self.children(node_id).collect();

        while let Some(next) = pending.pop() {
            if next != node_id && seen.insert(next) {
                pending.extend(self.children(next));
            }
        }

        seen.into_iter().map(str::to_string).collect()
    }
}
