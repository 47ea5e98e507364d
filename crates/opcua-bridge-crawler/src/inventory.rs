//! Per-run bookkeeping of the crawl.

use opcua_bridge_core::{NodeClass, NodeId, RemoteNode};
use std::collections::HashSet;
use std::fmt;

/// Node ids already admitted in the current crawl run.
#[derive(Debug, Default)]
pub struct VisitedSet {
    ids: HashSet<NodeId>,
}

impl VisitedSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` visited; `false` if it already was.
    pub fn insert(&mut self, id: &NodeId) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.clone())
    }

    /// Whether `id` was visited.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    /// Number of visited nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing was visited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Forget all visits.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// One admitted node, as logged after the crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    /// Distance from the crawl root
    pub depth: usize,
    /// Node identifier
    pub node_id: NodeId,
    /// Display name, if the server sent one
    pub display_name: Option<String>,
    /// Node class
    pub node_class: NodeClass,
}

impl InventoryEntry {
    /// Record `node` at `depth`.
    #[must_use]
    pub fn new(node: &RemoteNode, depth: usize) -> Self {
        Self {
            depth,
            node_id: node.id.clone(),
            display_name: node.display_name.clone(),
            node_class: node.node_class,
        }
    }
}

impl fmt::Display for InventoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}: {} ({})",
            "  ".repeat(self.depth),
            self.node_id,
            self.display_name.as_deref().unwrap_or(""),
            self.node_class
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut visited = VisitedSet::new();
        let id = NodeId::new("ns=2;i=1");

        assert!(visited.insert(&id));
        assert!(!visited.insert(&id));
        assert!(visited.contains(&id));
        assert_eq!(visited.len(), 1);

        visited.clear();
        assert!(visited.is_empty());
    }

    #[test]
    fn entry_renders_indented_line() {
        let node = RemoteNode::new("ns=2;s=Temp", Some("Temp"), NodeClass::Variable);
        assert_eq!(
            InventoryEntry::new(&node, 2).to_string(),
            "    ns=2;s=Temp: Temp (Variable)"
        );
    }
}
