//! Nodes of the remote address space.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical string form of a remote node identifier (e.g. `ns=2;s=Line1.Temp`).
///
/// Identifiers are opaque to the bridge; two nodes are the same node exactly
/// when their canonical strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// The standard `ObjectsFolder` node (`i=85`).
    pub const OBJECTS_FOLDER: &'static str = "i=85";

    /// Create a node identifier from its canonical string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The `ObjectsFolder` node, default crawl root.
    #[must_use]
    pub fn objects_folder() -> Self {
        Self::new(Self::OBJECTS_FOLDER)
    }

    /// Borrow the canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Role of a node in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// Class not declared by the server
    Unspecified,
    /// Object (folders, devices, ...)
    Object,
    /// Variable carrying a live value
    Variable,
    /// Callable method
    Method,
    /// Object type definition
    ObjectType,
    /// Variable type definition
    VariableType,
    /// Reference type definition
    ReferenceType,
    /// Data type definition
    DataType,
    /// View
    View,
}

impl NodeClass {
    /// Whether nodes of this class get a live subscription.
    ///
    /// Some servers expose data points without declaring them `Variable`,
    /// so `Unspecified` is treated the same way.
    #[must_use]
    pub fn is_subscribable(self) -> bool {
        matches!(self, Self::Variable | Self::Unspecified)
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A node returned by a browse step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Node identifier
    pub id: NodeId,
    /// Human-readable label, absent for some node classes
    pub display_name: Option<String>,
    /// Node class
    pub node_class: NodeClass,
}

impl RemoteNode {
    /// Create a node description.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, display_name: Option<&str>, node_class: NodeClass) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.map(str::to_string),
            node_class,
        }
    }
}
