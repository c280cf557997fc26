//! Graph snapshots as handed over by the editor.
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::{InputId, InputValue, OutputId, SchemaId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub schema_id: SchemaId,
    /// Literal input values, keyed by input id.
    #[serde(default)]
    pub data: IndexMap<InputId, InputValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: NodeId,
    pub source_handle: OutputId,
    pub target: NodeId,
    pub target_handle: InputId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Incoming edges by target handle; an input has at most one source.
#[derive(Debug, Default)]
pub struct EdgeIndex {
    by_target: HashMap<(NodeId, InputId), Edge>,
}

impl EdgeIndex {
    pub fn new(edges: &[Edge]) -> Self {
        let by_target = edges
            .iter()
            .map(|e| ((e.target.clone(), e.target_handle), e.clone()))
            .collect();
        Self { by_target }
    }

    pub fn source_of(&self, node: &NodeId, input: InputId) -> Option<&Edge> {
        self.by_target.get(&(node.clone(), input))
    }

    pub fn is_connected(&self, node: &NodeId, input: InputId) -> bool {
        self.source_of(node, input).is_some()
    }
}
