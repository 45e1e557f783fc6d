//! Canonical JSON form of a graph.
//!
//! ```json
//! { "version": "1.0",
//!   "nodes": [ { "id": "root", "depth": 0, "parentId": null, "childIds": ["a"],
//!                "metadata": { "label": "Root", "type": "concept", "tags": [],
//!                              "created": 0 } } ] }
//! ```
//!
//! Missing `childIds` means no children, missing `parentId` means root and
//! missing `metadata` yields an empty bag whose label defaults to the id.

use crate::store::Graph;
use fractality_core::{FractalityError, GraphNode, NodeId, NodeMetadata, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedGraph {
    #[serde(default = "default_version")]
    pub version: String,
    pub nodes: Vec<SerializedNode>,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedNode {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub child_ids: Vec<NodeId>,
    #[serde(default)]
    pub metadata: Option<NodeMetadata>,
}

impl SerializedNode {
    fn into_node(self) -> GraphNode {
        let mut metadata = self.metadata.unwrap_or_default();
        if metadata.label.is_empty() {
            metadata.label = self.id.0.clone();
        }
        GraphNode {
            id: self.id,
            depth: self.depth.unwrap_or(0),
            parent_id: self.parent_id,
            child_ids: self.child_ids,
            sibling_ids: Vec::new(),
            metadata,
        }
    }
}

impl Graph {
    pub fn from_serialized(form: SerializedGraph) -> Result<Graph> {
        let mut nodes = Vec::with_capacity(form.nodes.len());
        for serialized in form.nodes {
            if let (Some(depth), None) = (serialized.depth, &serialized.parent_id)
                && depth != 0
            {
                tracing::warn!(
                    "Root '{}' declares depth {}; resetting to 0",
                    serialized.id,
                    depth
                );
            }
            nodes.push(serialized.into_node());
        }
        let declared: Vec<(NodeId, u32)> = nodes.iter().map(|n| (n.id.clone(), n.depth)).collect();
        let graph = Graph::from_nodes(form.version, nodes)?;
        let repaired = declared
            .iter()
            .filter(|(id, depth)| graph.get(id.as_str()).is_some_and(|n| n.depth != *depth))
            .count();
        if repaired > 0 {
            tracing::warn!("Repaired depth of {} nodes from their parent chain", repaired);
        }
        Ok(graph)
    }

    pub fn to_serialized(&self) -> SerializedGraph {
        SerializedGraph {
            version: self.version().to_string(),
            nodes: self
                .iter()
                .map(|node| SerializedNode {
                    id: node.id.clone(),
                    depth: Some(node.depth),
                    parent_id: node.parent_id.clone(),
                    child_ids: node.child_ids.clone(),
                    metadata: Some(node.metadata.clone()),
                })
                .collect(),
        }
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.to_serialized())?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_serialized())?)
    }
}

/// Parses a canonical document. A body without a `nodes` array is
/// `SourceInvalid`; a malformed one is `ParseFailure`.
pub fn from_json_value(value: serde_json::Value) -> Result<Graph> {
    if !value.get("nodes").is_some_and(|n| n.is_array()) {
        return Err(FractalityError::SourceInvalid(
            "document has no 'nodes' array".to_string(),
        ));
    }
    let form: SerializedGraph = serde_json::from_value(value)?;
    Graph::from_serialized(form)
}

pub fn from_json_str(json: &str) -> Result<Graph> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    from_json_value(value)
}

pub fn from_json_slice(bytes: &[u8]) -> Result<Graph> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    from_json_value(value)
}
