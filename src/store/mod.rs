use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::{GraphId, PropertyKind, Result, Value};
use crate::mapping::WriteOperation;

pub mod memory;

pub use memory::InMemoryGraphStore;

/// A node as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub id: GraphId,
    pub labels: Vec<String>,
    pub version: Option<i64>,
    pub properties: BTreeMap<String, Value>,
}

impl RawNode {
    pub fn new(id: impl Into<GraphId>, label: &str) -> Self {
        Self {
            id: id.into(),
            labels: vec![label.to_string()],
            version: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|candidate| candidate == label)
    }
}

/// A directed relationship as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    pub id: Option<GraphId>,
    pub edge_type: String,
    pub source: GraphId,
    pub target: GraphId,
    pub properties: BTreeMap<String, Value>,
}

impl RawEdge {
    pub fn new(source: impl Into<GraphId>, edge_type: &str, target: impl Into<GraphId>) -> Self {
        Self {
            id: None,
            edge_type: edge_type.to_string(),
            source: source.into(),
            target: target.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<GraphId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }
}

/// A root node plus the subgraph reachable from it, the input of
/// materialization. Edges keep the order they were added in.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRecord {
    pub root: GraphId,
    nodes: HashMap<GraphId, RawNode>,
    edges: Vec<RawEdge>,
}

impl GraphRecord {
    pub fn new(root: RawNode) -> Self {
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            root: root_id,
            nodes,
            edges: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: RawNode) -> Self {
        self.add_node(node);
        self
    }

    pub fn with_edge(mut self, edge: RawEdge) -> Self {
        self.add_edge(edge);
        self
    }

    pub fn add_node(&mut self, node: RawNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn add_edge(&mut self, edge: RawEdge) {
        self.edges.push(edge);
    }

    pub fn node(&self, id: &GraphId) -> Option<&RawNode> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &GraphId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn outgoing<'a>(&'a self, id: &GraphId) -> impl Iterator<Item = &'a RawEdge> + use<'a> {
        let id = id.clone();
        self.edges.iter().filter(move |edge| edge.source == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Address of a node inside one write batch: either already known or the
/// position of a pending insert whose id the store has yet to generate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Id(GraphId),
    Pending(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpsert {
    pub operation: WriteOperation,
    pub id: Option<GraphId>,
    /// Kind of identifier to generate when `id` is `None`.
    pub id_kind: PropertyKind,
    pub type_name: String,
    pub labels: Vec<String>,
    /// Version stored on insert. Updates move the version through
    /// [`GraphStore::compare_and_set_version`] instead.
    pub version: Option<i64>,
    pub expected_version: Option<i64>,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeUpsert {
    /// Set when the relationship already exists in the store.
    pub id: Option<GraphId>,
    pub id_kind: PropertyKind,
    pub edge_type: String,
    pub source: NodeRef,
    pub target: NodeRef,
    pub properties: BTreeMap<String, Value>,
}

/// Storage collaborator the mapper reads from and writes through.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn read_node(&self, id: &GraphId) -> Result<Option<RawNode>>;

    /// Outgoing relationships of `id`, in creation order.
    async fn read_adjacent_edges(&self, id: &GraphId) -> Result<Vec<RawEdge>>;

    /// Applies node upserts in order and returns one id per insert, in
    /// request order.
    async fn write_nodes(&self, nodes: &[NodeUpsert]) -> Result<Vec<GraphId>>;

    /// Applies relationship upserts whose endpoints are all resolved and
    /// returns one relationship id per upsert, in request order.
    async fn write_edges(&self, edges: &[EdgeUpsert]) -> Result<Vec<GraphId>>;

    /// Removes the relationships with the given ids. Unknown ids are ignored.
    async fn delete_edges(&self, ids: &[GraphId]) -> Result<()>;

    async fn compare_and_set_version(&self, id: &GraphId, expected: i64, new: i64) -> Result<bool>;
}
