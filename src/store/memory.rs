use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{EdgeUpsert, GraphStore, NodeRef, NodeUpsert, RawEdge, RawNode};
use crate::core::{GraphId, OgmError, PropertyKind, Result};
use crate::mapping::WriteOperation;

#[derive(Debug, Default)]
struct StoreState {
    nodes: BTreeMap<GraphId, RawNode>,
    edges: Vec<RawEdge>,
    next_id: i64,
    fail_node_writes: bool,
    fail_edge_writes: bool,
}

impl StoreState {
    /// Next identifier of the given kind not held by any node or edge.
    /// Assigned identifiers share the space with generated ones.
    fn generate_id(&mut self, kind: PropertyKind) -> Result<GraphId> {
        loop {
            let candidate = match kind {
                PropertyKind::Integer => {
                    self.next_id += 1;
                    GraphId::Integer(self.next_id)
                }
                PropertyKind::Uuid => GraphId::Uuid(Uuid::new_v4()),
                PropertyKind::Text => GraphId::Text(Uuid::new_v4().to_string()),
                other => {
                    return Err(OgmError::Storage(format!(
                        "Cannot generate an identifier of type {}",
                        other
                    )));
                }
            };
            if !self.is_taken(&candidate) {
                return Ok(candidate);
            }
        }
    }

    fn is_taken(&self, id: &GraphId) -> bool {
        self.nodes.contains_key(id) || self.edges.iter().any(|edge| edge.id.as_ref() == Some(id))
    }

    fn resolved<'a>(&self, endpoint: &'a NodeRef) -> Result<&'a GraphId> {
        let NodeRef::Id(id) = endpoint else {
            return Err(OgmError::Storage(format!(
                "Relationship endpoint {:?} was not resolved before writing",
                endpoint
            )));
        };
        if !self.nodes.contains_key(id) {
            return Err(OgmError::Storage(format!(
                "Relationship endpoint {} does not exist",
                id
            )));
        }
        Ok(id)
    }
}

/// Process-local [`GraphStore`], used as the reference collaborator in tests
/// and examples. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.state.lock().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.lock().await.edges.len()
    }

    pub async fn edges(&self) -> Vec<RawEdge> {
        self.state.lock().await.edges.clone()
    }

    pub async fn insert_node(&self, node: RawNode) {
        self.state.lock().await.nodes.insert(node.id.clone(), node);
    }

    pub async fn insert_edge(&self, edge: RawEdge) {
        self.state.lock().await.edges.push(edge);
    }

    /// Makes every following `write_nodes` call fail.
    pub async fn fail_node_writes(&self, fail: bool) {
        self.state.lock().await.fail_node_writes = fail;
    }

    /// Makes every following `write_edges` call fail, to exercise batch
    /// failure handling.
    pub async fn fail_edge_writes(&self, fail: bool) {
        self.state.lock().await.fail_edge_writes = fail;
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn read_node(&self, id: &GraphId) -> Result<Option<RawNode>> {
        Ok(self.state.lock().await.nodes.get(id).cloned())
    }

    async fn read_adjacent_edges(&self, id: &GraphId) -> Result<Vec<RawEdge>> {
        let state = self.state.lock().await;
        Ok(state
            .edges
            .iter()
            .filter(|edge| &edge.source == id)
            .cloned()
            .collect())
    }

    async fn write_nodes(&self, nodes: &[NodeUpsert]) -> Result<Vec<GraphId>> {
        let mut state = self.state.lock().await;
        if state.fail_node_writes {
            return Err(OgmError::Storage("Node batch rejected by store".to_string()));
        }
        let mut inserted = Vec::new();

        for upsert in nodes {
            match upsert.operation {
                WriteOperation::Insert => {
                    let id = match &upsert.id {
                        Some(id) => {
                            if state.nodes.contains_key(id) {
                                return Err(OgmError::Storage(format!(
                                    "{} node {} already exists",
                                    upsert.type_name, id
                                )));
                            }
                            id.clone()
                        }
                        None => state.generate_id(upsert.id_kind)?,
                    };
                    debug!("insert {} node {}", upsert.type_name, id);
                    state.nodes.insert(
                        id.clone(),
                        RawNode {
                            id: id.clone(),
                            labels: upsert.labels.clone(),
                            version: upsert.version,
                            properties: upsert.properties.clone(),
                        },
                    );
                    inserted.push(id);
                }
                WriteOperation::Update => {
                    let id = upsert.id.clone().ok_or_else(|| {
                        OgmError::Storage(format!(
                            "Update of {} node without an identifier",
                            upsert.type_name
                        ))
                    })?;
                    debug!("update {} node {}", upsert.type_name, id);
                    state
                        .nodes
                        .entry(id.clone())
                        .and_modify(|node| {
                            node.labels = upsert.labels.clone();
                            node.properties = upsert.properties.clone();
                        })
                        .or_insert_with(|| RawNode {
                            id,
                            labels: upsert.labels.clone(),
                            version: upsert.version,
                            properties: upsert.properties.clone(),
                        });
                }
            }
        }

        Ok(inserted)
    }

    async fn write_edges(&self, edges: &[EdgeUpsert]) -> Result<Vec<GraphId>> {
        let mut state = self.state.lock().await;
        if state.fail_edge_writes {
            return Err(OgmError::Storage(
                "Relationship batch rejected by store".to_string(),
            ));
        }

        // Validate the whole batch first so a bad edge writes nothing.
        for upsert in edges {
            state.resolved(&upsert.source)?;
            state.resolved(&upsert.target)?;
        }

        let mut ids = Vec::with_capacity(edges.len());
        for upsert in edges {
            let source = state.resolved(&upsert.source)?.clone();
            let target = state.resolved(&upsert.target)?.clone();

            if let Some(id) = &upsert.id {
                if let Some(existing) = state
                    .edges
                    .iter_mut()
                    .find(|edge| edge.id.as_ref() == Some(id))
                {
                    existing.edge_type = upsert.edge_type.clone();
                    existing.source = source;
                    existing.target = target;
                    existing.properties = upsert.properties.clone();
                    ids.push(id.clone());
                    continue;
                }
            } else if upsert.properties.is_empty() {
                let duplicate = state.edges.iter().find(|edge| {
                    edge.source == source
                        && edge.target == target
                        && edge.edge_type == upsert.edge_type
                        && edge.properties.is_empty()
                });
                if let Some(id) = duplicate.and_then(|edge| edge.id.clone()) {
                    ids.push(id);
                    continue;
                }
            }

            let id = match &upsert.id {
                Some(id) => id.clone(),
                None => state.generate_id(upsert.id_kind)?,
            };
            debug!("create {} relationship {} -> {}", upsert.edge_type, source, target);
            state.edges.push(RawEdge {
                id: Some(id.clone()),
                edge_type: upsert.edge_type.clone(),
                source,
                target,
                properties: upsert.properties.clone(),
            });
            ids.push(id);
        }

        Ok(ids)
    }

    async fn delete_edges(&self, ids: &[GraphId]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.edges.retain(|edge| match &edge.id {
            Some(id) if ids.contains(id) => {
                debug!("delete {} relationship {} -> {}", edge.edge_type, edge.source, edge.target);
                false
            }
            _ => true,
        });
        Ok(())
    }

    async fn compare_and_set_version(&self, id: &GraphId, expected: i64, new: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(node) = state.nodes.get_mut(id) else {
            return Ok(false);
        };
        if node.version != Some(expected) {
            debug!(
                "version check failed for node {}: expected {}, stored {:?}",
                id, expected, node.version
            );
            return Ok(false);
        }
        node.version = Some(new);
        Ok(true)
    }
}
