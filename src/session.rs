//! Save/load orchestration over a [`GraphStore`].
//!
//! A [`GraphSession`] owns nothing but handles: the store, the descriptor
//! registry and the mapping configuration. Every `save` and `load` call
//! builds its own identity map, so a session can be shared across tasks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{Level, event};

use crate::config::MappingConfig;
use crate::core::{GraphId, OgmError, Result};
use crate::mapping::{
    EdgeClaims, EntityRef, GraphType, Materializer, MetadataRegistry, Ref, Serializer,
    TypeDescriptor, WriteSet,
};
use crate::store::{GraphRecord, GraphStore, NodeUpsert, RawNode};

pub struct GraphSession<S: GraphStore> {
    store: Arc<S>,
    registry: Arc<MetadataRegistry>,
    config: MappingConfig,
}

impl<S: GraphStore> Clone for GraphSession<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: GraphStore> GraphSession<S> {
    /// Session over `store` using the process-wide registry and the default
    /// configuration.
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self {
            store,
            registry: MetadataRegistry::global(),
            config: MappingConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<MetadataRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: MappingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn describe<T: GraphType>(&self) -> Result<Arc<TypeDescriptor>> {
        self.registry.describe::<T>()
    }

    pub fn serializer(&self) -> Serializer<'_> {
        Serializer::new(&self.registry, &self.config)
    }

    pub fn materializer(&self) -> Materializer<'_> {
        Materializer::new(&self.registry, &self.config)
    }

    /// Persists `entity` and everything it reaches.
    ///
    /// On success generated ids, relationship ids and new versions are
    /// written back into the instances. A version conflict fails the save
    /// before any node is written. Stored relationships of updated nodes
    /// that their fields no longer hold are deleted.
    pub async fn save<T: GraphType>(&self, entity: &Ref<T>) -> Result<()> {
        let descriptor = self.registry.describe::<T>()?;
        self.save_entity(&descriptor, &entity.erase()).await
    }

    pub async fn save_entity(&self, descriptor: &Arc<TypeDescriptor>, entity: &EntityRef) -> Result<()> {
        let set = self.serializer().serialize(descriptor, entity)?;

        let applied = self.check_versions(&set).await?;

        let inserted = match self.store.write_nodes(&set.nodes).await {
            Ok(inserted) => inserted,
            Err(err) => {
                self.restore_versions(&applied).await;
                return Err(err);
            }
        };
        let node_ids = set.node_ids(&inserted)?;
        // The nodes are stored from here on; hand their ids back even if the
        // relationship batch fails below.
        set.apply_node_results(&node_ids)?;

        let edges = set.resolve_edges(&node_ids)?;
        let mut kept = HashSet::new();
        if !edges.is_empty() {
            let edge_ids = self.store.write_edges(&edges).await?;
            set.apply_edge_results(&edge_ids)?;
            kept.extend(edge_ids);
        }
        let pruned = self.prune_edges(&set, &kept).await?;

        event!(
            Level::DEBUG,
            type_name = descriptor.name,
            nodes = set.nodes.len(),
            edges = edges.len(),
            pruned,
            "saved object graph"
        );
        Ok(())
    }

    /// Moves every expected version forward through the store's
    /// compare-and-set and returns the `(id, previous)` pairs it moved. On a
    /// conflict those are moved back and the conflict is returned.
    async fn check_versions(&self, set: &WriteSet) -> Result<Vec<(GraphId, i64)>> {
        let mut applied = Vec::new();

        for node in set.version_checks() {
            let (Some(id), Some(expected)) = (&node.id, node.expected_version) else {
                continue;
            };
            let next = expected + 1;
            match self.store.compare_and_set_version(id, expected, next).await {
                Ok(true) => applied.push((id.clone(), expected)),
                Ok(false) => {
                    self.restore_versions(&applied).await;
                    return Err(self.conflict(node, id, expected).await);
                }
                Err(err) => {
                    self.restore_versions(&applied).await;
                    return Err(err);
                }
            }
        }
        Ok(applied)
    }

    /// Moves versions bumped by [`check_versions`](Self::check_versions)
    /// back. Failures are logged; the caller's error stays the one reported.
    async fn restore_versions(&self, applied: &[(GraphId, i64)]) {
        for (id, previous) in applied {
            let failure = match self
                .store
                .compare_and_set_version(id, previous + 1, *previous)
                .await
            {
                Ok(true) => continue,
                Ok(false) => "version moved concurrently".to_string(),
                Err(err) => err.to_string(),
            };
            event!(
                Level::WARN,
                id = %id,
                version = previous + 1,
                reason = failure.as_str(),
                "could not restore node version"
            );
        }
    }

    /// Deletes stored relationships that an updated node's fields would
    /// claim on load but no longer hold. Nodes at or past `max_load_depth`
    /// are left alone, since a load stops there with their fields empty.
    async fn prune_edges(&self, set: &WriteSet, kept: &HashSet<GraphId>) -> Result<usize> {
        let mut targets: HashMap<GraphId, Option<RawNode>> = HashMap::new();
        let mut stale = Vec::new();

        for (id, descriptor, depth) in set.updated_nodes() {
            if self.config.max_load_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            let claims = EdgeClaims::new(&self.registry, descriptor)?;
            for edge in self.store.read_adjacent_edges(id).await? {
                let Some(edge_id) = edge.id.as_ref() else {
                    continue;
                };
                if kept.contains(edge_id) {
                    continue;
                }
                if !targets.contains_key(&edge.target) {
                    let node = self.store.read_node(&edge.target).await?;
                    targets.insert(edge.target.clone(), node);
                }
                let Some(Some(target)) = targets.get(&edge.target) else {
                    continue;
                };
                if claims.claim(&edge, target).is_some() {
                    event!(
                        Level::DEBUG,
                        edge_type = edge.edge_type.as_str(),
                        source = %edge.source,
                        target = %edge.target,
                        "relationship no longer held, deleting"
                    );
                    stale.push(edge_id.clone());
                }
            }
        }

        if !stale.is_empty() {
            self.store.delete_edges(&stale).await?;
        }
        Ok(stale.len())
    }

    async fn conflict(&self, node: &NodeUpsert, id: &GraphId, expected: i64) -> OgmError {
        let actual = match self.store.read_node(id).await {
            Ok(stored) => stored.and_then(|stored| stored.version),
            Err(_) => None,
        };
        event!(
            Level::WARN,
            type_name = node.type_name.as_str(),
            id = %id,
            expected,
            actual = ?actual,
            "optimistic lock conflict"
        );
        OgmError::OptimisticLock {
            type_name: node.type_name.clone(),
            id: id.to_string(),
            expected,
            actual,
        }
    }

    /// Loads the node `id` as a `T`, with the subgraph reachable from it.
    pub async fn load<T: GraphType>(&self, id: impl Into<GraphId>) -> Result<Option<Ref<T>>> {
        let descriptor = self.registry.describe::<T>()?;
        let Some(record) = self.load_record(&id.into()).await? else {
            return Ok(None);
        };
        let root = self.materializer().materialize(&descriptor, &record)?;
        Ref::from_entity(&root).map(Some)
    }

    /// Reads `id` and follows outgoing relationships breadth-first, up to
    /// `max_load_depth` hops. Each node is expanded once.
    pub async fn load_record(&self, id: &GraphId) -> Result<Option<GraphRecord>> {
        let Some(root) = self.store.read_node(id).await? else {
            return Ok(None);
        };
        let mut record = GraphRecord::new(root);
        let mut expanded = HashSet::new();
        let mut queue = VecDeque::from([(id.clone(), 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if !expanded.insert(current.clone()) {
                continue;
            }
            if self.config.max_load_depth.is_some_and(|max| depth >= max) {
                continue;
            }

            for edge in self.store.read_adjacent_edges(&current).await? {
                if !record.contains_node(&edge.target) {
                    match self.store.read_node(&edge.target).await? {
                        Some(node) => record.add_node(node),
                        None => {
                            event!(
                                Level::WARN,
                                edge_type = edge.edge_type.as_str(),
                                source = %edge.source,
                                target = %edge.target,
                                "relationship points at a missing node"
                            );
                            continue;
                        }
                    }
                }
                queue.push_back((edge.target.clone(), depth + 1));
                record.add_edge(edge);
            }
        }

        Ok(Some(record))
    }
}
