use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{Level, event};

use super::descriptor::{RelationshipDescriptor, TypeDescriptor};
use super::entity::EntityRef;
use super::identity::{self, WriteOperation};
use super::registry::MetadataRegistry;
use super::relationships;
use crate::config::MappingConfig;
use crate::core::{GraphId, OgmError, PropertyKind, Result, Value};
use crate::store::{EdgeUpsert, NodeRef, NodeUpsert};

type Bound = (EntityRef, Arc<TypeDescriptor>);

/// Write operations for one object graph. Node upserts come first; edges
/// address pending inserts by their position in `nodes`.
#[derive(Debug, Default)]
pub struct WriteSet {
    pub nodes: Vec<NodeUpsert>,
    pub edges: Vec<EdgeUpsert>,
    /// The instance behind each node upsert, for write-back.
    node_entities: Vec<Bound>,
    /// The relationship-property instance behind each edge upsert, if any.
    edge_carriers: Vec<Option<Bound>>,
    /// Hops from the root at which each node was written.
    node_depths: Vec<usize>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Node upserts carrying an optimistic-lock check.
    pub fn version_checks(&self) -> impl Iterator<Item = &NodeUpsert> {
        self.nodes
            .iter()
            .filter(|node| node.operation == WriteOperation::Update && node.expected_version.is_some())
    }

    /// Final id of every node upsert, given the ids the store returned for
    /// the inserts in request order.
    pub fn node_ids(&self, inserted: &[GraphId]) -> Result<Vec<GraphId>> {
        let mut returned = inserted.iter();
        let mut ids = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let id = match node.operation {
                WriteOperation::Insert => {
                    let generated = returned.next().ok_or_else(|| {
                        OgmError::Storage(format!(
                            "Store returned {} ids for {} inserts",
                            inserted.len(),
                            self.insert_count()
                        ))
                    })?;
                    node.id.clone().unwrap_or_else(|| generated.clone())
                }
                WriteOperation::Update => node.id.clone().ok_or_else(|| {
                    OgmError::Mapping(format!("Update of {} without an identifier", node.type_name))
                })?,
            };
            ids.push(id);
        }
        if returned.next().is_some() {
            return Err(OgmError::Storage(format!(
                "Store returned {} ids for {} inserts",
                inserted.len(),
                self.insert_count()
            )));
        }
        Ok(ids)
    }

    /// Edge upserts with every pending endpoint replaced by its final id.
    pub fn resolve_edges(&self, node_ids: &[GraphId]) -> Result<Vec<EdgeUpsert>> {
        let resolve = |endpoint: &NodeRef| -> Result<NodeRef> {
            match endpoint {
                NodeRef::Id(id) => Ok(NodeRef::Id(id.clone())),
                NodeRef::Pending(index) => node_ids
                    .get(*index)
                    .map(|id| NodeRef::Id(id.clone()))
                    .ok_or_else(|| {
                        OgmError::Storage(format!("No id was produced for pending node {}", index))
                    }),
            }
        };

        self.edges
            .iter()
            .map(|edge| {
                Ok(EdgeUpsert {
                    source: resolve(&edge.source)?,
                    target: resolve(&edge.target)?,
                    ..edge.clone()
                })
            })
            .collect()
    }

    /// Writes generated ids and new versions back into the node instances.
    pub fn apply_node_results(&self, node_ids: &[GraphId]) -> Result<()> {
        for ((node, (entity, descriptor)), id) in
            self.nodes.iter().zip(&self.node_entities).zip(node_ids)
        {
            let mut guard = entity.write()?;
            if node.operation == WriteOperation::Insert && node.id.is_none() {
                identity::apply_generated_id(descriptor, &mut *guard, id.clone())?;
            }
            if let Some(version) = node.version {
                identity::apply_version(descriptor, &mut *guard, version)?;
            }
        }
        Ok(())
    }

    /// Writes relationship ids back into relationship-property instances.
    pub fn apply_edge_results(&self, edge_ids: &[GraphId]) -> Result<()> {
        if edge_ids.len() != self.edges.len() {
            return Err(OgmError::Storage(format!(
                "Store returned {} relationship ids for {} relationships",
                edge_ids.len(),
                self.edges.len()
            )));
        }
        for (carrier, id) in self.edge_carriers.iter().zip(edge_ids) {
            let Some((entity, descriptor)) = carrier else {
                continue;
            };
            if descriptor.identifier.is_some() {
                let mut guard = entity.write()?;
                identity::apply_generated_id(descriptor, &mut *guard, id.clone())?;
            }
        }
        Ok(())
    }

    /// Updated nodes with their descriptor and distance from the root.
    pub fn updated_nodes(&self) -> impl Iterator<Item = (&GraphId, &Arc<TypeDescriptor>, usize)> {
        self.nodes
            .iter()
            .zip(&self.node_entities)
            .zip(&self.node_depths)
            .filter(|((node, _), _)| node.operation == WriteOperation::Update)
            .filter_map(|((node, (_, descriptor)), depth)| {
                node.id.as_ref().map(|id| (id, descriptor, *depth))
            })
    }

    fn insert_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.operation == WriteOperation::Insert)
            .count()
    }
}

/// Turns an object graph into a [`WriteSet`].
pub struct Serializer<'a> {
    registry: &'a MetadataRegistry,
    config: &'a MappingConfig,
}

impl<'a> Serializer<'a> {
    pub fn new(registry: &'a MetadataRegistry, config: &'a MappingConfig) -> Self {
        Self { registry, config }
    }

    /// Walks the graph depth-first from `root`, emitting one node upsert per
    /// distinct instance and one edge upsert per relationship.
    pub fn serialize(&self, descriptor: &Arc<TypeDescriptor>, root: &EntityRef) -> Result<WriteSet> {
        if descriptor.is_relationship_properties() {
            return Err(OgmError::Mapping(format!(
                "{} describes relationship properties; save the node that holds it",
                descriptor.name
            )));
        }

        let mut pass = SerializePass {
            registry: self.registry,
            config: self.config,
            visited: HashMap::new(),
            scheduled: HashSet::from([root.identity()]),
            stack: vec![(descriptor.clone(), root.clone(), 0)],
            drafts: Vec::new(),
            set: WriteSet::default(),
        };
        while let Some((descriptor, entity, depth)) = pass.stack.pop() {
            pass.visit(&descriptor, &entity, depth)?;
        }
        pass.finish()?;

        event!(
            Level::DEBUG,
            type_name = descriptor.name,
            nodes = pass.set.nodes.len(),
            edges = pass.set.edges.len(),
            "serialized object graph"
        );
        Ok(pass.set)
    }
}

/// Far end of an edge before every node of the set has an address.
enum Endpoint {
    Resolved(NodeRef),
    Scheduled(usize),
}

struct EdgeDraft {
    id: Option<GraphId>,
    id_kind: PropertyKind,
    edge_type: String,
    source: NodeRef,
    target: Endpoint,
    properties: BTreeMap<String, Value>,
}

struct SerializePass<'a> {
    registry: &'a MetadataRegistry,
    config: &'a MappingConfig,
    /// Instance identity to its address in the write set.
    visited: HashMap<usize, NodeRef>,
    /// Instances already pushed onto `stack`.
    scheduled: HashSet<usize>,
    stack: Vec<(Arc<TypeDescriptor>, EntityRef, usize)>,
    drafts: Vec<EdgeDraft>,
    set: WriteSet,
}

impl SerializePass<'_> {
    fn visit(&mut self, descriptor: &Arc<TypeDescriptor>, entity: &EntityRef, depth: usize) -> Result<()> {
        if self.visited.contains_key(&entity.identity()) {
            return Ok(());
        }
        if entity.type_id() != descriptor.type_id {
            return Err(OgmError::Mapping(format!(
                "Expected an instance of {}, found {}",
                descriptor.name,
                entity.type_name()
            )));
        }

        let (decision, properties, values) = {
            let guard = entity.read()?;
            let decision = identity::resolve_for_write(descriptor, &*guard)?;
            let properties = descriptor.read_properties(&*guard)?;
            let values = descriptor
                .relationships
                .iter()
                .map(|relationship| {
                    guard.relationship(&relationship.field).ok_or_else(|| {
                        OgmError::Mapping(format!(
                            "{} does not expose relationship field '{}'",
                            descriptor.name, relationship.field
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            (decision, properties, values)
        };

        let index = self.set.nodes.len();
        let node_ref = match &decision.id {
            Some(id) => NodeRef::Id(id.clone()),
            None => NodeRef::Pending(index),
        };
        let version = match (&descriptor.version_field, decision.operation) {
            (None, _) => None,
            (Some(_), WriteOperation::Insert) => Some(self.config.initial_version),
            (Some(_), WriteOperation::Update) => decision.expected_version.map(|v| v + 1),
        };
        let id_kind = descriptor
            .identifier
            .as_ref()
            .map(|identifier| identifier.strategy.kind())
            .unwrap_or(PropertyKind::Integer);

        self.set.nodes.push(NodeUpsert {
            operation: decision.operation,
            id: decision.id,
            id_kind,
            type_name: descriptor.name.to_string(),
            labels: vec![descriptor.label.to_string()],
            version,
            expected_version: decision.expected_version,
            properties,
        });
        self.set.node_entities.push((entity.clone(), descriptor.clone()));
        self.set.node_depths.push(depth);
        self.visited.insert(entity.identity(), node_ref.clone());

        let mut children = Vec::new();
        for (relationship, value) in descriptor.relationships.iter().zip(values) {
            if value.is_empty() {
                continue;
            }
            let tuples = relationships::flatten(self.registry, relationship, value)?;
            let endpoint = relationship
                .endpoint(self.registry)?
                .describe(self.registry)?;

            for tuple in tuples {
                let target = self.reference(
                    descriptor,
                    relationship,
                    &endpoint,
                    &tuple.target,
                    depth + 1,
                    &mut children,
                )?;
                let id_kind = tuple
                    .carrier
                    .as_ref()
                    .and_then(|(_, carrier)| carrier.identifier.as_ref())
                    .map(|identifier| identifier.strategy.kind())
                    .unwrap_or(PropertyKind::Integer);
                self.drafts.push(EdgeDraft {
                    id: tuple.edge_id,
                    id_kind,
                    edge_type: tuple.edge_type,
                    source: node_ref.clone(),
                    target,
                    properties: tuple.properties.unwrap_or_default(),
                });
                self.set.edge_carriers.push(tuple.carrier);
            }
        }
        // Reversed so the first relationship target is written next.
        self.stack.extend(children.into_iter().rev());
        Ok(())
    }

    /// Address of a relationship target: written as part of this set while
    /// within the depth limit, referenced by its id beyond it.
    fn reference(
        &mut self,
        source: &TypeDescriptor,
        relationship: &RelationshipDescriptor,
        endpoint: &Arc<TypeDescriptor>,
        target: &EntityRef,
        depth: usize,
        children: &mut Vec<(Arc<TypeDescriptor>, EntityRef, usize)>,
    ) -> Result<Endpoint> {
        let key = target.identity();
        if let Some(node) = self.visited.get(&key) {
            return Ok(Endpoint::Resolved(node.clone()));
        }
        if self.scheduled.contains(&key) {
            return Ok(Endpoint::Scheduled(key));
        }
        if self.config.max_write_depth.is_none_or(|max| depth <= max) {
            self.scheduled.insert(key);
            children.push((endpoint.clone(), target.clone(), depth));
            return Ok(Endpoint::Scheduled(key));
        }

        let id = {
            let guard = target.read()?;
            identity::read_id(endpoint, &*guard)?
        };
        id.map(|id| Endpoint::Resolved(NodeRef::Id(id)))
            .ok_or_else(|| OgmError::UnresolvedReference {
                source_type: source.name.to_string(),
                field: relationship.field.clone(),
                target_type: endpoint.name.to_string(),
            })
    }

    /// Moves the drafted edges into the set once every target has an address.
    fn finish(&mut self) -> Result<()> {
        for draft in std::mem::take(&mut self.drafts) {
            let target = match draft.target {
                Endpoint::Resolved(node) => node,
                Endpoint::Scheduled(key) => self.visited.get(&key).cloned().ok_or_else(|| {
                    OgmError::Mapping(format!(
                        "Relationship {} points at an unwritten node",
                        draft.edge_type
                    ))
                })?,
            };
            self.set.edges.push(EdgeUpsert {
                id: draft.id,
                id_kind: draft.id_kind,
                edge_type: draft.edge_type,
                source: draft.source,
                target,
                properties: draft.properties,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphEntity;
    use crate::mapping::Ref;

    #[derive(Debug, Default, GraphEntity)]
    #[graph(node)]
    struct Task {
        #[graph(id(generated))]
        id: Option<i64>,
        #[graph(version)]
        version: Option<i64>,
        title: String,
        #[graph(relationship(type = "BLOCKS"))]
        blocks: Vec<Ref<Task>>,
    }

    fn task(title: &str) -> Ref<Task> {
        Ref::new(Task {
            title: title.to_string(),
            ..Task::default()
        })
    }

    fn serialize(config: &MappingConfig, root: &Ref<Task>) -> Result<WriteSet> {
        let registry = MetadataRegistry::new();
        let descriptor = registry.describe::<Task>()?;
        Serializer::new(&registry, config).serialize(&descriptor, &root.erase())
    }

    #[test]
    fn test_new_graph_uses_pending_addresses() {
        let root = task("root");
        let child = task("child");
        root.write().unwrap().blocks.push(child.clone());

        let set = serialize(&MappingConfig::new(), &root).unwrap();

        assert_eq!(set.nodes.len(), 2);
        assert!(set.nodes.iter().all(|node| node.operation == WriteOperation::Insert));
        assert!(set.nodes.iter().all(|node| node.version == Some(0)));
        assert_eq!(set.edges.len(), 1);
        assert_eq!(set.edges[0].source, NodeRef::Pending(0));
        assert_eq!(set.edges[0].target, NodeRef::Pending(1));

        let ids = set
            .node_ids(&[GraphId::Integer(10), GraphId::Integer(11)])
            .unwrap();
        let edges = set.resolve_edges(&ids).unwrap();
        assert_eq!(edges[0].target, NodeRef::Id(GraphId::Integer(11)));

        set.apply_node_results(&ids).unwrap();
        assert_eq!(child.read().unwrap().id, Some(11));
        assert_eq!(child.read().unwrap().version, Some(0));
    }

    #[test]
    fn test_update_expects_held_version() {
        let root = task("root");
        {
            let mut guard = root.write().unwrap();
            guard.id = Some(4);
            guard.version = Some(2);
        }

        let set = serialize(&MappingConfig::new(), &root).unwrap();
        let node = &set.nodes[0];
        assert_eq!(node.operation, WriteOperation::Update);
        assert_eq!(node.expected_version, Some(2));
        assert_eq!(node.version, Some(3));
        assert_eq!(set.version_checks().count(), 1);
    }

    #[test]
    fn test_depth_limit_references_by_id() {
        let root = task("root");
        let stored = task("stored");
        stored.write().unwrap().id = Some(7);
        stored.write().unwrap().version = Some(0);
        root.write().unwrap().blocks.push(stored);

        let set = serialize(&MappingConfig::new().max_write_depth(0), &root).unwrap();
        assert_eq!(set.nodes.len(), 1);
        assert_eq!(set.edges[0].target, NodeRef::Id(GraphId::Integer(7)));

        root.write().unwrap().blocks.push(task("unsaved"));
        let err = serialize(&MappingConfig::new().max_write_depth(0), &root).unwrap_err();
        assert!(matches!(
            err,
            OgmError::UnresolvedReference { ref field, .. } if field == "blocks"
        ));
    }

    #[test]
    fn test_long_chain_is_written_without_recursion() {
        let root = task("0");
        let mut tail = root.clone();
        for n in 1..10_000 {
            let next = task(&n.to_string());
            tail.write().unwrap().blocks.push(next.clone());
            tail = next;
        }

        let set = serialize(&MappingConfig::new(), &root).unwrap();
        assert_eq!(set.nodes.len(), 10_000);
        assert_eq!(set.edges.len(), 9_999);
        assert_eq!(set.edges[0].target, NodeRef::Pending(1));
        assert_eq!(set.edges[9_998].target, NodeRef::Pending(9_999));
        assert_eq!(set.updated_nodes().count(), 0);

        // Unlink so dropping the chain stays shallow too.
        let mut cursor = Some(root);
        while let Some(node) = cursor {
            cursor = node.write().unwrap().blocks.pop();
        }
    }

    #[test]
    fn test_shared_target_is_written_once() {
        let root = task("root");
        let left = task("left");
        let right = task("right");
        let shared = task("shared");
        left.write().unwrap().blocks.push(shared.clone());
        right.write().unwrap().blocks.push(shared.clone());
        root.write().unwrap().blocks.extend([left, right]);

        let set = serialize(&MappingConfig::new(), &root).unwrap();
        assert_eq!(set.nodes.len(), 4);
        let titles: Vec<_> = set
            .nodes
            .iter()
            .map(|node| node.properties["title"].clone())
            .collect();
        assert_eq!(
            titles,
            ["root", "left", "shared", "right"].map(Value::from)
        );
        let into_shared: Vec<_> = set
            .edges
            .iter()
            .filter(|edge| edge.target == NodeRef::Pending(2))
            .collect();
        assert_eq!(into_shared.len(), 2);
    }

    #[test]
    fn test_store_id_count_is_checked() {
        let set = serialize(&MappingConfig::new(), &task("solo")).unwrap();
        assert!(set.node_ids(&[]).is_err());
        assert!(
            set.node_ids(&[GraphId::Integer(1), GraphId::Integer(2)])
                .is_err()
        );
    }
}
