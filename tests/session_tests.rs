/// Session tests
///
/// Save/load through the in-memory store: identifier write-back, optimistic
/// locking, relationship persistence and concurrent writers.
/// Run with: cargo test --test session_tests
mod fixtures;

use fixtures::*;
use futures::future::join_all;
use async_trait::async_trait;
use graphmodel::{
    EdgeUpsert, ErrorKind, GraphEntity, GraphId, GraphSession, GraphStore, InMemoryGraphStore,
    MappingConfig, NodeUpsert, OgmError, RawEdge, RawNode, Ref, Result, Value,
};
use std::sync::Arc;
use tokio::sync::Barrier;
use uuid::Uuid;

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
struct Document {
    #[graph(id(generated))]
    id: Option<Uuid>,
    title: String,
}

fn session() -> (InMemoryGraphStore, GraphSession<InMemoryGraphStore>) {
    let store = InMemoryGraphStore::new();
    (store.clone(), GraphSession::new(store))
}

/// Store whose compare-and-set refuses to move a version backwards.
struct ForwardOnlyStore {
    inner: InMemoryGraphStore,
}

#[async_trait]
impl GraphStore for ForwardOnlyStore {
    async fn read_node(&self, id: &GraphId) -> Result<Option<RawNode>> {
        self.inner.read_node(id).await
    }

    async fn read_adjacent_edges(&self, id: &GraphId) -> Result<Vec<RawEdge>> {
        self.inner.read_adjacent_edges(id).await
    }

    async fn write_nodes(&self, nodes: &[NodeUpsert]) -> Result<Vec<GraphId>> {
        self.inner.write_nodes(nodes).await
    }

    async fn write_edges(&self, edges: &[EdgeUpsert]) -> Result<Vec<GraphId>> {
        self.inner.write_edges(edges).await
    }

    async fn delete_edges(&self, ids: &[GraphId]) -> Result<()> {
        self.inner.delete_edges(ids).await
    }

    async fn compare_and_set_version(&self, id: &GraphId, expected: i64, new: i64) -> Result<bool> {
        if new < expected {
            return Err(OgmError::Storage(format!("version of {} cannot go back", id)));
        }
        self.inner.compare_and_set_version(id, expected, new).await
    }
}

#[tokio::test]
async fn test_generated_identifier_is_written_back() {
    let (store, session) = session();
    let container = Ref::new(VersionedGeneratedContainer::default());
    container.write().unwrap().base.tagged.known_property = Some("known".to_string());

    session.save(&container).await.unwrap();

    let id = container.read().unwrap().base.id.expect("id written back");
    assert_eq!(container.read().unwrap().version, Some(0));

    let stored = store.read_node(&GraphId::Integer(id)).await.unwrap().unwrap();
    assert!(stored.has_label("VersionedGeneratedContainer"));
    assert_eq!(stored.version, Some(0));
    assert_eq!(stored.properties["knownProperty"], Value::from("known"));
    assert!(!stored.properties.contains_key("id"));
}

#[tokio::test]
async fn test_generated_uuid_identifier() {
    let (store, session) = session();
    let document = Ref::new(Document {
        title: "Notes".to_string(),
        ..Document::default()
    });

    session.save(&document).await.unwrap();

    let id = document.read().unwrap().id.expect("uuid written back");
    let stored = store.read_node(&GraphId::Uuid(id)).await.unwrap().unwrap();
    assert_eq!(stored.properties["title"], Value::from("Notes"));
}

#[tokio::test]
async fn test_unset_assigned_identifier_writes_nothing() {
    let (store, session) = session();
    let container = Ref::new(AssignedContainer::default());

    let err = session.save(&container).await.unwrap_err();

    assert!(matches!(err, OgmError::UnsetAssignedId { .. }));
    assert_eq!(err.kind(), ErrorKind::Mapping);
    assert_eq!(store.node_count().await, 0);
}

#[tokio::test]
async fn test_assigned_identifier_insert_then_update() {
    let (store, session) = session();
    let container = Ref::new(VersionedAssignedContainer::default());
    container.write().unwrap().base.id = Some("c-1".to_string());

    session.save(&container).await.unwrap();
    assert_eq!(container.read().unwrap().version, Some(0));

    container.write().unwrap().base.tagged.known_property = Some("changed".to_string());
    session.save(&container).await.unwrap();
    assert_eq!(container.read().unwrap().version, Some(1));

    let stored = store.read_node(&GraphId::from("c-1")).await.unwrap().unwrap();
    assert_eq!(stored.version, Some(1));
    assert_eq!(stored.properties["knownProperty"], Value::from("changed"));
    assert_eq!(store.node_count().await, 1);
}

#[tokio::test]
async fn test_version_conflict() {
    let (store, session) = session();
    store
        .insert_node(RawNode::new(7, "Human").with_version(2).with_property("name", "Ada"))
        .await;

    let stale = Ref::new(Person {
        id: Some(7),
        version: Some(1),
        name: "Stale".to_string(),
        ..Person::default()
    });
    let err = session.save(&stale).await.unwrap_err();
    assert_eq!(
        err,
        OgmError::OptimisticLock {
            type_name: "Person".to_string(),
            id: "7".to_string(),
            expected: 1,
            actual: Some(2),
        }
    );
    assert!(err.is_retryable());
    assert_eq!(stale.read().unwrap().version, Some(1));

    let current = Ref::new(Person {
        id: Some(7),
        version: Some(2),
        name: "Current".to_string(),
        ..Person::default()
    });
    session.save(&current).await.unwrap();

    let stored = store.read_node(&GraphId::Integer(7)).await.unwrap().unwrap();
    assert_eq!(stored.version, Some(3));
    assert_eq!(stored.properties["name"], Value::from("Current"));
    assert_eq!(current.read().unwrap().version, Some(3));
}

#[tokio::test]
async fn test_conflict_moves_earlier_versions_back() {
    let (store, session) = session();
    let a = Person::named("A");
    let b = Person::named("B");
    a.write().unwrap().manages.push(b.clone());
    session.save(&a).await.unwrap();

    let b_id = b.read().unwrap().id.unwrap();
    let other = session.load::<Person>(b_id).await.unwrap().unwrap();
    session.save(&other).await.unwrap();

    let err = session.save(&a).await.unwrap_err();
    assert!(matches!(
        err,
        OgmError::OptimisticLock { expected: 0, actual: Some(1), .. }
    ));

    let a_id = a.read().unwrap().id.unwrap();
    let stored_a = store.read_node(&GraphId::Integer(a_id)).await.unwrap().unwrap();
    assert_eq!(stored_a.version, Some(0));
}

#[tokio::test]
async fn test_conflict_survives_failed_version_restore() {
    let store = InMemoryGraphStore::new();
    let session = GraphSession::new(ForwardOnlyStore {
        inner: store.clone(),
    });
    let a = Person::named("A");
    let b = Person::named("B");
    a.write().unwrap().manages.push(b.clone());
    session.save(&a).await.unwrap();

    let b_id = b.read().unwrap().id.unwrap();
    let other = session.load::<Person>(b_id).await.unwrap().unwrap();
    session.save(&other).await.unwrap();

    let err = session.save(&a).await.unwrap_err();
    assert!(matches!(
        err,
        OgmError::OptimisticLock { expected: 0, actual: Some(1), .. }
    ));

    let a_id = a.read().unwrap().id.unwrap();
    let stored_a = store.read_node(&GraphId::Integer(a_id)).await.unwrap().unwrap();
    assert_eq!(stored_a.version, Some(1));
    assert_eq!(a.read().unwrap().version, Some(0));
}

#[tokio::test]
async fn test_node_write_failure_restores_versions() {
    let (store, session) = session();
    let ada = Person::named("Ada");
    session.save(&ada).await.unwrap();
    let id = GraphId::Integer(ada.read().unwrap().id.unwrap());

    store.fail_node_writes(true).await;
    ada.write().unwrap().name = "Ada L.".to_string();
    let err = session.save(&ada).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    let stored = store.read_node(&id).await.unwrap().unwrap();
    assert_eq!(stored.version, Some(0));
    assert_eq!(stored.properties["name"], Value::from("Ada"));
    assert_eq!(ada.read().unwrap().version, Some(0));

    store.fail_node_writes(false).await;
    session.save(&ada).await.unwrap();
    let stored = store.read_node(&id).await.unwrap().unwrap();
    assert_eq!(stored.version, Some(1));
    assert_eq!(stored.properties["name"], Value::from("Ada L."));
}

#[tokio::test]
async fn test_generated_identifier_skips_stored_ids() {
    let (store, session) = session();
    store
        .insert_node(RawNode::new(1, "Human").with_version(0).with_property("name", "Existing"))
        .await;

    let newcomer = Person::named("New");
    session.save(&newcomer).await.unwrap();

    assert_eq!(newcomer.read().unwrap().id, Some(2));
    assert_eq!(store.node_count().await, 2);
    let existing = session.load::<Person>(1).await.unwrap().unwrap();
    assert_eq!(existing.read().unwrap().name, "Existing");
}

#[tokio::test]
async fn test_round_trip() {
    let (_store, session) = session();
    let ada = Person::named("Ada");
    let bob = Person::named("Bob");
    let cy = Person::named("Cy");
    let acme = company("acme", "Acme");
    {
        let mut guard = ada.write().unwrap();
        guard.age = Some(36);
        guard.manages.push(bob.clone());
        guard
            .contacts
            .insert("KNOWS".to_string(), vec![bob.clone(), cy.clone()]);
        guard.employers.insert("WORKS_AT".to_string(), acme.clone());
        guard.scratch.push("not persisted".to_string());
    }

    session.save(&ada).await.unwrap();
    let id = ada.read().unwrap().id.unwrap();

    let loaded = session.load::<Person>(id).await.unwrap().unwrap();
    let loaded = loaded.read().unwrap();

    assert_eq!(loaded.name, "Ada");
    assert_eq!(loaded.age, Some(36));
    assert_eq!(loaded.version, Some(0));
    assert!(loaded.scratch.is_empty());

    assert_eq!(loaded.manages.len(), 1);
    assert_eq!(loaded.manages[0].read().unwrap().name, "Bob");
    assert_eq!(loaded.manages[0].read().unwrap().id, bob.read().unwrap().id);

    let known = loaded.contacts["KNOWS"]
        .iter()
        .map(|person| person.read().unwrap().name.clone())
        .collect::<Vec<_>>();
    assert_eq!(known, vec!["Bob", "Cy"]);
    assert!(loaded.contacts["KNOWS"][0].ptr_eq(&loaded.manages[0]));

    let employer = loaded.employers["WORKS_AT"].read().unwrap();
    assert_eq!(employer.code.as_deref(), Some("acme"));
    assert_eq!(employer.name, "Acme");
}

#[tokio::test]
async fn test_load_missing_node() {
    let (_store, session) = session();
    assert!(session.load::<Person>(404).await.unwrap().is_none());
}

#[tokio::test]
async fn test_load_depth_limit() {
    let store = InMemoryGraphStore::new();
    let session = GraphSession::new(store.clone());
    let a = Person::named("A");
    let b = Person::named("B");
    let c = Person::named("C");
    a.write().unwrap().manages.push(b.clone());
    b.write().unwrap().manages.push(c.clone());
    session.save(&a).await.unwrap();
    let id = a.read().unwrap().id.unwrap();

    let shallow = GraphSession::new(store).with_config(MappingConfig::new().max_load_depth(1));
    let loaded = shallow.load::<Person>(id).await.unwrap().unwrap();
    let first = loaded.read().unwrap().manages[0].clone();

    assert_eq!(first.read().unwrap().name, "B");
    assert!(first.read().unwrap().manages.is_empty());

    let full = session.load::<Person>(id).await.unwrap().unwrap();
    let first = full.read().unwrap().manages[0].clone();
    assert_eq!(first.read().unwrap().manages.len(), 1);
}

#[tokio::test]
async fn test_resave_does_not_duplicate_relationships() {
    let (store, session) = session();
    let ada = Person::named("Ada");
    ada.write().unwrap().manages.push(Person::named("Bob"));

    session.save(&ada).await.unwrap();
    session.save(&ada).await.unwrap();

    assert_eq!(store.node_count().await, 2);
    assert_eq!(store.edge_count().await, 1);
    assert_eq!(ada.read().unwrap().version, Some(1));
}

#[tokio::test]
async fn test_removed_relationship_is_deleted() {
    let (store, session) = session();
    let ada = Person::named("Ada");
    ada.write().unwrap().manages.push(Person::named("Bob"));
    session.save(&ada).await.unwrap();
    assert_eq!(store.edge_count().await, 1);

    ada.write().unwrap().manages.clear();
    session.save(&ada).await.unwrap();

    let id = ada.read().unwrap().id.unwrap();
    let loaded = session.load::<Person>(id).await.unwrap().unwrap();
    assert!(loaded.read().unwrap().manages.is_empty());
    assert_eq!(store.edge_count().await, 0);
    assert_eq!(store.node_count().await, 2);
}

#[tokio::test]
async fn test_unmapped_relationships_are_kept() {
    let (store, session) = session();
    let ada = Person::named("Ada");
    session.save(&ada).await.unwrap();
    let id = ada.read().unwrap().id.unwrap();
    store.insert_node(RawNode::new(50, "Gadget")).await;
    store.insert_edge(RawEdge::new(id, "OWNS", 50).with_id(51)).await;

    ada.write().unwrap().name = "Ada L.".to_string();
    session.save(&ada).await.unwrap();

    let edges = store.edges().await;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].edge_type, "OWNS");
}

#[tokio::test]
async fn test_depth_limited_load_keeps_frontier_relationships() {
    let store = InMemoryGraphStore::new();
    let session = GraphSession::new(store.clone());
    let a = Person::named("A");
    let b = Person::named("B");
    a.write().unwrap().manages.push(b.clone());
    b.write().unwrap().manages.push(Person::named("C"));
    session.save(&a).await.unwrap();
    let id = a.read().unwrap().id.unwrap();

    let shallow =
        GraphSession::new(store.clone()).with_config(MappingConfig::new().max_load_depth(1));
    let loaded = shallow.load::<Person>(id).await.unwrap().unwrap();
    shallow.save(&loaded).await.unwrap();

    assert_eq!(store.edge_count().await, 2);
    let full = session.load::<Person>(id).await.unwrap().unwrap();
    let first = full.read().unwrap().manages[0].clone();
    assert_eq!(first.read().unwrap().manages.len(), 1);
}

#[tokio::test]
async fn test_relationship_properties_round_trip() {
    let (store, session) = session();
    let target = Ref::new(Target::default());
    let weighted = Weighted::to(&target, "k");
    weighted.write().unwrap().weight = Some(0.5);
    let source = Ref::new(Source {
        weighted: Some(weighted.clone()),
        ..Source::default()
    });

    session.save(&source).await.unwrap();
    let edge_id = weighted.read().unwrap().id.expect("relationship id written back");

    let edges = store.edges().await;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].id, Some(GraphId::Integer(edge_id)));
    assert_eq!(
        edges[0].target,
        GraphId::Integer(target.read().unwrap().id.unwrap())
    );

    weighted.write().unwrap().weight = Some(0.9);
    session.save(&source).await.unwrap();
    assert_eq!(store.edge_count().await, 1);

    let source_id = source.read().unwrap().id.unwrap();
    let loaded = session.load::<Source>(source_id).await.unwrap().unwrap();
    let loaded = loaded.read().unwrap();
    let relationship = loaded.weighted.as_ref().unwrap().read().unwrap();

    assert_eq!(relationship.id, Some(edge_id));
    assert_eq!(relationship.weight, Some(0.9));
    assert_eq!(relationship.tagged.known_property.as_deref(), Some("k"));
    assert_eq!(
        relationship.target.as_ref().unwrap().read().unwrap().id,
        target.read().unwrap().id
    );
}

#[tokio::test]
async fn test_dynamic_relationship_properties_round_trip() {
    let (_store, session) = session();
    let first = Ref::new(Target::default());
    let second = Ref::new(Target::default());

    let grouped = Ref::new(GroupedSource::default());
    grouped.write().unwrap().rels.insert(
        "KNOWS".to_string(),
        vec![Weighted::to(&first, "a"), Weighted::to(&second, "b")],
    );
    let keyed = Ref::new(KeyedSource::default());
    keyed
        .write()
        .unwrap()
        .rels
        .insert("WORKS_AT".to_string(), Weighted::to(&first, "c"));

    session.save(&grouped).await.unwrap();
    session.save(&keyed).await.unwrap();

    let grouped_id = grouped.read().unwrap().id.unwrap();
    let loaded = session.load::<GroupedSource>(grouped_id).await.unwrap().unwrap();
    let known = loaded
        .read()
        .unwrap()
        .rels["KNOWS"]
        .iter()
        .map(|rel| rel.read().unwrap().tagged.known_property.clone())
        .collect::<Vec<_>>();
    assert_eq!(known, vec![Some("a".to_string()), Some("b".to_string())]);

    let keyed_id = keyed.read().unwrap().id.unwrap();
    let loaded = session.load::<KeyedSource>(keyed_id).await.unwrap().unwrap();
    let loaded = loaded.read().unwrap();
    assert_eq!(loaded.rels.len(), 1);
    let works_at = loaded.rels["WORKS_AT"].read().unwrap();
    assert_eq!(
        works_at.target.as_ref().unwrap().read().unwrap().id,
        first.read().unwrap().id
    );
}

#[tokio::test]
async fn test_edge_write_failure_is_reported() {
    let (store, session) = session();
    store.fail_edge_writes(true).await;
    let ada = Person::named("Ada");
    ada.write().unwrap().manages.push(Person::named("Bob"));

    let err = session.save(&ada).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(store.edge_count().await, 0);
    assert_eq!(store.node_count().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_writers_one_wins() {
    let (store, session) = session();
    let ada = Person::named("Ada");
    session.save(&ada).await.unwrap();
    let id = ada.read().unwrap().id.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = vec![];
    for age in 0..2 {
        let session = session.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            let copy = session.load::<Person>(id).await.unwrap().unwrap();
            copy.write().unwrap().age = Some(age);
            barrier.wait().await;
            session.save(&copy).await
        }));
    }

    let results = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect::<Vec<_>>();

    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|result| {
            matches!(result, Err(err) if err.kind() == ErrorKind::OptimisticLock)
        })
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(conflicts, 1);

    let stored = store.read_node(&GraphId::Integer(id)).await.unwrap().unwrap();
    assert_eq!(stored.version, Some(1));
}
