use std::collections::{BTreeMap, HashMap};

use super::descriptor::Cardinality;
use super::entity::{EntityRef, GraphType, Ref};
use crate::core::{OgmError, Result};

/// In-memory shape of a relationship field, erased to [`EntityRef`]s.
///
/// Keyed variants use the key as the relationship type. `BTreeMap` keeps the
/// key order stable across runs.
#[derive(Debug, Clone)]
pub enum RelationshipValue {
    Single(Option<EntityRef>),
    Collection(Vec<EntityRef>),
    DynamicSingle(BTreeMap<String, EntityRef>),
    DynamicCollection(BTreeMap<String, Vec<EntityRef>>),
}

impl RelationshipValue {
    pub fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::Single => Self::Single(None),
            Cardinality::Collection => Self::Collection(Vec::new()),
            Cardinality::DynamicGroupedSingle => Self::DynamicSingle(BTreeMap::new()),
            Cardinality::DynamicGroupedCollection => Self::DynamicCollection(BTreeMap::new()),
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            Self::Single(_) => Cardinality::Single,
            Self::Collection(_) => Cardinality::Collection,
            Self::DynamicSingle(_) => Cardinality::DynamicGroupedSingle,
            Self::DynamicCollection(_) => Cardinality::DynamicGroupedCollection,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(target) => usize::from(target.is_some()),
            Self::Collection(targets) => targets.len(),
            Self::DynamicSingle(targets) => targets.len(),
            Self::DynamicCollection(groups) => groups.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait for Rust field types that hold a relationship.
///
/// The implementing type fixes the cardinality, so a field can never switch
/// between a single target and a collection at runtime.
pub trait RelationshipField: Sized + Send + Sync + 'static {
    type Target: GraphType;

    fn cardinality() -> Cardinality;
    fn to_relationship(&self) -> RelationshipValue;
    fn from_relationship(value: RelationshipValue) -> Result<Self>;
}

fn shape_mismatch(expected: Cardinality, found: &RelationshipValue) -> OgmError {
    OgmError::Mapping(format!(
        "Relationship field expects {:?}, got {:?}",
        expected,
        found.cardinality()
    ))
}

fn typed_all<T: GraphType>(targets: Vec<EntityRef>) -> Result<Vec<Ref<T>>> {
    targets.iter().map(Ref::from_entity).collect()
}

impl<T: GraphType> RelationshipField for Option<Ref<T>> {
    type Target = T;

    fn cardinality() -> Cardinality {
        Cardinality::Single
    }

    fn to_relationship(&self) -> RelationshipValue {
        RelationshipValue::Single(self.as_ref().map(Ref::erase))
    }

    fn from_relationship(value: RelationshipValue) -> Result<Self> {
        match value {
            RelationshipValue::Single(target) => target.as_ref().map(Ref::from_entity).transpose(),
            other => Err(shape_mismatch(Self::cardinality(), &other)),
        }
    }
}

impl<T: GraphType> RelationshipField for Vec<Ref<T>> {
    type Target = T;

    fn cardinality() -> Cardinality {
        Cardinality::Collection
    }

    fn to_relationship(&self) -> RelationshipValue {
        RelationshipValue::Collection(self.iter().map(Ref::erase).collect())
    }

    fn from_relationship(value: RelationshipValue) -> Result<Self> {
        match value {
            RelationshipValue::Collection(targets) => typed_all(targets),
            other => Err(shape_mismatch(Self::cardinality(), &other)),
        }
    }
}

impl<T: GraphType> RelationshipField for BTreeMap<String, Ref<T>> {
    type Target = T;

    fn cardinality() -> Cardinality {
        Cardinality::DynamicGroupedSingle
    }

    fn to_relationship(&self) -> RelationshipValue {
        RelationshipValue::DynamicSingle(
            self.iter()
                .map(|(key, target)| (key.clone(), target.erase()))
                .collect(),
        )
    }

    fn from_relationship(value: RelationshipValue) -> Result<Self> {
        match value {
            RelationshipValue::DynamicSingle(targets) => targets
                .into_iter()
                .map(|(key, target)| Ok((key, Ref::from_entity(&target)?)))
                .collect(),
            other => Err(shape_mismatch(Self::cardinality(), &other)),
        }
    }
}

impl<T: GraphType> RelationshipField for BTreeMap<String, Vec<Ref<T>>> {
    type Target = T;

    fn cardinality() -> Cardinality {
        Cardinality::DynamicGroupedCollection
    }

    fn to_relationship(&self) -> RelationshipValue {
        RelationshipValue::DynamicCollection(
            self.iter()
                .map(|(key, targets)| (key.clone(), targets.iter().map(Ref::erase).collect()))
                .collect(),
        )
    }

    fn from_relationship(value: RelationshipValue) -> Result<Self> {
        match value {
            RelationshipValue::DynamicCollection(groups) => groups
                .into_iter()
                .map(|(key, targets)| Ok((key, typed_all(targets)?)))
                .collect(),
            other => Err(shape_mismatch(Self::cardinality(), &other)),
        }
    }
}

impl<T: GraphType> RelationshipField for HashMap<String, Ref<T>> {
    type Target = T;

    fn cardinality() -> Cardinality {
        Cardinality::DynamicGroupedSingle
    }

    fn to_relationship(&self) -> RelationshipValue {
        RelationshipValue::DynamicSingle(
            self.iter()
                .map(|(key, target)| (key.clone(), target.erase()))
                .collect(),
        )
    }

    fn from_relationship(value: RelationshipValue) -> Result<Self> {
        BTreeMap::<String, Ref<T>>::from_relationship(value).map(|map| map.into_iter().collect())
    }
}

impl<T: GraphType> RelationshipField for HashMap<String, Vec<Ref<T>>> {
    type Target = T;

    fn cardinality() -> Cardinality {
        Cardinality::DynamicGroupedCollection
    }

    fn to_relationship(&self) -> RelationshipValue {
        RelationshipValue::DynamicCollection(
            self.iter()
                .map(|(key, targets)| (key.clone(), targets.iter().map(Ref::erase).collect()))
                .collect(),
        )
    }

    fn from_relationship(value: RelationshipValue) -> Result<Self> {
        BTreeMap::<String, Vec<Ref<T>>>::from_relationship(value)
            .map(|map| map.into_iter().collect())
    }
}
