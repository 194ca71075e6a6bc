use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Level, event};

use super::descriptor::{Cardinality, EdgeType, RelationshipDescriptor, TypeDescriptor};
use super::entity::EntityRef;
use super::fields::RelationshipValue;
use super::identity;
use super::registry::MetadataRegistry;
use crate::core::{GraphId, OgmError, Result, Value};
use crate::store::{GraphRecord, RawEdge, RawNode};

/// One relationship to persist, produced from a relationship field.
#[derive(Debug, Clone)]
pub struct RelationshipTuple {
    pub edge_type: String,
    /// The endpoint node.
    pub target: EntityRef,
    /// Present when the field holds relationship-property instances.
    pub properties: Option<BTreeMap<String, Value>>,
    pub edge_id: Option<GraphId>,
    /// The relationship-property instance the tuple was read from.
    pub carrier: Option<(EntityRef, Arc<TypeDescriptor>)>,
}

/// Expands a relationship field value into one tuple per relationship.
pub fn flatten(
    registry: &MetadataRegistry,
    relationship: &RelationshipDescriptor,
    value: RelationshipValue,
) -> Result<Vec<RelationshipTuple>> {
    if value.cardinality() != relationship.cardinality {
        return Err(OgmError::Mapping(format!(
            "Field '{}' is declared {:?} but holds {:?}",
            relationship.field,
            relationship.cardinality,
            value.cardinality()
        )));
    }

    let fixed = |key: Option<String>| -> Result<String> {
        match (&relationship.edge_type, key) {
            (EdgeType::Fixed(label), _) => Ok(label.clone()),
            (EdgeType::Dynamic, Some(key)) if !key.trim().is_empty() => Ok(key),
            (EdgeType::Dynamic, _) => Err(OgmError::Mapping(format!(
                "Dynamic relationship field '{}' holds an empty relationship type key",
                relationship.field
            ))),
        }
    };

    let mut keyed = Vec::new();
    match value {
        RelationshipValue::Single(target) => {
            if let Some(target) = target {
                keyed.push((fixed(None)?, target));
            }
        }
        RelationshipValue::Collection(targets) => {
            let edge_type = fixed(None)?;
            keyed.extend(targets.into_iter().map(|target| (edge_type.clone(), target)));
        }
        RelationshipValue::DynamicSingle(targets) => {
            for (key, target) in targets {
                keyed.push((fixed(Some(key))?, target));
            }
        }
        RelationshipValue::DynamicCollection(groups) => {
            for (key, targets) in groups {
                let edge_type = fixed(Some(key))?;
                keyed.extend(targets.into_iter().map(|target| (edge_type.clone(), target)));
            }
        }
    }

    if !relationship.has_properties {
        return Ok(keyed
            .into_iter()
            .map(|(edge_type, target)| RelationshipTuple {
                edge_type,
                target,
                properties: None,
                edge_id: None,
                carrier: None,
            })
            .collect());
    }

    let carrier_descriptor = relationship.target.describe(registry)?;
    let target_node = carrier_descriptor.target_node.as_ref().ok_or_else(|| {
        OgmError::Schema(format!(
            "{} has no target node field",
            carrier_descriptor.name
        ))
    })?;

    let mut tuples = Vec::with_capacity(keyed.len());
    for (edge_type, carrier) in keyed {
        let (properties, edge_id, target) = {
            let guard = carrier.read()?;
            let properties = carrier_descriptor.read_properties(&*guard)?;
            let edge_id = identity::read_id(&carrier_descriptor, &*guard)?;
            let target = match guard.relationship(&target_node.field) {
                Some(RelationshipValue::Single(Some(target))) => target,
                _ => {
                    return Err(OgmError::Mapping(format!(
                        "{} in field '{}' has no {} set",
                        carrier_descriptor.name, relationship.field, target_node.field
                    )));
                }
            };
            (properties, edge_id, target)
        };
        tuples.push(RelationshipTuple {
            edge_type,
            target,
            properties: Some(properties),
            edge_id,
            carrier: Some((carrier, carrier_descriptor.clone())),
        });
    }
    Ok(tuples)
}

/// Which relationship field of a type, if any, an edge belongs to.
///
/// An edge of a fixed type goes to the field declaring that type whose
/// endpoint label the target node carries. Any other edge goes to the first
/// dynamic field whose endpoint label the target carries. Edges matching
/// neither are unmapped.
pub struct EdgeClaims {
    fixed: Vec<(usize, String, &'static str)>,
    dynamic: Vec<(usize, &'static str)>,
}

impl EdgeClaims {
    pub fn new(registry: &MetadataRegistry, descriptor: &TypeDescriptor) -> Result<Self> {
        let mut fixed = Vec::new();
        let mut dynamic = Vec::new();
        for (index, relationship) in descriptor.relationships.iter().enumerate() {
            let label = relationship.endpoint(registry)?.label;
            match &relationship.edge_type {
                EdgeType::Fixed(edge_type) => fixed.push((index, edge_type.clone(), label)),
                EdgeType::Dynamic => dynamic.push((index, label)),
            }
        }
        Ok(Self { fixed, dynamic })
    }

    /// Index into `descriptor.relationships` of the field owning `edge`.
    pub fn claim(&self, edge: &RawEdge, target: &RawNode) -> Option<usize> {
        let mut fixed_type = false;
        for (index, edge_type, label) in &self.fixed {
            if *edge_type == edge.edge_type {
                fixed_type = true;
                if target.has_label(label) {
                    return Some(*index);
                }
            }
        }
        if fixed_type {
            return None;
        }
        self.dynamic
            .iter()
            .find(|(_, label)| target.has_label(label))
            .map(|(index, _)| *index)
    }
}

/// Assigns the outgoing edges of `source` to relationship fields with
/// [`EdgeClaims`]. Edges whose target is not part of the record are left out.
///
/// Returns the edges per field (parallel to `descriptor.relationships`) and
/// the edges nothing claimed.
pub fn claim_edges<'r>(
    registry: &MetadataRegistry,
    descriptor: &TypeDescriptor,
    record: &'r GraphRecord,
    source: &GraphId,
) -> Result<(Vec<Vec<&'r RawEdge>>, Vec<&'r RawEdge>)> {
    let claims = EdgeClaims::new(registry, descriptor)?;
    let mut claimed = vec![Vec::new(); descriptor.relationships.len()];
    let mut unclaimed = Vec::new();

    for edge in record.outgoing(source) {
        let Some(target) = record.node(&edge.target) else {
            event!(
                Level::DEBUG,
                edge_type = edge.edge_type.as_str(),
                target = %edge.target,
                "relationship target outside loaded record, skipped"
            );
            continue;
        };

        match claims.claim(edge, target) {
            Some(index) => claimed[index].push(edge),
            None => unclaimed.push(edge),
        }
    }

    Ok((claimed, unclaimed))
}

/// Rebuilds the field shape declared by `relationship` from materialized
/// elements, each paired with the type of the relationship it came from.
pub fn regroup(
    relationship: &RelationshipDescriptor,
    elements: Vec<(String, EntityRef)>,
    strict: bool,
) -> Result<RelationshipValue> {
    match relationship.cardinality {
        Cardinality::Single => {
            if elements.len() > 1 {
                if strict {
                    return Err(OgmError::Mapping(format!(
                        "Field '{}' holds a single target but {} relationships were found",
                        relationship.field,
                        elements.len()
                    )));
                }
                event!(
                    Level::WARN,
                    field = relationship.field.as_str(),
                    found = elements.len(),
                    "single-valued relationship matched several edges, keeping the first"
                );
            }
            Ok(RelationshipValue::Single(
                elements.into_iter().next().map(|(_, target)| target),
            ))
        }
        Cardinality::Collection => Ok(RelationshipValue::Collection(
            elements.into_iter().map(|(_, target)| target).collect(),
        )),
        Cardinality::DynamicGroupedSingle => {
            let mut targets = BTreeMap::new();
            for (key, target) in elements {
                if targets.insert(key.clone(), target).is_some() {
                    event!(
                        Level::DEBUG,
                        field = relationship.field.as_str(),
                        key = key.as_str(),
                        "duplicate dynamic relationship key, last one wins"
                    );
                }
            }
            Ok(RelationshipValue::DynamicSingle(targets))
        }
        Cardinality::DynamicGroupedCollection => {
            let mut groups: BTreeMap<String, Vec<EntityRef>> = BTreeMap::new();
            for (key, target) in elements {
                groups.entry(key).or_default().push(target);
            }
            Ok(RelationshipValue::DynamicCollection(groups))
        }
    }
}
