use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Level, event};

use super::descriptor::{RelationshipDescriptor, TypeDescriptor, set_field, set_relationship_field};
use super::entity::{EntityRef, GraphType, Ref};
use super::fields::RelationshipValue;
use super::registry::MetadataRegistry;
use super::relationships;
use crate::config::MappingConfig;
use crate::core::{GraphId, OgmError, Result, Value};
use crate::store::{GraphRecord, RawEdge};

/// Builds domain instances from a [`GraphRecord`].
pub struct Materializer<'a> {
    registry: &'a MetadataRegistry,
    config: &'a MappingConfig,
}

impl<'a> Materializer<'a> {
    pub fn new(registry: &'a MetadataRegistry, config: &'a MappingConfig) -> Self {
        Self { registry, config }
    }

    /// Materializes the root node of `record` and everything reachable from
    /// it. Each node becomes exactly one instance per call, so cycles in the
    /// record become cycles of shared handles.
    pub fn materialize(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        record: &GraphRecord,
    ) -> Result<EntityRef> {
        if descriptor.is_relationship_properties() {
            return Err(OgmError::Mapping(format!(
                "{} describes relationship properties and cannot be materialized from a node",
                descriptor.name
            )));
        }

        let mut pass = MaterializePass {
            registry: self.registry,
            strict: self.config.is_strict(),
            record,
            instances: HashMap::new(),
            pending: Vec::new(),
        };
        let root = pass.instance(descriptor, &record.root)?;
        while let Some((descriptor, id, instance)) = pass.pending.pop() {
            pass.populate(&descriptor, &id, &instance)?;
        }
        event!(
            Level::DEBUG,
            type_name = descriptor.name,
            instances = pass.instances.len(),
            "materialized graph record"
        );
        Ok(root)
    }

    pub fn materialize_as<T: GraphType>(&self, record: &GraphRecord) -> Result<Ref<T>> {
        let descriptor = self.registry.describe::<T>()?;
        let root = self.materialize(&descriptor, record)?;
        Ref::from_entity(&root)
    }
}

struct MaterializePass<'a> {
    registry: &'a MetadataRegistry,
    strict: bool,
    record: &'a GraphRecord,
    /// Instances created in this call, by node id.
    instances: HashMap<GraphId, EntityRef>,
    /// Instances whose relationship fields are still to be populated.
    pending: Vec<(Arc<TypeDescriptor>, GraphId, EntityRef)>,
}

impl MaterializePass<'_> {
    /// The instance for node `id`: reused when already created in this call,
    /// otherwise created with its identifier, version and properties and
    /// queued for relationship population.
    fn instance(&mut self, descriptor: &Arc<TypeDescriptor>, id: &GraphId) -> Result<EntityRef> {
        if let Some(existing) = self.instances.get(id) {
            if existing.type_id() != descriptor.type_id {
                return Err(OgmError::Mapping(format!(
                    "Node {} was already materialized as {} and cannot also be a {}",
                    id,
                    existing.type_name(),
                    descriptor.name
                )));
            }
            return Ok(existing.clone());
        }

        let raw = self.record.node(id).ok_or_else(|| {
            OgmError::Mapping(format!("Node {} is not part of the record", id))
        })?;
        if !raw.has_label(descriptor.label) {
            return Err(OgmError::Mapping(format!(
                "Node {} has labels {:?}, expected '{}' for {}",
                id, raw.labels, descriptor.label, descriptor.name
            )));
        }

        let instance = descriptor.new_instance();
        {
            let mut guard = instance.write()?;
            if let Some(identifier) = &descriptor.identifier {
                set_field(descriptor.name, &mut *guard, &identifier.field, id.clone().into())?;
            }
            if let (Some(field), Some(version)) = (&descriptor.version_field, raw.version) {
                set_field(descriptor.name, &mut *guard, field, Value::Integer(version))?;
            }
            descriptor.write_properties(&mut *guard, &raw.properties)?;
        }
        self.instances.insert(id.clone(), instance.clone());
        self.pending.push((descriptor.clone(), id.clone(), instance.clone()));
        Ok(instance)
    }

    fn populate(
        &mut self,
        descriptor: &Arc<TypeDescriptor>,
        id: &GraphId,
        instance: &EntityRef,
    ) -> Result<()> {
        let record = self.record;
        let (claimed, unclaimed) =
            relationships::claim_edges(self.registry, descriptor, record, id)?;
        self.check_unclaimed(descriptor, &unclaimed)?;

        for (relationship, edges) in descriptor.relationships.iter().zip(claimed) {
            let mut elements = Vec::with_capacity(edges.len());
            for edge in edges {
                let element = self.element(relationship, edge)?;
                elements.push((edge.edge_type.clone(), element));
            }
            let value = relationships::regroup(relationship, elements, self.strict)?;
            let mut guard = instance.write()?;
            set_relationship_field(descriptor.name, &mut *guard, &relationship.field, value)?;
        }
        Ok(())
    }

    /// The value stored in a relationship field for one edge: the endpoint
    /// node, or a fresh relationship-property instance pointing at it.
    fn element(&mut self, relationship: &RelationshipDescriptor, edge: &RawEdge) -> Result<EntityRef> {
        let endpoint = relationship
            .endpoint(self.registry)?
            .describe(self.registry)?;
        let target = self.instance(&endpoint, &edge.target)?;
        if !relationship.has_properties {
            return Ok(target);
        }

        let carrier_descriptor = relationship.target.describe(self.registry)?;
        let target_node = carrier_descriptor.target_node.as_ref().ok_or_else(|| {
            OgmError::Schema(format!(
                "{} has no target node field",
                carrier_descriptor.name
            ))
        })?;

        let carrier = carrier_descriptor.new_instance();
        {
            let mut guard = carrier.write()?;
            if let (Some(identifier), Some(edge_id)) = (&carrier_descriptor.identifier, &edge.id) {
                set_field(
                    carrier_descriptor.name,
                    &mut *guard,
                    &identifier.field,
                    edge_id.clone().into(),
                )?;
            }
            carrier_descriptor.write_properties(&mut *guard, &edge.properties)?;
            set_relationship_field(
                carrier_descriptor.name,
                &mut *guard,
                &target_node.field,
                RelationshipValue::Single(Some(target)),
            )?;
        }
        Ok(carrier)
    }

    fn check_unclaimed(&self, descriptor: &TypeDescriptor, unclaimed: &[&RawEdge]) -> Result<()> {
        let Some(first) = unclaimed.first() else {
            return Ok(());
        };
        if self.strict {
            return Err(OgmError::Mapping(format!(
                "{} has no relationship field for edge type '{}' (to node {})",
                descriptor.name, first.edge_type, first.target
            )));
        }
        for edge in unclaimed {
            event!(
                Level::DEBUG,
                type_name = descriptor.name,
                edge_type = edge.edge_type.as_str(),
                target = %edge.target,
                "ignoring unmapped relationship"
            );
        }
        Ok(())
    }
}
