use super::descriptor::{Cardinality, EdgeType, TargetRef};
use super::entity::GraphSchema;
use super::fields::RelationshipField;
use super::values::PropertyValue;
use crate::core::PropertyKind;

#[derive(Debug, Clone)]
pub(crate) struct IdentifierDeclaration {
    pub field: String,
    pub kind: PropertyKind,
    pub generated: bool,
    pub origin: &'static str,
}

#[derive(Debug, Clone)]
pub(crate) struct VersionDeclaration {
    pub field: String,
    pub kind: PropertyKind,
    pub origin: &'static str,
}

#[derive(Debug, Clone)]
pub(crate) struct PropertyDeclaration {
    pub name: String,
    pub kind: PropertyKind,
    pub optional: bool,
    pub origin: &'static str,
}

#[derive(Debug, Clone)]
pub(crate) struct RelationshipDeclaration {
    pub field: String,
    pub edge_type: EdgeType,
    pub cardinality: Cardinality,
    pub target: TargetRef,
    pub origin: &'static str,
}

#[derive(Debug, Clone)]
pub(crate) struct TargetNodeDeclaration {
    pub field: String,
    pub cardinality: Cardinality,
    pub target: TargetRef,
    pub origin: &'static str,
}

/// Collects the field declarations of a type and of every field-set it
/// flattens. Validation happens when the registry turns the collected
/// declarations into a `TypeDescriptor`.
#[derive(Debug)]
pub struct SchemaBuilder {
    origins: Vec<&'static str>,
    pub(crate) identifiers: Vec<IdentifierDeclaration>,
    pub(crate) versions: Vec<VersionDeclaration>,
    pub(crate) properties: Vec<PropertyDeclaration>,
    pub(crate) relationships: Vec<RelationshipDeclaration>,
    pub(crate) target_nodes: Vec<TargetNodeDeclaration>,
}

impl SchemaBuilder {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            origins: vec![type_name],
            identifiers: Vec::new(),
            versions: Vec::new(),
            properties: Vec::new(),
            relationships: Vec::new(),
            target_nodes: Vec::new(),
        }
    }

    fn origin(&self) -> &'static str {
        self.origins.last().copied().unwrap_or("<unknown>")
    }

    /// Declares a caller-assigned identifier.
    pub fn assigned_id<V: PropertyValue>(&mut self, field: &str) -> &mut Self {
        self.identifier::<V>(field, false)
    }

    /// Declares a store-generated identifier.
    pub fn generated_id<V: PropertyValue>(&mut self, field: &str) -> &mut Self {
        self.identifier::<V>(field, true)
    }

    fn identifier<V: PropertyValue>(&mut self, field: &str, generated: bool) -> &mut Self {
        let origin = self.origin();
        self.identifiers.push(IdentifierDeclaration {
            field: field.to_string(),
            kind: V::kind(),
            generated,
            origin,
        });
        self
    }

    pub fn version<V: PropertyValue>(&mut self, field: &str) -> &mut Self {
        let origin = self.origin();
        self.versions.push(VersionDeclaration {
            field: field.to_string(),
            kind: V::kind(),
            origin,
        });
        self
    }

    pub fn property<V: PropertyValue>(&mut self, name: &str) -> &mut Self {
        let origin = self.origin();
        self.properties.push(PropertyDeclaration {
            name: name.to_string(),
            kind: V::kind(),
            optional: V::is_optional(),
            origin,
        });
        self
    }

    /// Declares a relationship field. `None` as the edge type makes it
    /// dynamic: the map key of each entry is the relationship type.
    pub fn relationship<F: RelationshipField>(
        &mut self,
        field: &str,
        edge_type: Option<&str>,
    ) -> &mut Self {
        let origin = self.origin();
        self.relationships.push(RelationshipDeclaration {
            field: field.to_string(),
            edge_type: match edge_type {
                Some(label) => EdgeType::Fixed(label.to_string()),
                None => EdgeType::Dynamic,
            },
            cardinality: F::cardinality(),
            target: TargetRef::of::<F::Target>(),
            origin,
        });
        self
    }

    /// Declares the field of a relationship-property type holding the far
    /// endpoint of the relationship.
    pub fn target_node<F: RelationshipField>(&mut self, field: &str) -> &mut Self {
        let origin = self.origin();
        self.target_nodes.push(TargetNodeDeclaration {
            field: field.to_string(),
            cardinality: F::cardinality(),
            target: TargetRef::of::<F::Target>(),
            origin,
        });
        self
    }

    /// Merges every declaration of a reusable field-set into this schema.
    pub fn flatten<S: GraphSchema>(&mut self) -> &mut Self {
        self.origins.push(std::any::type_name::<S>());
        S::declare(self);
        self.origins.pop();
        self
    }
}
