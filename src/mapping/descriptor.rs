use std::any::TypeId;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::entity::{EntityKind, EntityRef, GraphEntity, GraphType, new_instance};
use super::fields::RelationshipValue;
use super::registry::MetadataRegistry;
use super::schema::SchemaBuilder;
use crate::core::{OgmError, PropertyKind, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierStrategy {
    /// The caller sets the identifier before the first save.
    Assigned(PropertyKind),
    /// The store produces the identifier on insert.
    Generated(PropertyKind),
}

impl IdentifierStrategy {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Assigned(kind) | Self::Generated(kind) => *kind,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierDescriptor {
    pub field: String,
    pub strategy: IdentifierStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeType {
    Fixed(String),
    /// Supplied per instance by the key of a keyed mapping.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Single,
    Collection,
    DynamicGroupedSingle,
    DynamicGroupedCollection,
}

impl Cardinality {
    pub fn is_dynamic(&self) -> bool {
        matches!(
            self,
            Self::DynamicGroupedSingle | Self::DynamicGroupedCollection
        )
    }
}

type DescribeFn = fn(&MetadataRegistry) -> Result<Arc<TypeDescriptor>>;

fn describe_erased<T: GraphType>(registry: &MetadataRegistry) -> Result<Arc<TypeDescriptor>> {
    registry.describe::<T>()
}

/// Non-owning reference to another mapped type, resolved through the
/// registry on demand so that mutually referencing types can be described.
#[derive(Clone, Copy)]
pub struct TargetRef {
    pub type_id: TypeId,
    pub name: &'static str,
    pub label: &'static str,
    pub kind: EntityKind,
    describe: DescribeFn,
}

impl TargetRef {
    pub fn of<T: GraphType>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
            label: T::LABEL,
            kind: T::KIND,
            describe: describe_erased::<T>,
        }
    }

    pub fn describe(&self, registry: &MetadataRegistry) -> Result<Arc<TypeDescriptor>> {
        (self.describe)(registry)
    }
}

impl PartialEq for TargetRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TargetRef {}

impl fmt::Debug for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetRef")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    pub field: String,
    pub edge_type: EdgeType,
    pub cardinality: Cardinality,
    /// Declared element type: the endpoint node, or the relationship-property
    /// type when `has_properties` is set.
    pub target: TargetRef,
    pub has_properties: bool,
}

impl RelationshipDescriptor {
    /// The node type at the far end of the relationship.
    pub fn endpoint(&self, registry: &MetadataRegistry) -> Result<TargetRef> {
        if !self.has_properties {
            return Ok(self.target);
        }
        let carrier = self.target.describe(registry)?;
        carrier.target_node_ref()
    }

    pub fn fixed_type(&self) -> Option<&str> {
        match &self.edge_type {
            EdgeType::Fixed(label) => Some(label),
            EdgeType::Dynamic => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNodeDescriptor {
    pub field: String,
    pub target: TargetRef,
}

/// Immutable mapping metadata for one domain type.
#[derive(Clone)]
pub struct TypeDescriptor {
    pub type_id: TypeId,
    pub name: &'static str,
    pub label: &'static str,
    pub kind: EntityKind,
    pub identifier: Option<IdentifierDescriptor>,
    pub version_field: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
    pub relationships: Vec<RelationshipDescriptor>,
    pub target_node: Option<TargetNodeDescriptor>,
    factory: fn() -> EntityRef,
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && self.name == other.name
            && self.label == other.label
            && self.kind == other.kind
            && self.identifier == other.identifier
            && self.version_field == other.version_field
            && self.properties == other.properties
            && self.relationships == other.relationships
            && self.target_node == other.target_node
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("identifier", &self.identifier)
            .field("version_field", &self.version_field)
            .field("properties", &self.properties)
            .field("relationships", &self.relationships)
            .field("target_node", &self.target_node)
            .finish()
    }
}

impl TypeDescriptor {
    /// Collects and validates the declarations of `T`.
    pub(crate) fn build<T: GraphType>() -> Result<Self> {
        let mut schema = SchemaBuilder::new(T::NAME);
        T::declare(&mut schema);

        let identifier = validate_identifier::<T>(&schema)?;
        let version_field = validate_version::<T>(&schema)?;

        let mut seen = HashSet::new();
        for reserved in identifier
            .iter()
            .map(|id| id.field.as_str())
            .chain(version_field.as_deref())
        {
            seen.insert(reserved.to_string());
        }

        let mut properties = Vec::with_capacity(schema.properties.len());
        for declared in &schema.properties {
            if !seen.insert(declared.name.clone()) {
                return Err(OgmError::Schema(format!(
                    "{} declares property '{}' more than once (again in {})",
                    T::NAME,
                    declared.name,
                    declared.origin
                )));
            }
            properties.push(PropertyDescriptor {
                name: declared.name.clone(),
                kind: declared.kind,
                optional: declared.optional,
            });
        }

        let mut relationships = Vec::with_capacity(schema.relationships.len());
        for declared in &schema.relationships {
            if !seen.insert(declared.field.clone()) {
                return Err(OgmError::Schema(format!(
                    "{} declares field '{}' more than once (again in {})",
                    T::NAME,
                    declared.field,
                    declared.origin
                )));
            }
            match (&declared.edge_type, declared.cardinality.is_dynamic()) {
                (EdgeType::Fixed(label), false) if label.trim().is_empty() => {
                    return Err(OgmError::Schema(format!(
                        "{}.{} declares an empty relationship type",
                        T::NAME,
                        declared.field
                    )));
                }
                (EdgeType::Fixed(label), true) => {
                    return Err(OgmError::Schema(format!(
                        "{}.{} is keyed by relationship type and cannot also fix the type '{}'",
                        T::NAME,
                        declared.field,
                        label
                    )));
                }
                (EdgeType::Dynamic, false) => {
                    return Err(OgmError::Schema(format!(
                        "{}.{} has no relationship type; dynamic relationships must be a map keyed by type",
                        T::NAME,
                        declared.field
                    )));
                }
                _ => {}
            }
            relationships.push(RelationshipDescriptor {
                field: declared.field.clone(),
                edge_type: declared.edge_type.clone(),
                cardinality: declared.cardinality,
                target: declared.target,
                has_properties: declared.target.kind == EntityKind::RelationshipProperties,
            });
        }

        let target_node = validate_target_node::<T>(&schema)?;
        if let Some(target) = &target_node {
            if !seen.insert(target.field.clone()) {
                return Err(OgmError::Schema(format!(
                    "{} declares field '{}' more than once",
                    T::NAME,
                    target.field
                )));
            }
        }

        Ok(Self {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
            label: T::LABEL,
            kind: T::KIND,
            identifier,
            version_field,
            properties,
            relationships,
            target_node,
            factory: new_instance::<T>,
        })
    }

    pub fn is_relationship_properties(&self) -> bool {
        self.kind == EntityKind::RelationshipProperties
    }

    pub fn new_instance(&self) -> EntityRef {
        (self.factory)()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn relationship(&self, field: &str) -> Option<&RelationshipDescriptor> {
        self.relationships
            .iter()
            .find(|relationship| relationship.field == field)
    }

    pub fn target_node_ref(&self) -> Result<TargetRef> {
        self.target_node
            .as_ref()
            .map(|target| target.target)
            .ok_or_else(|| {
                OgmError::Schema(format!("{} has no target node field", self.name))
            })
    }

    /// Snapshot of the declared property values. `Null`s are left out: the
    /// graph does not store absent properties.
    pub fn read_properties(&self, entity: &dyn GraphEntity) -> Result<BTreeMap<String, Value>> {
        let mut values = BTreeMap::new();
        for property in &self.properties {
            let value = entity.property(&property.name).ok_or_else(|| {
                OgmError::Mapping(format!(
                    "{} does not expose declared property '{}'",
                    self.name, property.name
                ))
            })?;
            if !value.is_null() {
                values.insert(property.name.clone(), value);
            }
        }
        Ok(values)
    }

    /// Assigns stored values to declared properties in declaration order.
    /// Properties missing from `values` keep their current value.
    pub fn write_properties(
        &self,
        entity: &mut dyn GraphEntity,
        values: &BTreeMap<String, Value>,
    ) -> Result<()> {
        for property in &self.properties {
            let Some(value) = values.get(&property.name) else {
                continue;
            };
            if !property.kind.is_compatible(value) {
                return Err(OgmError::Mapping(format!(
                    "{}.{} expects {}, stored value is {}",
                    self.name,
                    property.name,
                    property.kind,
                    value.type_name()
                )));
            }
            set_field(self.name, entity, &property.name, value.clone())?;
        }
        Ok(())
    }
}

pub(crate) fn set_field(
    type_name: &str,
    entity: &mut dyn GraphEntity,
    field: &str,
    value: Value,
) -> Result<()> {
    if entity.set_property(field, value)? {
        Ok(())
    } else {
        Err(OgmError::Mapping(format!(
            "{} has no settable field '{}'",
            type_name, field
        )))
    }
}

pub(crate) fn set_relationship_field(
    type_name: &str,
    entity: &mut dyn GraphEntity,
    field: &str,
    value: RelationshipValue,
) -> Result<()> {
    if entity.set_relationship(field, value)? {
        Ok(())
    } else {
        Err(OgmError::Mapping(format!(
            "{} has no settable relationship field '{}'",
            type_name, field
        )))
    }
}

fn validate_identifier<T: GraphType>(schema: &SchemaBuilder) -> Result<Option<IdentifierDescriptor>> {
    let declared = &schema.identifiers;
    let generated = declared.iter().filter(|id| id.generated).count();
    if generated > 0 && generated < declared.len() {
        return Err(OgmError::Schema(format!(
            "{} declares both assigned and generated identifiers",
            T::NAME
        )));
    }
    if declared.len() > 1 {
        let fields = declared
            .iter()
            .map(|id| format!("{} (from {})", id.field, id.origin))
            .collect::<Vec<_>>();
        return Err(OgmError::Schema(format!(
            "{} declares more than one identifier field: {}",
            T::NAME,
            fields.join(", ")
        )));
    }

    let Some(id) = declared.first() else {
        if T::KIND == EntityKind::Node {
            return Err(OgmError::Schema(format!(
                "Node type {} declares no identifier field",
                T::NAME
            )));
        }
        return Ok(None);
    };

    if !id.kind.can_identify() {
        return Err(OgmError::Schema(format!(
            "{}.{} has type {} which cannot be used as an identifier",
            T::NAME, id.field, id.kind
        )));
    }

    let strategy = if id.generated {
        IdentifierStrategy::Generated(id.kind)
    } else {
        IdentifierStrategy::Assigned(id.kind)
    };
    Ok(Some(IdentifierDescriptor {
        field: id.field.clone(),
        strategy,
    }))
}

fn validate_version<T: GraphType>(schema: &SchemaBuilder) -> Result<Option<String>> {
    match schema.versions.as_slice() {
        [] => Ok(None),
        [version] => {
            if version.kind != PropertyKind::Integer {
                return Err(OgmError::Schema(format!(
                    "{}.{} is a version field and must be an integer, found {}",
                    T::NAME, version.field, version.kind
                )));
            }
            if T::KIND == EntityKind::RelationshipProperties {
                return Err(OgmError::Schema(format!(
                    "Relationship-property type {} cannot declare a version field",
                    T::NAME
                )));
            }
            Ok(Some(version.field.clone()))
        }
        many => Err(OgmError::Schema(format!(
            "{} declares {} version fields ({}); at most one is allowed",
            T::NAME,
            many.len(),
            many.iter()
                .map(|version| version.field.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn validate_target_node<T: GraphType>(schema: &SchemaBuilder) -> Result<Option<TargetNodeDescriptor>> {
    let declared = &schema.target_nodes;
    if T::KIND == EntityKind::Node {
        if let Some(first) = declared.first() {
            return Err(OgmError::Schema(format!(
                "{}.{} is a target node field, which only relationship-property types may declare",
                T::NAME, first.field
            )));
        }
        return Ok(None);
    }

    let [target] = declared.as_slice() else {
        return Err(OgmError::Schema(format!(
            "Relationship-property type {} must declare exactly one target node field, found {}",
            T::NAME,
            declared.len()
        )));
    };
    if target.cardinality != Cardinality::Single {
        return Err(OgmError::Schema(format!(
            "{}.{} must hold a single target node, found {:?}",
            T::NAME, target.field, target.cardinality
        )));
    }
    if target.target.kind != EntityKind::Node {
        return Err(OgmError::Schema(format!(
            "{}.{} must point at a node type, {} is a relationship-property type",
            T::NAME, target.field, target.target.name
        )));
    }
    Ok(Some(TargetNodeDescriptor {
        field: target.field.clone(),
        target: target.target,
    }))
}
