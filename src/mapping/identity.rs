use serde::{Deserialize, Serialize};

use super::descriptor::{TypeDescriptor, set_field};
use super::entity::GraphEntity;
use crate::core::{GraphId, OgmError, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOperation {
    Insert,
    Update,
}

/// Outcome of [`resolve_for_write`] for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteDecision {
    pub operation: WriteOperation,
    /// `None` only for inserts whose identifier the store generates.
    pub id: Option<GraphId>,
    /// Version the store must still hold for the update to apply.
    pub expected_version: Option<i64>,
}

pub fn read_id(descriptor: &TypeDescriptor, entity: &dyn GraphEntity) -> Result<Option<GraphId>> {
    let Some(identifier) = &descriptor.identifier else {
        return Ok(None);
    };
    let value = entity.property(&identifier.field).ok_or_else(|| {
        OgmError::Mapping(format!(
            "{} does not expose identifier field '{}'",
            descriptor.name, identifier.field
        ))
    })?;
    GraphId::from_value(&value)
}

pub fn read_version(descriptor: &TypeDescriptor, entity: &dyn GraphEntity) -> Result<Option<i64>> {
    let Some(field) = &descriptor.version_field else {
        return Ok(None);
    };
    match entity.property(field) {
        Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            OgmError::Mapping(format!(
                "{}.{} holds a non-integer version ({})",
                descriptor.name,
                field,
                value.type_name()
            ))
        }),
        None => Err(OgmError::Mapping(format!(
            "{} does not expose version field '{}'",
            descriptor.name, field
        ))),
    }
}

/// Decides whether `entity` is inserted or updated and which version the
/// update expects.
///
/// - Generated ids: unset means insert.
/// - Assigned ids: unset is an error. With a version field, an unset version
///   means insert; without one the write merges by id.
pub fn resolve_for_write(
    descriptor: &TypeDescriptor,
    entity: &dyn GraphEntity,
) -> Result<WriteDecision> {
    let identifier = descriptor.identifier.as_ref().ok_or_else(|| {
        OgmError::Mapping(format!(
            "{} has no identifier and cannot be written as a node",
            descriptor.name
        ))
    })?;
    let id = read_id(descriptor, entity)?;
    let version = read_version(descriptor, entity)?;
    let versioned = descriptor.version_field.is_some();

    if identifier.strategy.is_generated() {
        return match id {
            None => Ok(WriteDecision {
                operation: WriteOperation::Insert,
                id: None,
                expected_version: None,
            }),
            Some(_) if versioned && version.is_none() => Err(OgmError::Mapping(format!(
                "{} has an identifier but no version; load it before saving",
                descriptor.name
            ))),
            Some(id) => Ok(WriteDecision {
                operation: WriteOperation::Update,
                id: Some(id),
                expected_version: version,
            }),
        };
    }

    let Some(id) = id else {
        return Err(OgmError::UnsetAssignedId {
            type_name: descriptor.name.to_string(),
        });
    };
    let operation = if versioned && version.is_none() {
        WriteOperation::Insert
    } else {
        WriteOperation::Update
    };
    Ok(WriteDecision {
        operation,
        id: Some(id),
        expected_version: version,
    })
}

/// Writes a store-generated identifier back into the instance.
pub fn apply_generated_id(
    descriptor: &TypeDescriptor,
    entity: &mut dyn GraphEntity,
    id: GraphId,
) -> Result<()> {
    let identifier = descriptor.identifier.as_ref().ok_or_else(|| {
        OgmError::Mapping(format!("{} has no identifier field", descriptor.name))
    })?;
    set_field(descriptor.name, entity, &identifier.field, id.into())
}

pub fn apply_version(
    descriptor: &TypeDescriptor,
    entity: &mut dyn GraphEntity,
    version: i64,
) -> Result<()> {
    let Some(field) = &descriptor.version_field else {
        return Ok(());
    };
    set_field(descriptor.name, entity, field, Value::Integer(version))
}
