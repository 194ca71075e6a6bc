use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::fields::RelationshipValue;
use super::schema::SchemaBuilder;
use crate::core::{OgmError, Result, Value};

/// Name-keyed access to the mapped state of a domain value.
///
/// Implementations are normally produced by `#[derive(GraphEntity)]`. The
/// setters return `Ok(false)` when `name` is not declared by the value, which
/// lets composed field-sets delegate to each other.
pub trait GraphEntity: Send + Sync + 'static {
    fn property(&self, name: &str) -> Option<Value>;
    fn set_property(&mut self, name: &str, value: Value) -> Result<bool>;
    fn relationship(&self, name: &str) -> Option<RelationshipValue>;
    fn set_relationship(&mut self, name: &str, value: RelationshipValue) -> Result<bool>;
}

/// Static side of a mapped type: contributes its fields to a schema.
///
/// Reusable field-sets (a shared base with common properties) implement only
/// this trait and are composed into node types with `SchemaBuilder::flatten`.
pub trait GraphSchema: GraphEntity + Default + Sized {
    fn declare(schema: &mut SchemaBuilder);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Node,
    RelationshipProperties,
}

/// A type the mapper can describe: a node or a relationship-property type.
pub trait GraphType: GraphSchema {
    const NAME: &'static str;
    const KIND: EntityKind;
    const LABEL: &'static str;
}

/// Type-erased shared handle to a mapped instance.
///
/// Two handles are the same entity when they point at the same allocation;
/// [`EntityRef::identity`] exposes that address for identity maps.
#[derive(Clone)]
pub struct EntityRef {
    entity: Arc<RwLock<dyn GraphEntity>>,
    any: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl EntityRef {
    pub fn new<T: GraphEntity>(value: T) -> Self {
        Self::from_arc(Arc::new(RwLock::new(value)))
    }

    pub fn from_arc<T: GraphEntity>(arc: Arc<RwLock<T>>) -> Self {
        let entity: Arc<RwLock<dyn GraphEntity>> = arc.clone();
        let any: Arc<dyn Any + Send + Sync> = arc;
        Self {
            entity,
            any,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, dyn GraphEntity>> {
        Ok(self.entity.read()?)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, dyn GraphEntity>> {
        Ok(self.entity.write()?)
    }

    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.any) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        self.identity() == other.identity()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: GraphEntity>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast<T: GraphEntity>(&self) -> Option<Arc<RwLock<T>>> {
        self.any.clone().downcast::<RwLock<T>>().ok()
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityRef<{}>@{:#x}", self.type_name, self.identity())
    }
}

/// Typed shared handle, the value type of relationship fields.
///
/// Equality is identity: two `Ref`s are equal when they point at the same
/// instance.
pub struct Ref<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: GraphEntity> Ref<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, T>> {
        Ok(self.inner.read()?)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, T>> {
        Ok(self.inner.write()?)
    }

    pub fn erase(&self) -> EntityRef {
        EntityRef::from_arc(self.inner.clone())
    }

    pub fn from_entity(entity: &EntityRef) -> Result<Self> {
        entity
            .downcast::<T>()
            .map(|inner| Self { inner })
            .ok_or_else(|| {
                OgmError::Mapping(format!(
                    "Expected an instance of {}, found {}",
                    std::any::type_name::<T>(),
                    entity.type_name()
                ))
            })
    }

    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// Never print the pointee: object graphs may be cyclic.
impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ref<{}>@{:p}",
            std::any::type_name::<T>(),
            Arc::as_ptr(&self.inner)
        )
    }
}

/// Constructor used by descriptors to allocate a fresh instance of a type.
pub(crate) fn new_instance<T: GraphSchema>() -> EntityRef {
    EntityRef::new(T::default())
}
