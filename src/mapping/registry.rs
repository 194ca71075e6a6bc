use lazy_static::lazy_static;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tracing::{Level, event};

use super::descriptor::TypeDescriptor;
use super::entity::GraphType;
use crate::core::Result;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<MetadataRegistry> = Arc::new(MetadataRegistry::new());
}

/// Per-type cache slot. `init` serializes the first resolution so that
/// concurrent callers wait for it instead of building their own copy.
#[derive(Default)]
struct DescriptorSlot {
    descriptor: OnceLock<Arc<TypeDescriptor>>,
    init: Mutex<()>,
}

/// Memoizing source of [`TypeDescriptor`]s, keyed by type identity.
///
/// Entries are never evicted. Failed resolutions are not cached; the same
/// `SchemaError` is produced again on the next call.
#[derive(Default)]
pub struct MetadataRegistry {
    slots: RwLock<HashMap<TypeId, Arc<DescriptorSlot>>>,
    resolutions: AtomicUsize,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by sessions that do not bring their own.
    pub fn global() -> Arc<MetadataRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    pub fn describe<T: GraphType>(&self) -> Result<Arc<TypeDescriptor>> {
        let slot = self.slot(TypeId::of::<T>())?;
        if let Some(descriptor) = slot.descriptor.get() {
            return Ok(descriptor.clone());
        }

        let _guard = slot.init.lock()?;
        if let Some(descriptor) = slot.descriptor.get() {
            return Ok(descriptor.clone());
        }

        let descriptor = Arc::new(TypeDescriptor::build::<T>()?);
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        event!(
            Level::DEBUG,
            type_name = descriptor.name,
            properties = descriptor.properties.len(),
            relationships = descriptor.relationships.len(),
            "described graph type"
        );
        let _ = slot.descriptor.set(descriptor.clone());
        Ok(descriptor)
    }

    pub fn is_described<T: GraphType>(&self) -> bool {
        self.slots
            .read()
            .map(|slots| {
                slots
                    .get(&TypeId::of::<T>())
                    .is_some_and(|slot| slot.descriptor.get().is_some())
            })
            .unwrap_or(false)
    }

    /// Number of descriptors built so far. Each type is built at most once.
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    fn slot(&self, type_id: TypeId) -> Result<Arc<DescriptorSlot>> {
        if let Some(slot) = self.slots.read()?.get(&type_id) {
            return Ok(slot.clone());
        }
        let mut slots = self.slots.write()?;
        Ok(slots.entry(type_id).or_default().clone())
    }
}
