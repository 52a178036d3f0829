//! Ownership of handles created through the loader.
//!
//! Device handles are resolved through the handle table. Contexts are
//! created later, so their owners are recorded here as they escape.

use std::collections::HashMap;

use boson_core::DriverIndex;
use boson_driver_api::ContextHandle;
use parking_lot::RwLock;

/// Maps context handles to the driver that created them.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    contexts: RwLock<HashMap<ContextHandle, DriverIndex>>,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `driver` created `context`.
    pub fn insert(&self, context: ContextHandle, driver: DriverIndex) {
        if let Some(previous) = self.contexts.write().insert(context, driver) {
            log::warn!("{context:?} reused, previously owned by driver {previous}");
        }
    }

    /// Returns the driver owning `context`.
    pub fn owner(&self, context: ContextHandle) -> Option<DriverIndex> {
        self.contexts.read().get(&context).copied()
    }

    /// Forgets `context`.
    pub fn remove(&self, context: ContextHandle) -> Option<DriverIndex> {
        self.contexts.write().remove(&context)
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    /// Returns `true` if no context is live.
    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}
