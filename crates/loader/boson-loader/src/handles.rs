//! Flat device numbering across drivers.
//!
//! [`DeviceHandleTable`] gives every device of every initialized driver a
//! dense, zero-based [`DeviceId`]: devices of the first driver in resolved
//! order come first, each driver's devices in its own enumeration order.
//! The table is built once and never renumbered.

use std::collections::HashMap;

use boson_core::{DeviceId, DriverIndex};
use boson_driver_api::DeviceHandle;

/// One numbered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Flat identifier.
    pub id: DeviceId,
    /// Owning driver's position in the resolved list.
    pub driver: DriverIndex,
    /// The driver's own handle.
    pub handle: DeviceHandle,
}

/// Bidirectional map between flat identifiers and driver device handles.
#[derive(Debug, Default)]
pub struct DeviceHandleTable {
    entries: Vec<DeviceEntry>,
    by_handle: HashMap<DeviceHandle, DeviceId>,
}

impl DeviceHandleTable {
    /// Numbers `devices`, given per driver in resolved order.
    pub fn build<I>(devices: I) -> Self
    where
        I: IntoIterator<Item = (DriverIndex, Vec<DeviceHandle>)>,
    {
        let mut table = Self::default();
        for (driver, handles) in devices {
            for handle in handles {
                let Ok(raw) = u32::try_from(table.entries.len()) else {
                    log::warn!("device table full, dropping {handle:?}");
                    continue;
                };
                let id = DeviceId::new(raw);
                if table.by_handle.contains_key(&handle) {
                    log::warn!(
                        "driver {driver} reported {handle:?} which another device already uses"
                    );
                } else {
                    table.by_handle.insert(handle, id);
                }
                table.entries.push(DeviceEntry { id, driver, handle });
            }
        }
        table
    }

    /// Returns the identifier of `handle`, or [`DeviceId::INVALID`].
    pub fn to_identifier(&self, handle: DeviceHandle) -> DeviceId {
        self.by_handle
            .get(&handle)
            .copied()
            .unwrap_or(DeviceId::INVALID)
    }

    /// Returns the handle numbered `id`.
    pub fn to_handle(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.entries.get(id.as_usize()).map(|e| e.handle)
    }

    /// Returns the driver owning `handle`.
    pub fn driver_of(&self, handle: DeviceHandle) -> Option<DriverIndex> {
        let id = self.by_handle.get(&handle)?;
        self.entries.get(id.as_usize()).map(|e| e.driver)
    }

    /// All handles, in identifier order.
    pub fn handles(&self) -> Vec<DeviceHandle> {
        self.entries.iter().map(|e| e.handle).collect()
    }

    /// All entries, in identifier order.
    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no device was numbered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
