//! The resolved driver set.
//!
//! Built once per context: candidates are ordered by policy, each is
//! initialized, and the devices of every usable driver are numbered.
//! Nothing here changes afterwards except in-use flags and the context
//! registry.

use boson_core::{DeviceId, DriverIndex};
use boson_driver_api::{ContextHandle, DeviceHandle, InitFlags, Status};

use crate::driver::{Candidate, DriverRecord, DriverView};
use crate::handles::DeviceHandleTable;
use crate::objects::ObjectRegistry;
use crate::ordering::order_by_policy;

/// Ordered, initialized drivers and their devices.
#[derive(Debug)]
pub struct Registry {
    records: Vec<DriverRecord>,
    devices: DeviceHandleTable,
    contexts: ObjectRegistry,
}

fn index_of(position: usize) -> DriverIndex {
    DriverIndex::new(u32::try_from(position).unwrap_or(u32::MAX))
}

impl Registry {
    /// Orders `candidates` by `policy`, initializes them, and numbers their devices.
    pub fn build(candidates: Vec<Candidate>, policy: &str) -> Self {
        let ordered = order_by_policy(candidates, policy, |c| c.module.info().category);
        if !policy.trim().is_empty() {
            log::debug!(
                "driver order after {policy:?}: {:?}",
                ordered
                    .iter()
                    .map(|c| c.module.info().name)
                    .collect::<Vec<_>>()
            );
        }

        let records: Vec<DriverRecord> =
            ordered.into_iter().map(DriverRecord::initialize).collect();

        let devices = DeviceHandleTable::build(records.iter().enumerate().filter_map(
            |(position, record)| {
                let core = record.core()?;
                match core.device_get() {
                    Ok(handles) => Some((index_of(position), handles)),
                    Err(status) => {
                        log::warn!("driver {}: device enumeration failed: {status}", record.name());
                        None
                    }
                }
            },
        ));
        log::debug!(
            "{} device(s) across {} driver(s)",
            devices.len(),
            records.len()
        );

        Self {
            records,
            devices,
            contexts: ObjectRegistry::new(),
        }
    }

    /// All records in resolved order, usable or not.
    pub fn records(&self) -> &[DriverRecord] {
        &self.records
    }

    /// The record at `index`.
    pub fn record(&self, index: DriverIndex) -> Option<&DriverRecord> {
        self.records.get(index.as_usize())
    }

    /// The flat device numbering.
    pub fn devices(&self) -> &DeviceHandleTable {
        &self.devices
    }

    /// Live contexts.
    pub fn contexts(&self) -> &ObjectRegistry {
        &self.contexts
    }

    /// Returns `true` if at least one driver initialized.
    pub fn has_usable_driver(&self) -> bool {
        self.records.iter().any(DriverRecord::is_usable)
    }

    /// Usable drivers whose category satisfies `flags`, in resolved order.
    pub fn matching(&self, flags: InitFlags) -> Vec<DriverIndex> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_usable() && flags.admits(r.category()))
            .map(|(position, _)| index_of(position))
            .collect()
    }

    /// Looks up the driver owning `device`.
    ///
    /// # Errors
    ///
    /// [`Status::InvalidNullHandle`] for a handle the table never numbered.
    pub fn device_owner(&self, device: DeviceHandle) -> Result<(DriverIndex, &DriverRecord), Status> {
        let index = self
            .devices
            .driver_of(device)
            .ok_or(Status::InvalidNullHandle)?;
        let record = self.record(index).ok_or(Status::InvalidNullHandle)?;
        Ok((index, record))
    }

    /// Looks up the driver owning `context`.
    ///
    /// # Errors
    ///
    /// [`Status::InvalidNullHandle`] for a context not created through the loader.
    pub fn context_owner(&self, context: ContextHandle) -> Result<(DriverIndex, &DriverRecord), Status> {
        let index = self
            .contexts
            .owner(context)
            .ok_or(Status::InvalidNullHandle)?;
        let record = self.record(index).ok_or(Status::InvalidNullHandle)?;
        Ok((index, record))
    }

    /// Flat identifier of `device`, or [`DeviceId::INVALID`].
    pub fn to_identifier(&self, device: DeviceHandle) -> DeviceId {
        self.devices.to_identifier(device)
    }

    /// Handle numbered `id`.
    pub fn to_handle(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.devices.to_handle(id)
    }

    /// Snapshot of the record at `index`.
    pub fn view(&self, index: DriverIndex) -> Option<DriverView> {
        let record = self.record(index)?;
        Some(DriverView {
            index,
            name: record.name().to_string(),
            category: record.category(),
            source: record.source().clone(),
            init_status: record.init_status(),
            in_use: record.in_use(),
            devices: self
                .devices
                .entries()
                .iter()
                .filter(|e| e.driver == index)
                .count(),
        })
    }

    /// Snapshots of every record in resolved order.
    pub fn views(&self) -> Vec<DriverView> {
        (0..self.records.len())
            .filter_map(|position| self.view(index_of(position)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use boson_driver_api::DriverCategory;
    use boson_null_driver::{NullDriver, NullDriverConfig};

    use crate::driver::DriverSource;

    fn build(configs: &[NullDriverConfig], policy: &str) -> (Vec<NullDriver>, Registry) {
        let drivers: Vec<_> = configs.iter().cloned().map(NullDriver::new).collect();
        let candidates = drivers
            .iter()
            .map(|d| Candidate::new(Arc::new(d.clone()), DriverSource::Linked))
            .collect();
        (drivers, Registry::build(candidates, policy))
    }

    #[test]
    fn numbering_follows_resolved_order() {
        let (drivers, registry) = build(
            &[
                NullDriverConfig::named("gpu", DriverCategory::Gpu).with_devices(2),
                NullDriverConfig::named("npu", DriverCategory::Npu).with_devices(1),
            ],
            "NPU",
        );
        let npu = drivers[1].device_handles()[0];
        let gpu = drivers[0].device_handles();
        assert_eq!(registry.records()[0].name(), "npu");
        assert_eq!(registry.to_identifier(npu), DeviceId::new(0));
        assert_eq!(registry.to_identifier(gpu[0]), DeviceId::new(1));
        assert_eq!(registry.to_identifier(gpu[1]), DeviceId::new(2));
        assert_eq!(registry.to_handle(DeviceId::new(2)), Some(gpu[1]));
    }

    #[test]
    fn failed_drivers_keep_a_record_but_no_devices() {
        let (drivers, registry) = build(
            &[
                NullDriverConfig::named("broken", DriverCategory::Gpu)
                    .failing_init(Status::DeviceLost),
                NullDriverConfig::named("good", DriverCategory::Gpu),
            ],
            "",
        );
        assert_eq!(registry.records().len(), 2);
        assert_eq!(registry.devices().len(), 1);
        assert_eq!(
            registry.to_identifier(drivers[0].device_handles()[0]),
            DeviceId::INVALID
        );
        let views = registry.views();
        assert_eq!(views[0].init_status, Status::DeviceLost);
        assert_eq!(views[0].devices, 0);
        assert_eq!(views[1].devices, 1);
    }

    #[test]
    fn matching_filters_by_flags() {
        let (_, registry) = build(
            &[
                NullDriverConfig::named("gpu", DriverCategory::Gpu),
                NullDriverConfig::named("npu", DriverCategory::Npu),
                NullDriverConfig::named("mixed", DriverCategory::Mixed),
            ],
            "",
        );
        let idx = |v: &[u32]| v.iter().copied().map(DriverIndex::new).collect::<Vec<_>>();
        assert_eq!(registry.matching(InitFlags::GPU_ONLY), idx(&[0, 2]));
        assert_eq!(registry.matching(InitFlags::NPU_ONLY), idx(&[1, 2]));
        assert_eq!(registry.matching(InitFlags::empty()), idx(&[0, 1, 2]));
    }

    #[test]
    fn owners_resolve_by_handle() {
        let (drivers, registry) = build(
            &[
                NullDriverConfig::named("a", DriverCategory::Gpu),
                NullDriverConfig::named("b", DriverCategory::Gpu),
            ],
            "",
        );
        let device = drivers[1].device_handles()[0];
        let (index, record) = registry.device_owner(device).unwrap();
        assert_eq!(index, DriverIndex::new(1));
        assert_eq!(record.name(), "b");

        let unknown = DeviceHandle::from_raw(0x7).unwrap();
        assert_eq!(
            registry.device_owner(unknown).unwrap_err(),
            Status::InvalidNullHandle
        );
        let context = ContextHandle::from_raw(0x9).unwrap();
        assert_eq!(
            registry.context_owner(context).unwrap_err(),
            Status::InvalidNullHandle
        );
    }

    #[test]
    fn empty_registry() {
        let registry = Registry::build(Vec::new(), "GPU,0");
        assert!(!registry.has_usable_driver());
        assert!(registry.views().is_empty());
    }
}
