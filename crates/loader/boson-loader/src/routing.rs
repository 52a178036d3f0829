//! Handle-based routing across drivers.
//!
//! The loader's own layer tables. Each call finds the driver that owns
//! its handle argument and forwards to that driver's interface. A driver
//! without the layer reports [`Status::UnsupportedFeature`]; an unknown
//! handle reports [`Status::InvalidNullHandle`]. Both are recorded as the
//! thread's last error.

use std::sync::Arc;

use boson_driver_api::{
    ContextHandle, CoreDdi, DebugProperties, DeviceHandle, DeviceProperties, DeviceState,
    MetricGroup, PowerUsage, Status, SysmanDdi, ToolsDdi,
};

use crate::driver::DriverRecord;
use crate::error_state::{record, record_err};
use crate::registry::Registry;

fn layer_of<'r, T: ?Sized>(
    registry: &'r Registry,
    device: DeviceHandle,
    pick: impl FnOnce(&'r DriverRecord) -> Option<&'r Arc<T>>,
) -> Result<&'r Arc<T>, Status> {
    let (_, owner) = record_err(registry.device_owner(device))?;
    pick(owner).ok_or_else(|| record(Status::UnsupportedFeature))
}

fn flatten(result: Result<Status, Status>) -> Status {
    result.unwrap_or_else(|status| status)
}

/// Core layer routed by device and context handle.
pub struct RoutedCore {
    registry: Arc<Registry>,
}

impl RoutedCore {
    /// Routes through `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl CoreDdi for RoutedCore {
    fn device_get(&self) -> Result<Vec<DeviceHandle>, Status> {
        let devices = self.registry.devices();
        for entry in devices.entries() {
            if let Some(owner) = self.registry.record(entry.driver) {
                owner.mark_in_use();
            }
        }
        Ok(devices.handles())
    }

    fn device_get_properties(&self, device: DeviceHandle) -> Result<DeviceProperties, Status> {
        layer_of(&self.registry, device, |r| r.core())?.device_get_properties(device)
    }

    fn device_get_status(&self, device: DeviceHandle) -> Status {
        flatten(
            layer_of(&self.registry, device, |r| r.core()).map(|c| c.device_get_status(device)),
        )
    }

    fn context_create(&self, device: DeviceHandle) -> Result<ContextHandle, Status> {
        let (index, owner) = record_err(self.registry.device_owner(device))?;
        let core = owner
            .core()
            .ok_or_else(|| record(Status::UnsupportedFeature))?;
        let context = core.context_create(device)?;
        self.registry.contexts().insert(context, index);
        owner.mark_in_use();
        Ok(context)
    }

    fn context_destroy(&self, context: ContextHandle) -> Status {
        let (_, owner) = match self.registry.context_owner(context) {
            Ok(found) => found,
            Err(status) => return record(status),
        };
        let Some(core) = owner.core() else {
            return record(Status::UnsupportedFeature);
        };
        let status = core.context_destroy(context);
        if status.is_success() {
            self.registry.contexts().remove(context);
        }
        status
    }
}

/// Tools layer routed by device handle.
pub struct RoutedTools {
    registry: Arc<Registry>,
}

impl RoutedTools {
    /// Routes through `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl ToolsDdi for RoutedTools {
    fn metric_group_get(&self, device: DeviceHandle) -> Result<Vec<MetricGroup>, Status> {
        layer_of(&self.registry, device, |r| r.tools())?.metric_group_get(device)
    }

    fn device_get_debug_properties(&self, device: DeviceHandle) -> Result<DebugProperties, Status> {
        layer_of(&self.registry, device, |r| r.tools())?.device_get_debug_properties(device)
    }
}

/// System management layer routed by device handle.
pub struct RoutedSysman {
    registry: Arc<Registry>,
}

impl RoutedSysman {
    /// Routes through `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl SysmanDdi for RoutedSysman {
    fn device_get_state(&self, device: DeviceHandle) -> Result<DeviceState, Status> {
        layer_of(&self.registry, device, |r| r.sysman())?.device_get_state(device)
    }

    fn device_reset(&self, device: DeviceHandle, force: bool) -> Status {
        flatten(
            layer_of(&self.registry, device, |r| r.sysman()).map(|s| s.device_reset(device, force)),
        )
    }

    fn device_get_power_usage(&self, device: DeviceHandle) -> Result<PowerUsage, Status> {
        layer_of(&self.registry, device, |r| r.sysman())?.device_get_power_usage(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boson_driver_api::DriverCategory;
    use boson_null_driver::{NullDriver, NullDriverConfig};

    use crate::driver::{Candidate, DriverSource};
    use crate::error_state::{clear_last_error, last_error_description};

    fn registry(configs: Vec<NullDriverConfig>) -> (Vec<NullDriver>, Arc<Registry>) {
        let drivers: Vec<_> = configs.into_iter().map(NullDriver::new).collect();
        let candidates = drivers
            .iter()
            .map(|d| Candidate::new(Arc::new(d.clone()), DriverSource::Linked))
            .collect();
        (drivers, Arc::new(Registry::build(candidates, "")))
    }

    #[test]
    fn device_get_lists_all_and_marks_in_use() {
        let (drivers, registry) = registry(vec![
            NullDriverConfig::named("a", DriverCategory::Gpu).with_devices(2),
            NullDriverConfig::named("b", DriverCategory::Npu),
        ]);
        let core = RoutedCore::new(Arc::clone(&registry));
        let mut expected = drivers[0].device_handles();
        expected.extend(drivers[1].device_handles());
        assert_eq!(core.device_get().unwrap(), expected);
        assert!(registry.records().iter().all(|r| r.in_use()));
    }

    #[test]
    fn calls_reach_the_owning_driver() {
        let (drivers, registry) = registry(vec![
            NullDriverConfig::named("a", DriverCategory::Gpu),
            NullDriverConfig::named("b", DriverCategory::Gpu),
        ]);
        let core = RoutedCore::new(registry);
        let device = drivers[1].device_handles()[0];
        drivers[1].lose_device(0);
        assert_eq!(core.device_get_status(device), Status::DeviceLost);
        assert_eq!(
            core.device_get_properties(device).unwrap().name,
            "b device 0"
        );
    }

    #[test]
    fn contexts_route_back_to_their_creator() {
        let (drivers, registry) = registry(vec![
            NullDriverConfig::named("a", DriverCategory::Gpu),
            NullDriverConfig::named("b", DriverCategory::Gpu),
        ]);
        let core = RoutedCore::new(Arc::clone(&registry));
        let context = core.context_create(drivers[1].device_handles()[0]).unwrap();
        assert_eq!(drivers[1].live_contexts(), 1);
        assert_eq!(registry.contexts().len(), 1);
        assert!(registry.records()[1].in_use());
        assert!(!registry.records()[0].in_use());

        assert_eq!(core.context_destroy(context), Status::Success);
        assert_eq!(drivers[1].live_contexts(), 0);
        assert!(registry.contexts().is_empty());
        assert_eq!(core.context_destroy(context), Status::InvalidNullHandle);
    }

    #[test]
    fn missing_layer_is_unsupported() {
        let (drivers, registry) = registry(vec![
            NullDriverConfig::named("bare", DriverCategory::Gpu).core_only(),
        ]);
        let tools = RoutedTools::new(Arc::clone(&registry));
        let sysman = RoutedSysman::new(registry);
        let device = drivers[0].device_handles()[0];
        clear_last_error();
        assert_eq!(
            tools.metric_group_get(device).unwrap_err(),
            Status::UnsupportedFeature
        );
        assert_eq!(last_error_description(), Some("ERROR UNSUPPORTED FEATURE"));
        assert_eq!(sysman.device_reset(device, true), Status::UnsupportedFeature);
    }

    #[test]
    fn unknown_handle_is_recorded() {
        let (_, registry) = registry(vec![NullDriverConfig::default()]);
        let sysman = RoutedSysman::new(registry);
        let stranger = DeviceHandle::from_raw(0x3).unwrap();
        clear_last_error();
        assert_eq!(
            sysman.device_get_power_usage(stranger).unwrap_err(),
            Status::InvalidNullHandle
        );
        assert_eq!(last_error_description(), Some("ERROR INVALID NULL HANDLE"));
    }
}
