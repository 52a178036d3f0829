//! Per-layer dispatch interfaces.
//!
//! Each API layer is a trait whose methods all default to
//! [`Status::UnsupportedFeature`]. A driver overrides the operations it
//! implements; the loader forwards to whatever the resolved driver provides
//! and the defaults report the rest.

use core::fmt;

use crate::handle::{ContextHandle, DeviceHandle};
use crate::status::Status;
use crate::types::{DebugProperties, DeviceProperties, DeviceState, MetricGroup, PowerUsage};

/// One of the independently dispatched API surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Device discovery, contexts, and everything compute.
    Core,
    /// Debugging and metrics.
    Tools,
    /// System management.
    Sysman,
    /// Tracer registration.
    Tracing,
}

impl Layer {
    /// All layers.
    pub const ALL: [Self; 4] = [Self::Core, Self::Tools, Self::Sysman, Self::Tracing];

    /// Short lowercase name, used in log messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Tools => "tools",
            Self::Sysman => "sysman",
            Self::Tracing => "tracing",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core layer operations.
pub trait CoreDdi: Send + Sync {
    /// Lists the devices this driver exposes, in enumeration order.
    ///
    /// # Errors
    ///
    /// Returns the driver's status code on failure.
    fn device_get(&self) -> Result<Vec<DeviceHandle>, Status> {
        Err(Status::UnsupportedFeature)
    }

    /// Describes one device.
    ///
    /// # Errors
    ///
    /// Returns the driver's status code on failure.
    fn device_get_properties(&self, device: DeviceHandle) -> Result<DeviceProperties, Status> {
        let _ = device;
        Err(Status::UnsupportedFeature)
    }

    /// Reports whether the device is still usable.
    fn device_get_status(&self, device: DeviceHandle) -> Status {
        let _ = device;
        Status::UnsupportedFeature
    }

    /// Creates a context on `device`.
    ///
    /// # Errors
    ///
    /// Returns the driver's status code on failure.
    fn context_create(&self, device: DeviceHandle) -> Result<ContextHandle, Status> {
        let _ = device;
        Err(Status::UnsupportedFeature)
    }

    /// Destroys a context.
    fn context_destroy(&self, context: ContextHandle) -> Status {
        let _ = context;
        Status::UnsupportedFeature
    }
}

/// Tools layer operations.
pub trait ToolsDdi: Send + Sync {
    /// Lists the metric groups a device can sample.
    ///
    /// # Errors
    ///
    /// Returns the driver's status code on failure.
    fn metric_group_get(&self, device: DeviceHandle) -> Result<Vec<MetricGroup>, Status> {
        let _ = device;
        Err(Status::UnsupportedFeature)
    }

    /// Reports debugger attach capabilities.
    ///
    /// # Errors
    ///
    /// Returns the driver's status code on failure.
    fn device_get_debug_properties(&self, device: DeviceHandle) -> Result<DebugProperties, Status> {
        let _ = device;
        Err(Status::UnsupportedFeature)
    }
}

/// System management layer operations.
pub trait SysmanDdi: Send + Sync {
    /// Reports the device's health.
    ///
    /// # Errors
    ///
    /// Returns the driver's status code on failure.
    fn device_get_state(&self, device: DeviceHandle) -> Result<DeviceState, Status> {
        let _ = device;
        Err(Status::UnsupportedFeature)
    }

    /// Resets the device. Handles and flat identifiers stay valid.
    fn device_reset(&self, device: DeviceHandle, force: bool) -> Status {
        let _ = (device, force);
        Status::UnsupportedFeature
    }

    /// Reads the current power draw.
    ///
    /// # Errors
    ///
    /// Returns the driver's status code on failure.
    fn device_get_power_usage(&self, device: DeviceHandle) -> Result<PowerUsage, Status> {
        let _ = device;
        Err(Status::UnsupportedFeature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;
    impl CoreDdi for Empty {}
    impl ToolsDdi for Empty {}
    impl SysmanDdi for Empty {}

    #[test]
    fn defaults_report_unsupported() {
        let device = DeviceHandle::from_raw(1).unwrap();
        assert_eq!(CoreDdi::device_get(&Empty), Err(Status::UnsupportedFeature));
        assert_eq!(Empty.device_get_status(device), Status::UnsupportedFeature);
        assert_eq!(
            Empty.metric_group_get(device),
            Err(Status::UnsupportedFeature)
        );
        assert_eq!(Empty.device_reset(device, true), Status::UnsupportedFeature);
    }

    #[test]
    fn layer_names() {
        let names: Vec<_> = Layer::ALL.iter().map(|l| l.to_string()).collect();
        assert_eq!(names, ["core", "tools", "sysman", "tracing"]);
    }
}
