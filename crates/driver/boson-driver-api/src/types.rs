//! Plain data returned by dispatched operations.

/// Broad device type reported in [`DeviceProperties`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    /// A GPU.
    #[default]
    Gpu,
    /// A neural processing unit.
    Npu,
    /// Anything else.
    Other,
}

/// Static description of one device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceProperties {
    /// Marketing name.
    pub name: String,
    /// Device type.
    pub device_type: DeviceType,
    /// PCI vendor id.
    pub vendor_id: u32,
    /// Vendor-specific device id.
    pub device_id: u32,
    /// Core clock in MHz.
    pub core_clock_mhz: u32,
}

/// A group of hardware metrics that can be sampled together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricGroup {
    /// Group name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

/// Debugger attach capabilities of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugProperties {
    /// A debugger may attach to processes using the device.
    pub attach_supported: bool,
}

/// Health summary reported by system management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    /// The device must be reset before further use.
    pub reset_required: bool,
    /// The device has been repaired since the last reset.
    pub repaired: bool,
}

/// Instantaneous power draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerUsage {
    /// Draw in milliwatts.
    pub milliwatts: u64,
}
