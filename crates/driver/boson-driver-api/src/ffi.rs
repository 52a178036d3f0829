//! C ABI exported by dynamically loaded drivers.
//!
//! A driver shared library exports [`DRIVER_GET_INFO_SYMBOL`],
//! [`DRIVER_INIT_SYMBOL`], and one table getter per layer it implements.
//! Each getter fills a `#[repr(C)]` table of optional function pointers;
//! a `None` slot is an unsupported operation. A missing getter symbol means
//! the driver does not provide that layer.
//!
//! Every function returns a raw [`Status`](crate::Status) code.

use core::ffi::c_char;

/// Major version of the tables below. Drivers with a different major are rejected.
pub const TABLE_VERSION_MAJOR: u16 = 1;
/// Minor version of the tables below.
pub const TABLE_VERSION_MINOR: u16 = 0;

/// Packs a major/minor pair the way table getters receive it.
pub const fn make_version(major: u16, minor: u16) -> u32 {
    ((major as u32) << 16) | minor as u32
}

/// Extracts the major part of a packed version.
pub const fn version_major(version: u32) -> u16 {
    (version >> 16) as u16
}

/// The version the loader passes to every table getter.
pub const TABLE_VERSION: u32 = make_version(TABLE_VERSION_MAJOR, TABLE_VERSION_MINOR);

/// `unsafe extern "C" fn(*mut RawDriverInfo) -> u32`
pub const DRIVER_GET_INFO_SYMBOL: &str = "bosonDriverGetInfo";
/// `unsafe extern "C" fn(flags: u32) -> u32`
pub const DRIVER_INIT_SYMBOL: &str = "bosonDriverInit";
/// `unsafe extern "C" fn(version: u32, *mut RawCoreTable) -> u32`
pub const CORE_TABLE_SYMBOL: &str = "bosonGetCoreProcTable";
/// `unsafe extern "C" fn(version: u32, *mut RawToolsTable) -> u32`
pub const TOOLS_TABLE_SYMBOL: &str = "bosonGetToolsProcTable";
/// `unsafe extern "C" fn(version: u32, *mut RawSysmanTable) -> u32`
pub const SYSMAN_TABLE_SYMBOL: &str = "bosonGetSysmanProcTable";

/// Raw result code.
pub type RawStatus = u32;
/// Raw handle; `0` is null.
pub type RawHandle = usize;

/// Fixed-size, NUL-terminated string field.
pub type RawName = [c_char; 64];

/// Driver identity.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDriverInfo {
    /// Version of the tables the driver was built against.
    pub version: u32,
    /// [`DriverCategory`](crate::DriverCategory) as a raw value.
    pub category: u32,
    /// Driver name.
    pub name: RawName,
}

impl Default for RawDriverInfo {
    fn default() -> Self {
        Self {
            version: 0,
            category: 0,
            name: [0; 64],
        }
    }
}

/// Device description.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDeviceProperties {
    /// Device name.
    pub name: RawName,
    /// 0 = GPU, 1 = NPU, anything else = other.
    pub device_type: u32,
    /// PCI vendor id.
    pub vendor_id: u32,
    /// Vendor-specific device id.
    pub device_id: u32,
    /// Core clock in MHz.
    pub core_clock_mhz: u32,
}

impl Default for RawDeviceProperties {
    fn default() -> Self {
        Self {
            name: [0; 64],
            device_type: 0,
            vendor_id: 0,
            device_id: 0,
            core_clock_mhz: 0,
        }
    }
}

/// Metric group description.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawMetricGroup {
    /// Group name.
    pub name: RawName,
    /// Description.
    pub description: [c_char; 128],
}

impl Default for RawMetricGroup {
    fn default() -> Self {
        Self {
            name: [0; 64],
            description: [0; 128],
        }
    }
}

/// Device health.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDeviceState {
    /// Non-zero if a reset is required.
    pub reset_required: u32,
    /// Non-zero if the device was repaired.
    pub repaired: u32,
}

/// Enumeration functions follow the two-call idiom: with a null output
/// pointer they write the count, otherwise they fill up to `*count` entries.
pub type DeviceGetFn = unsafe extern "C" fn(count: *mut u32, devices: *mut RawHandle) -> RawStatus;
/// Fills a [`RawDeviceProperties`].
pub type DeviceGetPropertiesFn =
    unsafe extern "C" fn(device: RawHandle, props: *mut RawDeviceProperties) -> RawStatus;
/// Returns the device status code.
pub type DeviceGetStatusFn = unsafe extern "C" fn(device: RawHandle) -> RawStatus;
/// Writes a new context handle.
pub type ContextCreateFn =
    unsafe extern "C" fn(device: RawHandle, context: *mut RawHandle) -> RawStatus;
/// Destroys a context.
pub type ContextDestroyFn = unsafe extern "C" fn(context: RawHandle) -> RawStatus;
/// Two-call enumeration of metric groups.
pub type MetricGroupGetFn =
    unsafe extern "C" fn(device: RawHandle, count: *mut u32, groups: *mut RawMetricGroup) -> RawStatus;
/// Writes debugger attach support (non-zero = supported).
pub type DeviceGetDebugPropertiesFn =
    unsafe extern "C" fn(device: RawHandle, attach_supported: *mut u32) -> RawStatus;
/// Fills a [`RawDeviceState`].
pub type DeviceGetStateFn =
    unsafe extern "C" fn(device: RawHandle, state: *mut RawDeviceState) -> RawStatus;
/// Resets a device.
pub type DeviceResetFn = unsafe extern "C" fn(device: RawHandle, force: u8) -> RawStatus;
/// Writes power draw in milliwatts.
pub type DeviceGetPowerUsageFn =
    unsafe extern "C" fn(device: RawHandle, milliwatts: *mut u64) -> RawStatus;

/// Core layer table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct RawCoreTable {
    pub device_get: Option<DeviceGetFn>,
    pub device_get_properties: Option<DeviceGetPropertiesFn>,
    pub device_get_status: Option<DeviceGetStatusFn>,
    pub context_create: Option<ContextCreateFn>,
    pub context_destroy: Option<ContextDestroyFn>,
}

/// Tools layer table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct RawToolsTable {
    pub metric_group_get: Option<MetricGroupGetFn>,
    pub device_get_debug_properties: Option<DeviceGetDebugPropertiesFn>,
}

/// System management layer table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct RawSysmanTable {
    pub device_get_state: Option<DeviceGetStateFn>,
    pub device_reset: Option<DeviceResetFn>,
    pub device_get_power_usage: Option<DeviceGetPowerUsageFn>,
}

/// `bosonDriverGetInfo`
pub type DriverGetInfoFn = unsafe extern "C" fn(info: *mut RawDriverInfo) -> RawStatus;
/// `bosonDriverInit`
pub type DriverInitFn = unsafe extern "C" fn(flags: u32) -> RawStatus;
/// `bosonGetCoreProcTable`
pub type GetCoreTableFn = unsafe extern "C" fn(version: u32, table: *mut RawCoreTable) -> RawStatus;
/// `bosonGetToolsProcTable`
pub type GetToolsTableFn =
    unsafe extern "C" fn(version: u32, table: *mut RawToolsTable) -> RawStatus;
/// `bosonGetSysmanProcTable`
pub type GetSysmanTableFn =
    unsafe extern "C" fn(version: u32, table: *mut RawSysmanTable) -> RawStatus;

/// Reads a fixed-size C string field, stopping at the first NUL.
pub fn name_to_string(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c.to_ne_bytes()[0])
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Copies `s` into a fixed-size C string field, truncating to leave room for NUL.
pub fn string_to_name<const N: usize>(s: &str) -> [c_char; N] {
    let mut out = [0 as c_char; N];
    for (dst, &src) in out.iter_mut().zip(s.as_bytes().iter().take(N.saturating_sub(1))) {
        *dst = c_char::from_ne_bytes([src]);
    }
    out
}
