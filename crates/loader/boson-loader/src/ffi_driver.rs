//! Drivers reached through the C ABI.
//!
//! [`FfiDriver`] wraps the entry points and tables a driver library
//! exports and presents them as a [`DriverModule`]. Empty table slots
//! surface as [`Status::UnsupportedFeature`] through the DDI defaults.
//!
//! Every function pointer lives next to an `Arc` of the library it came
//! from, in the driver and in each layer interface the driver hands out.
//! The library is unloaded only once nothing can reach its code.

use std::fmt;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use boson_driver_api::ffi::{
    self, DriverGetInfoFn, DriverInitFn, GetCoreTableFn, GetSysmanTableFn, GetToolsTableFn,
    RawCoreTable, RawDeviceProperties, RawDeviceState, RawDriverInfo, RawHandle, RawMetricGroup,
    RawSysmanTable, RawToolsTable,
};
use boson_driver_api::{
    ContextHandle, CoreDdi, DebugProperties, DeviceHandle, DeviceProperties, DeviceState,
    DeviceType, DriverCategory, DriverInfo, DriverModule, InitFlags, MetricGroup, PowerUsage,
    Status, SysmanDdi, ToolsDdi,
};

use crate::error::LoaderError;
use crate::module::{NativeModule, symbol_as};

/// A driver implemented by a shared library.
pub struct FfiDriver {
    library: Arc<dyn NativeModule>,
    info: DriverInfo,
    init: DriverInitFn,
    core: Option<RawCoreTable>,
    tools: Option<RawToolsTable>,
    sysman: Option<RawSysmanTable>,
}

impl FfiDriver {
    /// Resolves every entry point from `module`.
    ///
    /// # Errors
    ///
    /// Fails if the identity or init entry points are missing, the driver
    /// reports an incompatible version, or a table getter fails.
    ///
    /// # Safety
    ///
    /// `module` must follow the [`ffi`] contract.
    pub unsafe fn from_module(module: Arc<dyn NativeModule>) -> Result<Self, LoaderError> {
        let path = module.path().to_path_buf();
        let missing = |symbol| LoaderError::MissingSymbol {
            path: path.clone(),
            symbol,
        };

        // SAFETY: Symbol types follow the ffi contract.
        let get_info: DriverGetInfoFn = unsafe { symbol_as(&*module, ffi::DRIVER_GET_INFO_SYMBOL) }
            .ok_or_else(|| missing(ffi::DRIVER_GET_INFO_SYMBOL))?;
        let init: DriverInitFn = unsafe { symbol_as(&*module, ffi::DRIVER_INIT_SYMBOL) }
            .ok_or_else(|| missing(ffi::DRIVER_INIT_SYMBOL))?;

        let mut raw_info = RawDriverInfo::default();
        // SAFETY: `raw_info` is a valid, writable RawDriverInfo.
        let status = Status::from_raw(unsafe { get_info(&raw mut raw_info) });
        if !status.is_success() {
            return Err(LoaderError::DriverCall {
                path,
                call: ffi::DRIVER_GET_INFO_SYMBOL,
                status,
            });
        }
        if ffi::version_major(raw_info.version) != ffi::TABLE_VERSION_MAJOR {
            return Err(LoaderError::VersionMismatch {
                path,
                found: raw_info.version,
                expected: ffi::TABLE_VERSION,
            });
        }
        let info = DriverInfo::new(
            ffi::name_to_string(&raw_info.name),
            DriverCategory::from_raw(raw_info.category),
        );

        // SAFETY: Symbol types follow the ffi contract.
        let core = unsafe {
            fetch_table::<RawCoreTable, GetCoreTableFn>(&*module, ffi::CORE_TABLE_SYMBOL, |f, t| {
                f(ffi::TABLE_VERSION, t)
            })
        }?;
        let tools = unsafe {
            fetch_table::<RawToolsTable, GetToolsTableFn>(&*module, ffi::TOOLS_TABLE_SYMBOL, |f, t| {
                f(ffi::TABLE_VERSION, t)
            })
        }?;
        let sysman = unsafe {
            fetch_table::<RawSysmanTable, GetSysmanTableFn>(
                &*module,
                ffi::SYSMAN_TABLE_SYMBOL,
                |f, t| f(ffi::TABLE_VERSION, t),
            )
        }?;

        Ok(Self::from_parts(module, info, init, core, tools, sysman))
    }

    /// Assembles a driver from parts already resolved out of `library`.
    pub fn from_parts(
        library: Arc<dyn NativeModule>,
        info: DriverInfo,
        init: DriverInitFn,
        core: Option<RawCoreTable>,
        tools: Option<RawToolsTable>,
        sysman: Option<RawSysmanTable>,
    ) -> Self {
        Self {
            library,
            info,
            init,
            core,
            tools,
            sysman,
        }
    }

    /// Library the driver came from.
    pub fn path(&self) -> &Path {
        self.library.path()
    }
}

impl fmt::Debug for FfiDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfiDriver")
            .field("path", &self.path())
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Calls a table getter if the driver exports it.
///
/// # Safety
///
/// `G` must be the getter's real signature.
unsafe fn fetch_table<T: Default, G: Copy>(
    module: &dyn NativeModule,
    symbol: &'static str,
    call: impl FnOnce(G, *mut T) -> u32,
) -> Result<Option<T>, LoaderError> {
    // SAFETY: Forwarded to the caller.
    let Some(getter) = (unsafe { symbol_as::<G>(module, symbol) }) else {
        log::debug!("{}: no {symbol}", module.path().display());
        return Ok(None);
    };
    let mut table = T::default();
    let status = Status::from_raw(call(getter, &raw mut table));
    match status {
        Status::Success => Ok(Some(table)),
        Status::UnsupportedFeature => Ok(None),
        status => Err(LoaderError::DriverCall {
            path: module.path().to_path_buf(),
            call: symbol,
            status,
        }),
    }
}

impl DriverModule for FfiDriver {
    fn info(&self) -> DriverInfo {
        self.info.clone()
    }

    fn init(&self, flags: InitFlags) -> Status {
        // SAFETY: Resolved from the driver's export table.
        Status::from_raw(unsafe { (self.init)(flags.bits()) })
    }

    fn core(&self) -> Option<Arc<dyn CoreDdi>> {
        let library = Arc::clone(&self.library);
        self.core
            .map(|table| Arc::new(FfiCore { table, library }) as Arc<dyn CoreDdi>)
    }

    fn tools(&self) -> Option<Arc<dyn ToolsDdi>> {
        let library = Arc::clone(&self.library);
        self.tools
            .map(|table| Arc::new(FfiTools { table, library }) as Arc<dyn ToolsDdi>)
    }

    fn sysman(&self) -> Option<Arc<dyn SysmanDdi>> {
        let library = Arc::clone(&self.library);
        self.sysman
            .map(|table| Arc::new(FfiSysman { table, library }) as Arc<dyn SysmanDdi>)
    }
}

fn check(raw: u32) -> Result<(), Status> {
    Status::from_raw(raw).into_result()
}

fn device_handle(raw: RawHandle) -> Result<DeviceHandle, Status> {
    DeviceHandle::from_raw(raw).ok_or(Status::InvalidNullHandle)
}

/// Runs the two-call enumeration idiom.
fn enumerate<T: Clone + Default>(
    mut call: impl FnMut(*mut u32, *mut T) -> u32,
) -> Result<Vec<T>, Status> {
    let mut count = 0u32;
    check(call(&raw mut count, ptr::null_mut()))?;
    let mut items = vec![T::default(); count as usize];
    check(call(&raw mut count, items.as_mut_ptr()))?;
    items.truncate(count as usize);
    Ok(items)
}

// `library` is never read; holding it keeps `table`'s code mapped.

struct FfiCore {
    table: RawCoreTable,
    #[allow(dead_code)]
    library: Arc<dyn NativeModule>,
}

// SAFETY (all impls below): slots come from the driver's own table getter
// and follow the ffi contract; every out-pointer passed is valid and
// writable for the duration of the call.
impl CoreDdi for FfiCore {
    fn device_get(&self) -> Result<Vec<DeviceHandle>, Status> {
        let f = self.table.device_get.ok_or(Status::UnsupportedFeature)?;
        let raw = enumerate(|count, out| unsafe { f(count, out) })?;
        raw.into_iter().map(device_handle).collect()
    }

    fn device_get_properties(&self, device: DeviceHandle) -> Result<DeviceProperties, Status> {
        let f = self.table.device_get_properties.ok_or(Status::UnsupportedFeature)?;
        let mut raw = RawDeviceProperties::default();
        check(unsafe { f(device.as_raw(), &raw mut raw) })?;
        Ok(DeviceProperties {
            name: ffi::name_to_string(&raw.name),
            device_type: match raw.device_type {
                0 => DeviceType::Gpu,
                1 => DeviceType::Npu,
                _ => DeviceType::Other,
            },
            vendor_id: raw.vendor_id,
            device_id: raw.device_id,
            core_clock_mhz: raw.core_clock_mhz,
        })
    }

    fn device_get_status(&self, device: DeviceHandle) -> Status {
        match self.table.device_get_status {
            Some(f) => Status::from_raw(unsafe { f(device.as_raw()) }),
            None => Status::UnsupportedFeature,
        }
    }

    fn context_create(&self, device: DeviceHandle) -> Result<ContextHandle, Status> {
        let f = self.table.context_create.ok_or(Status::UnsupportedFeature)?;
        let mut raw: RawHandle = 0;
        check(unsafe { f(device.as_raw(), &raw mut raw) })?;
        ContextHandle::from_raw(raw).ok_or(Status::InvalidNullHandle)
    }

    fn context_destroy(&self, context: ContextHandle) -> Status {
        match self.table.context_destroy {
            Some(f) => Status::from_raw(unsafe { f(context.as_raw()) }),
            None => Status::UnsupportedFeature,
        }
    }
}

struct FfiTools {
    table: RawToolsTable,
    #[allow(dead_code)]
    library: Arc<dyn NativeModule>,
}

impl ToolsDdi for FfiTools {
    fn metric_group_get(&self, device: DeviceHandle) -> Result<Vec<MetricGroup>, Status> {
        let f = self.table.metric_group_get.ok_or(Status::UnsupportedFeature)?;
        let raw = enumerate(|count, out: *mut RawMetricGroup| unsafe {
            f(device.as_raw(), count, out)
        })?;
        Ok(raw
            .iter()
            .map(|g| MetricGroup {
                name: ffi::name_to_string(&g.name),
                description: ffi::name_to_string(&g.description),
            })
            .collect())
    }

    fn device_get_debug_properties(&self, device: DeviceHandle) -> Result<DebugProperties, Status> {
        let f = self
            .table
            .device_get_debug_properties
            .ok_or(Status::UnsupportedFeature)?;
        let mut attach = 0u32;
        check(unsafe { f(device.as_raw(), &raw mut attach) })?;
        Ok(DebugProperties {
            attach_supported: attach != 0,
        })
    }
}

struct FfiSysman {
    table: RawSysmanTable,
    #[allow(dead_code)]
    library: Arc<dyn NativeModule>,
}

impl SysmanDdi for FfiSysman {
    fn device_get_state(&self, device: DeviceHandle) -> Result<DeviceState, Status> {
        let f = self.table.device_get_state.ok_or(Status::UnsupportedFeature)?;
        let mut raw = RawDeviceState::default();
        check(unsafe { f(device.as_raw(), &raw mut raw) })?;
        Ok(DeviceState {
            reset_required: raw.reset_required != 0,
            repaired: raw.repaired != 0,
        })
    }

    fn device_reset(&self, device: DeviceHandle, force: bool) -> Status {
        match self.table.device_reset {
            Some(f) => Status::from_raw(unsafe { f(device.as_raw(), u8::from(force)) }),
            None => Status::UnsupportedFeature,
        }
    }

    fn device_get_power_usage(&self, device: DeviceHandle) -> Result<PowerUsage, Status> {
        let f = self
            .table
            .device_get_power_usage
            .ok_or(Status::UnsupportedFeature)?;
        let mut milliwatts = 0u64;
        check(unsafe { f(device.as_raw(), &raw mut milliwatts) })?;
        Ok(PowerUsage { milliwatts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::ffi::c_void;
    use std::path::PathBuf;

    const DEVICES: [RawHandle; 2] = [0xd00, 0xd10];

    unsafe extern "C" fn get_info(info: *mut RawDriverInfo) -> u32 {
        unsafe {
            (*info).version = ffi::TABLE_VERSION;
            (*info).category = DriverCategory::Npu.to_raw();
            (*info).name = ffi::string_to_name("ffi-npu");
        }
        0
    }

    unsafe extern "C" fn get_info_v2(info: *mut RawDriverInfo) -> u32 {
        unsafe {
            (*info).version = ffi::make_version(2, 0);
        }
        0
    }

    unsafe extern "C" fn init(flags: u32) -> u32 {
        if flags & InitFlags::GPU_ONLY.bits() != 0 {
            Status::Uninitialized.to_raw()
        } else {
            0
        }
    }

    unsafe extern "C" fn device_get(count: *mut u32, devices: *mut RawHandle) -> u32 {
        unsafe {
            if devices.is_null() {
                *count = DEVICES.len() as u32;
            } else {
                let n = (*count as usize).min(DEVICES.len());
                ptr::copy_nonoverlapping(DEVICES.as_ptr(), devices, n);
                *count = n as u32;
            }
        }
        0
    }

    unsafe extern "C" fn device_get_status(device: RawHandle) -> u32 {
        if device == DEVICES[1] {
            Status::DeviceLost.to_raw()
        } else {
            0
        }
    }

    unsafe extern "C" fn get_core_table(version: u32, table: *mut RawCoreTable) -> u32 {
        if ffi::version_major(version) != ffi::TABLE_VERSION_MAJOR {
            return Status::UnsupportedVersion.to_raw();
        }
        unsafe {
            (*table).device_get = Some(device_get);
            (*table).device_get_status = Some(device_get_status);
        }
        0
    }

    unsafe extern "C" fn power(_device: RawHandle, milliwatts: *mut u64) -> u32 {
        unsafe { *milliwatts = 1234 };
        0
    }

    struct FakeLibrary {
        path: PathBuf,
        symbols: HashMap<&'static str, usize>,
    }

    impl NativeModule for FakeLibrary {
        fn path(&self) -> &Path {
            &self.path
        }

        unsafe fn symbol(&self, name: &str) -> Option<*const c_void> {
            self.symbols.get(name).map(|&a| a as *const c_void)
        }
    }

    fn library(symbols: &[(&'static str, usize)]) -> Arc<dyn NativeModule> {
        Arc::new(FakeLibrary {
            path: PathBuf::from("libboson_driver_fake.so"),
            symbols: symbols.iter().copied().collect(),
        })
    }

    fn full_library() -> Arc<dyn NativeModule> {
        library(&[
            (ffi::DRIVER_GET_INFO_SYMBOL, get_info as usize),
            (ffi::DRIVER_INIT_SYMBOL, init as usize),
            (ffi::CORE_TABLE_SYMBOL, get_core_table as usize),
        ])
    }

    #[test]
    fn resolves_identity_and_tables() {
        let driver = unsafe { FfiDriver::from_module(full_library()) }.unwrap();
        assert_eq!(driver.info(), DriverInfo::new("ffi-npu", DriverCategory::Npu));
        assert!(driver.core().is_some());
        assert!(driver.tools().is_none());
        assert!(driver.sysman().is_none());
    }

    #[test]
    fn init_passes_flags() {
        let driver = unsafe { FfiDriver::from_module(full_library()) }.unwrap();
        assert_eq!(driver.init(InitFlags::NPU_ONLY), Status::Success);
        assert_eq!(driver.init(InitFlags::GPU_ONLY), Status::Uninitialized);
    }

    #[test]
    fn core_table_calls_through() {
        let driver = unsafe { FfiDriver::from_module(full_library()) }.unwrap();
        let core = driver.core().unwrap();
        let devices = core.device_get().unwrap();
        assert_eq!(
            devices.iter().map(|d| d.as_raw()).collect::<Vec<_>>(),
            DEVICES.to_vec()
        );
        assert_eq!(core.device_get_status(devices[0]), Status::Success);
        assert_eq!(core.device_get_status(devices[1]), Status::DeviceLost);
    }

    #[test]
    fn empty_slots_are_unsupported() {
        let driver = unsafe { FfiDriver::from_module(full_library()) }.unwrap();
        let core = driver.core().unwrap();
        let device = DeviceHandle::from_raw(DEVICES[0]).unwrap();
        assert_eq!(core.context_create(device), Err(Status::UnsupportedFeature));
        assert_eq!(
            core.device_get_properties(device),
            Err(Status::UnsupportedFeature)
        );
    }

    #[test]
    fn layers_keep_the_library_loaded() {
        let lib = full_library();
        let driver = unsafe { FfiDriver::from_module(Arc::clone(&lib)) }.unwrap();
        assert_eq!(driver.path(), Path::new("libboson_driver_fake.so"));
        let core = driver.core().unwrap();
        drop(driver);
        // The test's handle plus the core interface.
        assert_eq!(Arc::strong_count(&lib), 2);
        drop(core);
        assert_eq!(Arc::strong_count(&lib), 1);
    }

    #[test]
    fn missing_init_symbol() {
        let lib = library(&[(ffi::DRIVER_GET_INFO_SYMBOL, get_info as usize)]);
        let err = unsafe { FfiDriver::from_module(lib) }.unwrap_err();
        assert!(matches!(
            err,
            LoaderError::MissingSymbol {
                symbol: ffi::DRIVER_INIT_SYMBOL,
                ..
            }
        ));
    }

    #[test]
    fn rejects_other_major_version() {
        let lib = library(&[
            (ffi::DRIVER_GET_INFO_SYMBOL, get_info_v2 as usize),
            (ffi::DRIVER_INIT_SYMBOL, init as usize),
        ]);
        let err = unsafe { FfiDriver::from_module(lib) }.unwrap_err();
        assert!(matches!(err, LoaderError::VersionMismatch { .. }));
    }

    #[test]
    fn sysman_from_parts() {
        let sysman = RawSysmanTable {
            device_get_power_usage: Some(power),
            ..RawSysmanTable::default()
        };
        let driver = FfiDriver::from_parts(
            library(&[]),
            DriverInfo::new("inline", DriverCategory::Gpu),
            init,
            None,
            None,
            Some(sysman),
        );
        let device = DeviceHandle::from_raw(1).unwrap();
        let sysman = driver.sysman().unwrap();
        assert_eq!(sysman.device_get_power_usage(device).unwrap().milliwatts, 1234);
        assert_eq!(sysman.device_reset(device, true), Status::UnsupportedFeature);
        assert!(driver.core().is_none());
    }
}
