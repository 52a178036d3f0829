//! In-process null driver.
//!
//! [`NullDriver`] implements every layer with deterministic, side-effect
//! free behavior. It is what `BOSON_ENABLE_NULL_DRIVER=1` loads, and what
//! the loader's tests use to stand in for real hardware. Category, device
//! count, and which optional layers exist are all configurable so tests can
//! build any driver mix.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use boson_driver_api::{
    ContextHandle, CoreDdi, DebugProperties, DeviceHandle, DeviceProperties, DeviceState,
    DeviceType, DriverCategory, DriverInfo, DriverModule, InitFlags, MetricGroup, PowerUsage,
    StaticDriverEntry, Status, SysmanDdi, ToolsDdi,
};
use parking_lot::Mutex;

/// Handle values are drawn from one counter so they never collide across
/// null driver instances in the same process.
static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(0x1000);

fn next_handle() -> usize {
    NEXT_HANDLE.fetch_add(0x10, Ordering::Relaxed)
}

boson_driver_api::static_driver_entry!(NULL_GPU_DRIVER, StaticDriverEntry {
    name: "null-gpu",
    category: DriverCategory::Gpu,
    create: create_default,
});

fn create_default() -> Arc<dyn DriverModule> {
    Arc::new(NullDriver::new(NullDriverConfig::default()))
}

/// Knobs for a [`NullDriver`] instance.
#[derive(Debug, Clone)]
pub struct NullDriverConfig {
    /// Reported driver name.
    pub name: String,
    /// Reported category.
    pub category: DriverCategory,
    /// Number of devices exposed.
    pub devices: u32,
    /// If set, `init` fails with this code.
    pub init_failure: Option<Status>,
    /// Provide the tools layer.
    pub tools: bool,
    /// Provide the system management layer.
    pub sysman: bool,
}

impl Default for NullDriverConfig {
    fn default() -> Self {
        Self {
            name: "null-gpu".to_string(),
            category: DriverCategory::Gpu,
            devices: 1,
            init_failure: None,
            tools: true,
            sysman: true,
        }
    }
}

impl NullDriverConfig {
    /// Config for a driver named `name` of `category` with one device.
    pub fn named(name: impl Into<String>, category: DriverCategory) -> Self {
        Self {
            name: name.into(),
            category,
            ..Self::default()
        }
    }

    /// Sets the device count.
    #[must_use]
    pub fn with_devices(mut self, devices: u32) -> Self {
        self.devices = devices;
        self
    }

    /// Makes `init` fail with `status`.
    #[must_use]
    pub fn failing_init(mut self, status: Status) -> Self {
        self.init_failure = Some(status);
        self
    }

    /// Drops the tools and system management layers.
    #[must_use]
    pub fn core_only(mut self) -> Self {
        self.tools = false;
        self.sysman = false;
        self
    }
}

struct Device {
    handle: DeviceHandle,
    lost: AtomicBool,
    resets: AtomicU32,
}

struct Inner {
    config: NullDriverConfig,
    devices: Vec<Device>,
    contexts: Mutex<HashSet<ContextHandle>>,
    init_calls: AtomicU32,
}

impl Inner {
    fn device(&self, handle: DeviceHandle) -> Result<(usize, &Device), Status> {
        self.devices
            .iter()
            .enumerate()
            .find(|(_, d)| d.handle == handle)
            .ok_or(Status::InvalidNullHandle)
    }
}

/// A driver with no hardware behind it.
#[derive(Clone)]
pub struct NullDriver {
    inner: Arc<Inner>,
}

impl NullDriver {
    /// Creates a driver with fresh, process-unique device handles.
    pub fn new(config: NullDriverConfig) -> Self {
        let devices = (0..config.devices)
            .filter_map(|_| DeviceHandle::from_raw(next_handle()))
            .map(|handle| Device {
                handle,
                lost: AtomicBool::new(false),
                resets: AtomicU32::new(0),
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                config,
                devices,
                contexts: Mutex::new(HashSet::new()),
                init_calls: AtomicU32::new(0),
            }),
        }
    }

    /// How many times `init` has been called.
    pub fn init_calls(&self) -> u32 {
        self.inner.init_calls.load(Ordering::SeqCst)
    }

    /// Device handles in enumeration order.
    pub fn device_handles(&self) -> Vec<DeviceHandle> {
        self.inner.devices.iter().map(|d| d.handle).collect()
    }

    /// Marks device `index` as lost until its next reset.
    pub fn lose_device(&self, index: usize) {
        if let Some(device) = self.inner.devices.get(index) {
            device.lost.store(true, Ordering::SeqCst);
        }
    }

    /// Number of live contexts.
    pub fn live_contexts(&self) -> usize {
        self.inner.contexts.lock().len()
    }
}

impl DriverModule for NullDriver {
    fn info(&self) -> DriverInfo {
        DriverInfo::new(self.inner.config.name.clone(), self.inner.config.category)
    }

    fn init(&self, flags: InitFlags) -> Status {
        self.inner.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.inner.config.init_failure {
            return status;
        }
        if !flags.admits(self.inner.config.category) {
            log::debug!(
                "null driver {}: category {} not requested by {flags:?}",
                self.inner.config.name,
                self.inner.config.category
            );
            return Status::Uninitialized;
        }
        Status::Success
    }

    fn core(&self) -> Option<Arc<dyn CoreDdi>> {
        Some(Arc::new(self.clone()))
    }

    fn tools(&self) -> Option<Arc<dyn ToolsDdi>> {
        self.inner.config.tools.then(|| Arc::new(self.clone()) as Arc<dyn ToolsDdi>)
    }

    fn sysman(&self) -> Option<Arc<dyn SysmanDdi>> {
        self.inner.config.sysman.then(|| Arc::new(self.clone()) as Arc<dyn SysmanDdi>)
    }
}

impl CoreDdi for NullDriver {
    fn device_get(&self) -> Result<Vec<DeviceHandle>, Status> {
        Ok(self.device_handles())
    }

    fn device_get_properties(&self, device: DeviceHandle) -> Result<DeviceProperties, Status> {
        let (index, _) = self.inner.device(device)?;
        let device_type = match self.inner.config.category {
            DriverCategory::Npu => DeviceType::Npu,
            DriverCategory::Other => DeviceType::Other,
            _ => DeviceType::Gpu,
        };
        Ok(DeviceProperties {
            name: format!("{} device {index}", self.inner.config.name),
            device_type,
            vendor_id: 0,
            device_id: u32::try_from(index).unwrap_or(u32::MAX),
            core_clock_mhz: 1000,
        })
    }

    fn device_get_status(&self, device: DeviceHandle) -> Status {
        match self.inner.device(device) {
            Ok((_, d)) if d.lost.load(Ordering::SeqCst) => Status::DeviceLost,
            Ok(_) => Status::Success,
            Err(status) => status,
        }
    }

    fn context_create(&self, device: DeviceHandle) -> Result<ContextHandle, Status> {
        let (_, d) = self.inner.device(device)?;
        if d.lost.load(Ordering::SeqCst) {
            return Err(Status::DeviceLost);
        }
        let context = ContextHandle::from_raw(next_handle()).ok_or(Status::OutOfHostMemory)?;
        self.inner.contexts.lock().insert(context);
        Ok(context)
    }

    fn context_destroy(&self, context: ContextHandle) -> Status {
        if self.inner.contexts.lock().remove(&context) {
            Status::Success
        } else {
            Status::InvalidNullHandle
        }
    }
}

impl ToolsDdi for NullDriver {
    fn metric_group_get(&self, device: DeviceHandle) -> Result<Vec<MetricGroup>, Status> {
        self.inner.device(device)?;
        Ok(vec![
            MetricGroup {
                name: "ComputeBasic".to_string(),
                description: "Compute engine utilization".to_string(),
            },
            MetricGroup {
                name: "MemoryProfile".to_string(),
                description: "Memory bandwidth counters".to_string(),
            },
        ])
    }

    fn device_get_debug_properties(&self, device: DeviceHandle) -> Result<DebugProperties, Status> {
        self.inner.device(device)?;
        Ok(DebugProperties {
            attach_supported: true,
        })
    }
}

impl SysmanDdi for NullDriver {
    fn device_get_state(&self, device: DeviceHandle) -> Result<DeviceState, Status> {
        let (_, d) = self.inner.device(device)?;
        Ok(DeviceState {
            reset_required: d.lost.load(Ordering::SeqCst),
            repaired: d.resets.load(Ordering::SeqCst) > 0,
        })
    }

    fn device_reset(&self, device: DeviceHandle, force: bool) -> Status {
        let (_, d) = match self.inner.device(device) {
            Ok(found) => found,
            Err(status) => return status,
        };
        if !force && !self.inner.contexts.lock().is_empty() {
            return Status::HandleObjectInUse;
        }
        d.lost.store(false, Ordering::SeqCst);
        d.resets.fetch_add(1, Ordering::SeqCst);
        Status::Success
    }

    fn device_get_power_usage(&self, device: DeviceHandle) -> Result<PowerUsage, Status> {
        let (index, _) = self.inner.device(device)?;
        Ok(PowerUsage {
            milliwatts: 15_000 + 1_000 * index as u64,
        })
    }
}
