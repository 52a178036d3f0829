//! Validated dispatch tables.
//!
//! Each wrapper runs the enabled checks before forwarding to the table it
//! was built around. A failed check is recorded as the thread's last error
//! and returned without reaching any driver.

use std::sync::Arc;

use boson_driver_api::{
    ContextHandle, CoreDdi, DebugProperties, DeviceHandle, DeviceProperties, DeviceState,
    MetricGroup, PowerUsage, Status, SysmanDdi, ToolsDdi,
};

use super::validator::Validator;
use crate::error_state::record_err;
use crate::registry::Registry;

/// What every validated layer checks against.
struct Checks {
    registry: Arc<Registry>,
    validator: Arc<Validator>,
}

impl Checks {
    fn device(&self, device: DeviceHandle) -> Result<(), Status> {
        record_err(self.validator.check_device(self.registry.devices(), device))
    }
}

fn or_status(checked: Result<(), Status>, call: impl FnOnce() -> Status) -> Status {
    match checked {
        Ok(()) => call(),
        Err(status) => status,
    }
}

/// Validated core layer.
pub struct ValidatedCore {
    inner: Arc<dyn CoreDdi>,
    checks: Checks,
}

impl ValidatedCore {
    /// Wraps `inner`, validating against `registry`.
    pub fn new(
        inner: Arc<dyn CoreDdi>,
        registry: Arc<Registry>,
        validator: Arc<Validator>,
    ) -> Self {
        Self {
            inner,
            checks: Checks {
                registry,
                validator,
            },
        }
    }
}

impl CoreDdi for ValidatedCore {
    fn device_get(&self) -> Result<Vec<DeviceHandle>, Status> {
        self.inner.device_get()
    }

    fn device_get_properties(&self, device: DeviceHandle) -> Result<DeviceProperties, Status> {
        self.checks.device(device)?;
        self.inner.device_get_properties(device)
    }

    fn device_get_status(&self, device: DeviceHandle) -> Status {
        or_status(self.checks.device(device), || self.inner.device_get_status(device))
    }

    fn context_create(&self, device: DeviceHandle) -> Result<ContextHandle, Status> {
        self.checks.device(device)?;
        let context = self.inner.context_create(device)?;
        self.checks.validator.context_created(context, device);
        Ok(context)
    }

    fn context_destroy(&self, context: ContextHandle) -> Status {
        let validator = &self.checks.validator;
        or_status(record_err(validator.check_context(context)), || {
            let status = self.inner.context_destroy(context);
            if status.is_success() {
                validator.context_destroyed(context);
            }
            status
        })
    }
}

/// Validated tools layer.
pub struct ValidatedTools {
    inner: Arc<dyn ToolsDdi>,
    checks: Checks,
}

impl ValidatedTools {
    /// Wraps `inner`, validating against `registry`.
    pub fn new(
        inner: Arc<dyn ToolsDdi>,
        registry: Arc<Registry>,
        validator: Arc<Validator>,
    ) -> Self {
        Self {
            inner,
            checks: Checks {
                registry,
                validator,
            },
        }
    }
}

impl ToolsDdi for ValidatedTools {
    fn metric_group_get(&self, device: DeviceHandle) -> Result<Vec<MetricGroup>, Status> {
        self.checks.device(device)?;
        self.inner.metric_group_get(device)
    }

    fn device_get_debug_properties(&self, device: DeviceHandle) -> Result<DebugProperties, Status> {
        self.checks.device(device)?;
        self.inner.device_get_debug_properties(device)
    }
}

/// Validated system management layer.
pub struct ValidatedSysman {
    inner: Arc<dyn SysmanDdi>,
    checks: Checks,
}

impl ValidatedSysman {
    /// Wraps `inner`, validating against `registry`.
    pub fn new(
        inner: Arc<dyn SysmanDdi>,
        registry: Arc<Registry>,
        validator: Arc<Validator>,
    ) -> Self {
        Self {
            inner,
            checks: Checks {
                registry,
                validator,
            },
        }
    }
}

impl SysmanDdi for ValidatedSysman {
    fn device_get_state(&self, device: DeviceHandle) -> Result<DeviceState, Status> {
        self.checks.device(device)?;
        self.inner.device_get_state(device)
    }

    fn device_reset(&self, device: DeviceHandle, force: bool) -> Status {
        let checked = self.checks.device(device).and_then(|()| {
            record_err(self.checks.validator.check_reset(device, force))
        });
        or_status(checked, || self.inner.device_reset(device, force))
    }

    fn device_get_power_usage(&self, device: DeviceHandle) -> Result<PowerUsage, Status> {
        self.checks.device(device)?;
        self.inner.device_get_power_usage(device)
    }
}
