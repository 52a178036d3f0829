//! Traced dispatch tables.
//!
//! Each wrapper forwards to the table it was built around, bracketing the
//! call with the prologues and epilogues of every enabled tracer.

use std::any::Any;
use std::cell::Cell;
use std::sync::Arc;

use boson_driver_api::{
    ContextHandle, CoreDdi, DebugProperties, DeviceHandle, DeviceProperties, DeviceState,
    MetricGroup, PowerUsage, Status, SysmanDdi, ToolsDdi,
};

use super::callbacks::{ApiFunction, CallbackData, TraceParams};
use super::tracer::TracerRegistry;

thread_local! {
    /// Set while this thread runs a callback.
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

struct CallbackGuard {
    previous: bool,
}

impl CallbackGuard {
    fn enter() -> Self {
        Self {
            previous: IN_CALLBACK.replace(true),
        }
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        IN_CALLBACK.set(self.previous);
    }
}

/// Status a traced call reports to its epilogues.
pub trait CallOutcome {
    /// The status code of this outcome.
    fn status(&self) -> Status;
}

impl CallOutcome for Status {
    fn status(&self) -> Status {
        *self
    }
}

impl<T> CallOutcome for Result<T, Status> {
    fn status(&self) -> Status {
        match self {
            Ok(_) => Status::Success,
            Err(status) => *status,
        }
    }
}

/// Parameters of calls taking only a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParams {
    /// Target device.
    pub device: DeviceHandle,
}

/// Parameters of `context_destroy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextParams {
    /// Context being destroyed.
    pub context: ContextHandle,
}

/// Parameters of `device_reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResetParams {
    /// Target device.
    pub device: DeviceHandle,
    /// Reset even if contexts are live.
    pub force: bool,
}

/// Runs `call` between the prologues and epilogues registered for `function`.
///
/// Calls made from inside a callback are not traced again.
pub fn traced_call<R: CallOutcome>(
    tracers: &TracerRegistry,
    function: ApiFunction,
    params: &dyn TraceParams,
    call: impl FnOnce() -> R,
) -> R {
    if IN_CALLBACK.get() {
        return call();
    }
    let snapshot = tracers.snapshot();
    if snapshot.is_empty() {
        return call();
    }

    let mut instance: Vec<Option<Box<dyn Any + Send>>> =
        snapshot.iter().map(|_| None).collect();

    {
        let _guard = CallbackGuard::enter();
        for (active, slot) in snapshot.iter().zip(instance.iter_mut()) {
            if let Some(prologue) = active.prologues().get(function) {
                let mut data =
                    CallbackData::new(function, params, None, active.tracer().user_data(), slot);
                prologue(&mut data);
            }
        }
    }

    let result = call();

    {
        let _guard = CallbackGuard::enter();
        let status = result.status();
        for (active, slot) in snapshot.iter().zip(instance.iter_mut()) {
            if let Some(epilogue) = active.epilogues().get(function) {
                let mut data = CallbackData::new(
                    function,
                    params,
                    Some(status),
                    active.tracer().user_data(),
                    slot,
                );
                epilogue(&mut data);
            }
        }
    }

    result
}

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

/// Traced core layer.
pub struct TracedCore {
    inner: Arc<dyn CoreDdi>,
    tracers: Arc<TracerRegistry>,
}

impl TracedCore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn CoreDdi>, tracers: Arc<TracerRegistry>) -> Self {
        Self { inner, tracers }
    }
}

impl CoreDdi for TracedCore {
    fn device_get(&self) -> Result<Vec<DeviceHandle>, Status> {
        traced_call(&self.tracers, ApiFunction::DeviceGet, &(), || {
            self.inner.device_get()
        })
    }

    fn device_get_properties(&self, device: DeviceHandle) -> Result<DeviceProperties, Status> {
        traced_call(
            &self.tracers,
            ApiFunction::DeviceGetProperties,
            &DeviceParams { device },
            || self.inner.device_get_properties(device),
        )
    }

    fn device_get_status(&self, device: DeviceHandle) -> Status {
        traced_call(
            &self.tracers,
            ApiFunction::DeviceGetStatus,
            &DeviceParams { device },
            || self.inner.device_get_status(device),
        )
    }

    fn context_create(&self, device: DeviceHandle) -> Result<ContextHandle, Status> {
        traced_call(
            &self.tracers,
            ApiFunction::ContextCreate,
            &DeviceParams { device },
            || self.inner.context_create(device),
        )
    }

    fn context_destroy(&self, context: ContextHandle) -> Status {
        traced_call(
            &self.tracers,
            ApiFunction::ContextDestroy,
            &ContextParams { context },
            || self.inner.context_destroy(context),
        )
    }
}

/// Traced tools layer.
pub struct TracedTools {
    inner: Arc<dyn ToolsDdi>,
    tracers: Arc<TracerRegistry>,
}

impl TracedTools {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn ToolsDdi>, tracers: Arc<TracerRegistry>) -> Self {
        Self { inner, tracers }
    }
}

impl ToolsDdi for TracedTools {
    fn metric_group_get(&self, device: DeviceHandle) -> Result<Vec<MetricGroup>, Status> {
        traced_call(
            &self.tracers,
            ApiFunction::MetricGroupGet,
            &DeviceParams { device },
            || self.inner.metric_group_get(device),
        )
    }

    fn device_get_debug_properties(&self, device: DeviceHandle) -> Result<DebugProperties, Status> {
        traced_call(
            &self.tracers,
            ApiFunction::DeviceGetDebugProperties,
            &DeviceParams { device },
            || self.inner.device_get_debug_properties(device),
        )
    }
}

/// Traced system management layer.
pub struct TracedSysman {
    inner: Arc<dyn SysmanDdi>,
    tracers: Arc<TracerRegistry>,
}

impl TracedSysman {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn SysmanDdi>, tracers: Arc<TracerRegistry>) -> Self {
        Self { inner, tracers }
    }
}

impl SysmanDdi for TracedSysman {
    fn device_get_state(&self, device: DeviceHandle) -> Result<DeviceState, Status> {
        traced_call(
            &self.tracers,
            ApiFunction::DeviceGetState,
            &DeviceParams { device },
            || self.inner.device_get_state(device),
        )
    }

    fn device_reset(&self, device: DeviceHandle, force: bool) -> Status {
        traced_call(
            &self.tracers,
            ApiFunction::DeviceReset,
            &DeviceResetParams { device, force },
            || self.inner.device_reset(device, force),
        )
    }

    fn device_get_power_usage(&self, device: DeviceHandle) -> Result<PowerUsage, Status> {
        traced_call(
            &self.tracers,
            ApiFunction::DeviceGetPowerUsage,
            &DeviceParams { device },
            || self.inner.device_get_power_usage(device),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use boson_null_driver::{NullDriver, NullDriverConfig};

    use crate::tracing::callbacks::CallbackTable;
    use crate::tracing::tracer::{TracerDdi, TracerDesc};

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging_tracer(tracers: &TracerRegistry, tag: &'static str, log: &Log) {
        let handle = tracers.tracer_create(TracerDesc::new(tag)).unwrap();
        let pro_log = Arc::clone(log);
        let epi_log = Arc::clone(log);
        let mut prologues = CallbackTable::new();
        let mut epilogues = CallbackTable::new();
        for function in ApiFunction::ALL {
            let pro_log = Arc::clone(&pro_log);
            prologues.set(function, move |data| {
                let tag = data.user_data::<&str>().copied().unwrap_or("?");
                pro_log.lock().push(format!("{tag} pre {}", data.function()));
            });
            let epi_log = Arc::clone(&epi_log);
            epilogues.set(function, move |data| {
                let tag = data.user_data::<&str>().copied().unwrap_or("?");
                epi_log
                    .lock()
                    .push(format!("{tag} post {} {:?}", data.function(), data.result()));
            });
        }
        tracers.tracer_set_prologues(handle, prologues);
        tracers.tracer_set_epilogues(handle, epilogues);
        tracers.tracer_set_enabled(handle, true);
    }

    fn null_core() -> (NullDriver, Arc<dyn CoreDdi>) {
        let driver = NullDriver::new(NullDriverConfig::default());
        let core: Arc<dyn CoreDdi> = Arc::new(driver.clone());
        (driver, core)
    }

    #[test]
    fn no_tracers_is_a_plain_forward() {
        let tracers = Arc::new(TracerRegistry::new());
        let (driver, core) = null_core();
        let traced = TracedCore::new(core, tracers);
        assert_eq!(traced.device_get().unwrap(), driver.device_handles());
    }

    #[test]
    fn callbacks_bracket_the_call_in_enable_order() {
        let tracers = Arc::new(TracerRegistry::new());
        let log: Log = Arc::default();
        logging_tracer(&tracers, "a", &log);
        logging_tracer(&tracers, "b", &log);
        let (driver, core) = null_core();
        let traced = TracedCore::new(core, Arc::clone(&tracers));

        driver.lose_device(0);
        let status = traced.device_get_status(driver.device_handles()[0]);
        assert_eq!(status, Status::DeviceLost);
        assert_eq!(
            *log.lock(),
            [
                "a pre device_get_status",
                "b pre device_get_status",
                "a post device_get_status Some(DeviceLost)",
                "b post device_get_status Some(DeviceLost)",
            ]
        );
    }

    #[test]
    fn instance_data_flows_from_prologue_to_epilogue() {
        let tracers = Arc::new(TracerRegistry::new());
        let seen = Arc::new(Mutex::new(None));
        let handle = tracers.tracer_create(TracerDesc::default()).unwrap();
        let sink = Arc::clone(&seen);
        tracers.tracer_set_prologues(
            handle,
            CallbackTable::new().with(ApiFunction::DeviceReset, |data| {
                let force = data.params_as::<DeviceResetParams>().map(|p| p.force);
                data.set_instance_data(Box::new(force));
            }),
        );
        tracers.tracer_set_epilogues(
            handle,
            CallbackTable::new().with(ApiFunction::DeviceReset, move |data| {
                let stored = data
                    .take_instance_data()
                    .and_then(|b| b.downcast::<Option<bool>>().ok());
                *sink.lock() = stored.map(|b| *b);
            }),
        );
        tracers.tracer_set_enabled(handle, true);

        let driver = NullDriver::new(NullDriverConfig::default());
        let traced = TracedSysman::new(Arc::new(driver.clone()), Arc::clone(&tracers));
        assert_eq!(
            traced.device_reset(driver.device_handles()[0], true),
            Status::Success
        );
        assert_eq!(*seen.lock(), Some(Some(true)));
    }

    #[test]
    fn calls_from_callbacks_are_not_traced() {
        let tracers = Arc::new(TracerRegistry::new());
        let (driver, core) = null_core();
        let traced = Arc::new(TracedCore::new(core, Arc::clone(&tracers)));
        let count = Arc::new(Mutex::new(0u32));

        let handle = tracers.tracer_create(TracerDesc::default()).unwrap();
        let inner = Arc::clone(&traced);
        let counter = Arc::clone(&count);
        let device = driver.device_handles()[0];
        tracers.tracer_set_prologues(
            handle,
            CallbackTable::new()
                .with(ApiFunction::DeviceGet, move |_| {
                    let _ = inner.device_get_status(device);
                })
                .with(ApiFunction::DeviceGetStatus, move |_| {
                    *counter.lock() += 1;
                }),
        );
        tracers.tracer_set_enabled(handle, true);

        traced.device_get().unwrap();
        assert_eq!(*count.lock(), 0);
        let _ = traced.device_get_status(device);
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn outcome_of_results() {
        assert_eq!(Ok::<u8, Status>(1).status(), Status::Success);
        assert_eq!(Err::<u8, Status>(Status::NotReady).status(), Status::NotReady);
        assert_eq!(Status::DeviceLost.status(), Status::DeviceLost);
    }
}
