//! Process-wide entry points.
//!
//! Every function here goes through the one [`LoaderContext`] returned by
//! [`global`], created from the process environment on first use. Each
//! dispatched call checks the teardown flag, initializes its layer on first
//! use, then forwards through the active table.

use boson_core::DeviceId;
use boson_core::sync::OnceResult;
use boson_driver_api::{
    ContextHandle, DebugProperties, DeviceHandle, DeviceProperties, DeviceState, InitFlags,
    MetricGroup, PowerUsage, Status,
};

use crate::config::ProcessEnv;
use crate::context::{LoaderBuilder, LoaderContext};
use crate::driver::DriverView;
use crate::tracing::{CallbackTable, TracerDesc, TracerHandle};

static GLOBAL: OnceResult<LoaderContext> = OnceResult::new();

/// The process-wide loader context.
pub fn global() -> &'static LoaderContext {
    GLOBAL.get_or_init(|| {
        let builder = LoaderBuilder::from_env(&ProcessEnv).unwrap_or_else(|err| {
            log::error!("invalid loader configuration, using defaults: {err}");
            LoaderBuilder::default()
        });
        builder.build()
    })
}

/// Begins process-wide teardown. Every later call fails with
/// [`Status::Uninitialized`].
pub fn shutdown() {
    global().shutdown();
}

/// See [`LoaderContext::init`].
pub fn init(flags: InitFlags) -> Status {
    global().init(flags)
}

/// See [`LoaderContext::init_drivers`].
///
/// # Errors
///
/// [`Status::Uninitialized`].
pub fn init_drivers(flags: InitFlags) -> Result<Vec<DriverView>, Status> {
    global().init_drivers(flags)
}

/// Flat identifier of `device`.
pub fn device_id(device: DeviceHandle) -> DeviceId {
    global().device_id(device)
}

/// Device numbered `id`.
pub fn device_handle(id: DeviceId) -> Option<DeviceHandle> {
    global().device_handle(id)
}

/// See [`LoaderContext::enable_tracing_layer`].
pub fn enable_tracing_layer() -> Status {
    global().enable_tracing_layer()
}

/// See [`LoaderContext::disable_tracing_layer`].
pub fn disable_tracing_layer() -> Status {
    global().disable_tracing_layer()
}

/// Description of the last failure recorded on this thread.
pub fn last_error_description() -> Option<&'static str> {
    crate::error_state::last_error_description()
}

/// See [`LoaderContext::tracer_create`].
///
/// # Errors
///
/// [`Status::Uninitialized`] after teardown.
pub fn tracer_create(desc: TracerDesc) -> Result<TracerHandle, Status> {
    global().tracer_create(desc)
}

/// See [`LoaderContext::tracer_destroy`].
pub fn tracer_destroy(tracer: TracerHandle) -> Status {
    global().tracer_destroy(tracer)
}

/// See [`LoaderContext::tracer_set_prologues`].
pub fn tracer_set_prologues(tracer: TracerHandle, table: CallbackTable) -> Status {
    global().tracer_set_prologues(tracer, table)
}

/// See [`LoaderContext::tracer_set_epilogues`].
pub fn tracer_set_epilogues(tracer: TracerHandle, table: CallbackTable) -> Status {
    global().tracer_set_epilogues(tracer, table)
}

/// See [`LoaderContext::tracer_reset_all_callbacks`].
pub fn tracer_reset_all_callbacks(tracer: TracerHandle) -> Status {
    global().tracer_reset_all_callbacks(tracer)
}

/// See [`LoaderContext::tracer_set_enabled`].
pub fn tracer_set_enabled(tracer: TracerHandle, enable: bool) -> Status {
    global().tracer_set_enabled(tracer, enable)
}

macro_rules! entry_point {
    ($layer:ident :: $name:ident ( $($arg:ident : $ty:ty),* ) -> Result<$ok:ty>) => {
        #[doc = concat!("Dispatches `", stringify!($name), "` through the ", stringify!($layer), " layer.")]
        ///
        /// # Errors
        ///
        /// [`Status::Uninitialized`] after teardown or if the layer is
        /// unavailable, otherwise whatever the owning driver returns.
        pub fn $name($($arg: $ty),*) -> Result<$ok, Status> {
            global().$layer()?.$name($($arg),*)
        }
    };
    ($layer:ident :: $name:ident ( $($arg:ident : $ty:ty),* ) -> Status) => {
        #[doc = concat!("Dispatches `", stringify!($name), "` through the ", stringify!($layer), " layer.")]
        pub fn $name($($arg: $ty),*) -> Status {
            match global().$layer() {
                Ok(table) => table.$name($($arg),*),
                Err(status) => status,
            }
        }
    };
}

entry_point!(core::device_get() -> Result<Vec<DeviceHandle>>);
entry_point!(core::device_get_properties(device: DeviceHandle) -> Result<DeviceProperties>);
entry_point!(core::device_get_status(device: DeviceHandle) -> Status);
entry_point!(core::context_create(device: DeviceHandle) -> Result<ContextHandle>);
entry_point!(core::context_destroy(context: ContextHandle) -> Status);
entry_point!(tools::metric_group_get(device: DeviceHandle) -> Result<Vec<MetricGroup>>);
entry_point!(tools::device_get_debug_properties(device: DeviceHandle) -> Result<DebugProperties>);
entry_point!(sysman::device_get_state(device: DeviceHandle) -> Result<DeviceState>);
entry_point!(sysman::device_reset(device: DeviceHandle, force: bool) -> Status);
entry_point!(sysman::device_get_power_usage(device: DeviceHandle) -> Result<PowerUsage>);
