//! Callback tables and the data passed to callbacks.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use boson_driver_api::{Layer, Status};

/// Every traced entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ApiFunction {
    /// `device_get`
    DeviceGet,
    /// `device_get_properties`
    DeviceGetProperties,
    /// `device_get_status`
    DeviceGetStatus,
    /// `context_create`
    ContextCreate,
    /// `context_destroy`
    ContextDestroy,
    /// `metric_group_get`
    MetricGroupGet,
    /// `device_get_debug_properties`
    DeviceGetDebugProperties,
    /// `device_get_state`
    DeviceGetState,
    /// `device_reset`
    DeviceReset,
    /// `device_get_power_usage`
    DeviceGetPowerUsage,
}

impl ApiFunction {
    /// Number of traced entry points.
    pub const COUNT: usize = 10;

    /// All entry points, in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::DeviceGet,
        Self::DeviceGetProperties,
        Self::DeviceGetStatus,
        Self::ContextCreate,
        Self::ContextDestroy,
        Self::MetricGroupGet,
        Self::DeviceGetDebugProperties,
        Self::DeviceGetState,
        Self::DeviceReset,
        Self::DeviceGetPowerUsage,
    ];

    /// Entry point name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::DeviceGet => "device_get",
            Self::DeviceGetProperties => "device_get_properties",
            Self::DeviceGetStatus => "device_get_status",
            Self::ContextCreate => "context_create",
            Self::ContextDestroy => "context_destroy",
            Self::MetricGroupGet => "metric_group_get",
            Self::DeviceGetDebugProperties => "device_get_debug_properties",
            Self::DeviceGetState => "device_get_state",
            Self::DeviceReset => "device_reset",
            Self::DeviceGetPowerUsage => "device_get_power_usage",
        }
    }

    /// The layer the entry point belongs to.
    pub const fn layer(self) -> Layer {
        match self {
            Self::DeviceGet
            | Self::DeviceGetProperties
            | Self::DeviceGetStatus
            | Self::ContextCreate
            | Self::ContextDestroy => Layer::Core,
            Self::MetricGroupGet | Self::DeviceGetDebugProperties => Layer::Tools,
            Self::DeviceGetState | Self::DeviceReset | Self::DeviceGetPowerUsage => Layer::Sysman,
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ApiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters of a traced call.
///
/// Implemented for every `Debug + 'static` type, so callbacks can print
/// parameters or downcast them with [`CallbackData::params_as`].
pub trait TraceParams: fmt::Debug + Any {
    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: fmt::Debug + Any> TraceParams for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Everything a callback sees about one call.
pub struct CallbackData<'a> {
    function: ApiFunction,
    params: &'a dyn TraceParams,
    result: Option<Status>,
    user_data: &'a (dyn Any + Send + Sync),
    instance: &'a mut Option<Box<dyn Any + Send>>,
}

impl<'a> CallbackData<'a> {
    pub(crate) fn new(
        function: ApiFunction,
        params: &'a dyn TraceParams,
        result: Option<Status>,
        user_data: &'a (dyn Any + Send + Sync),
        instance: &'a mut Option<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            function,
            params,
            result,
            user_data,
            instance,
        }
    }

    /// The entry point being called.
    pub fn function(&self) -> ApiFunction {
        self.function
    }

    /// Call parameters.
    pub fn params(&self) -> &dyn TraceParams {
        self.params
    }

    /// Call parameters as `T`, if that is their type.
    pub fn params_as<T: 'static>(&self) -> Option<&T> {
        self.params.as_any().downcast_ref()
    }

    /// Result of the call. `None` in prologues.
    pub fn result(&self) -> Option<Status> {
        self.result
    }

    /// The tracer's user data as `T`, if that is its type.
    pub fn user_data<T: 'static>(&self) -> Option<&T> {
        self.user_data.downcast_ref()
    }

    /// Stores per-call data for this tracer's epilogue.
    pub fn set_instance_data(&mut self, data: Box<dyn Any + Send>) {
        *self.instance = Some(data);
    }

    /// Takes the data this tracer's prologue stored for this call.
    pub fn take_instance_data(&mut self) -> Option<Box<dyn Any + Send>> {
        self.instance.take()
    }
}

impl fmt::Debug for CallbackData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackData")
            .field("function", &self.function)
            .field("params", &self.params)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// A prologue or epilogue callback.
pub type Callback = Arc<dyn Fn(&mut CallbackData<'_>) + Send + Sync>;

/// One callback slot per traced entry point.
#[derive(Clone, Default)]
pub struct CallbackTable {
    slots: [Option<Callback>; ApiFunction::COUNT],
}

impl CallbackTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `callback` for `function`.
    pub fn set(
        &mut self,
        function: ApiFunction,
        callback: impl Fn(&mut CallbackData<'_>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.slots[function.slot()] = Some(Arc::new(callback));
        self
    }

    /// Builder form of [`CallbackTable::set`].
    #[must_use]
    pub fn with(
        mut self,
        function: ApiFunction,
        callback: impl Fn(&mut CallbackData<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.set(function, callback);
        self
    }

    /// Removes the callback for `function`.
    pub fn clear(&mut self, function: ApiFunction) {
        self.slots[function.slot()] = None;
    }

    /// Callback for `function`, if any.
    pub fn get(&self, function: ApiFunction) -> Option<&Callback> {
        self.slots[function.slot()].as_ref()
    }

    /// Returns `true` if no callback is installed.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(
                ApiFunction::ALL
                    .iter()
                    .filter(|func| self.get(**func).is_some()),
            )
            .finish()
    }
}
