//! The loader context.
//!
//! [`LoaderContext`] owns everything the loader knows: configuration,
//! the driver registry, one [`LayerRegistry`] per API layer, the tracers,
//! the optional validator, and the teardown flag. Every dispatch path
//! checks the teardown flag first, then lazily initializes its layer, then
//! reads the published table.
//!
//! A layer's untraced table is the routed table, wrapped in the validation
//! layer when it is enabled. Tracing wraps whatever that produced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use boson_core::DeviceId;
use boson_core::sync::OnceResult;
use boson_driver_api::{
    CoreDdi, DeviceHandle, DriverModule, InitFlags, Layer, StaticDriverEntry, Status, SysmanDdi,
    ToolsDdi,
};
use parking_lot::Mutex;

use crate::config::{Env, LoaderConfig};
use crate::discovery;
use crate::driver::{Candidate, DriverRecord, DriverSource, DriverView};
use crate::error::LoaderError;
use crate::error_state::{record, record_err};
use crate::layer::{DispatchTable, LayerRegistry, TraceSwitch};
use crate::registry::Registry;
use crate::routing::{RoutedCore, RoutedSysman, RoutedTools};
use crate::tracing::{
    CallbackTable, TracedCore, TracedSysman, TracedTools, TracerDdi, TracerDesc, TracerHandle,
    TracerRegistry,
};
use crate::validation::{ValidatedCore, ValidatedSysman, ValidatedTools, Validator};

/// Builds a [`LoaderContext`].
#[derive(Debug, Default)]
pub struct LoaderBuilder {
    config: LoaderConfig,
    linked: Vec<Candidate>,
}

impl LoaderBuilder {
    /// Starts from `config`.
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            linked: Vec::new(),
        }
    }

    /// Starts from the configuration described by `env`.
    ///
    /// # Errors
    ///
    /// See [`LoaderConfig::load`].
    pub fn from_env(env: &dyn Env) -> Result<Self, LoaderError> {
        LoaderConfig::load(env).map(Self::new)
    }

    /// Adds a driver linked into the process. Linked drivers are
    /// discovered before any other, in the order added.
    #[must_use]
    pub fn with_driver(mut self, driver: Arc<dyn DriverModule>) -> Self {
        self.linked.push(Candidate::new(driver, DriverSource::Linked));
        self
    }

    /// Adds a statically registered driver.
    #[must_use]
    pub fn with_static_driver(self, entry: &StaticDriverEntry) -> Self {
        log::debug!("registering static driver {} ({})", entry.name, entry.category);
        self.with_driver((entry.create)())
    }

    /// The configuration the context will use.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Creates the context. No driver is touched until first use.
    pub fn build(self) -> LoaderContext {
        if let Some(level) = self.config.log_level {
            log::set_max_level(level.to_level_filter());
        }
        let trace_count = u32::from(self.config.enable_tracing_layer);
        let validator = self.config.validation.enabled.then(|| {
            log::debug!("validation layer enabled: {:?}", self.config.validation);
            Arc::new(Validator::new(self.config.validation))
        });
        LoaderContext {
            config: self.config,
            linked: Mutex::new(self.linked),
            teardown: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            registry: OnceResult::new(),
            core: LayerRegistry::new(Layer::Core),
            tools: LayerRegistry::new(Layer::Tools),
            sysman: LayerRegistry::new(Layer::Sysman),
            tracing: LayerRegistry::new(Layer::Tracing),
            tracers: Arc::new(TracerRegistry::new()),
            trace_switch: TraceSwitch::new(trace_count),
            validator,
            legacy_init: OnceResult::new(),
            driver_init: Mutex::new(()),
        }
    }
}

/// Process-wide loader state.
pub struct LoaderContext {
    config: LoaderConfig,
    linked: Mutex<Vec<Candidate>>,
    teardown: AtomicBool,
    initialized: AtomicBool,
    registry: OnceResult<Arc<Registry>>,
    core: LayerRegistry<dyn CoreDdi>,
    tools: LayerRegistry<dyn ToolsDdi>,
    sysman: LayerRegistry<dyn SysmanDdi>,
    tracing: LayerRegistry<dyn TracerDdi>,
    tracers: Arc<TracerRegistry>,
    trace_switch: TraceSwitch,
    validator: Option<Arc<Validator>>,
    legacy_init: OnceResult<Status>,
    driver_init: Mutex<()>,
}

impl LoaderContext {
    /// Shorthand for `LoaderBuilder::new(config).build()`.
    pub fn new(config: LoaderConfig) -> Self {
        LoaderBuilder::new(config).build()
    }

    /// Effective configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns `true` once teardown has begun.
    #[inline]
    pub fn is_torn_down(&self) -> bool {
        self.teardown.load(Ordering::Acquire)
    }

    /// Returns `true` once the registry has a usable driver.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline]
    fn guard(&self) -> Result<(), Status> {
        if self.is_torn_down() {
            return Err(record(Status::Uninitialized));
        }
        Ok(())
    }

    fn registry_arc(&self) -> Arc<Registry> {
        Arc::clone(self.registry.get_or_init(|| Arc::new(self.build_registry())))
    }

    fn build_registry(&self) -> Registry {
        let linked = std::mem::take(&mut *self.linked.lock());
        let candidates = discovery::discover(&self.config, linked);
        let registry = Registry::build(candidates, self.config.ordering_policy());
        if registry.has_usable_driver() {
            self.initialized.store(true, Ordering::Release);
        } else {
            log::warn!("no driver initialized");
        }
        registry
    }

    /// The resolved driver set, built on first use.
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`] after teardown.
    pub fn registry(&self) -> Result<Arc<Registry>, Status> {
        self.guard()?;
        Ok(self.registry_arc())
    }

    // -----------------------------------------------------------------------
    // Layers
    // -----------------------------------------------------------------------

    fn ensure_layer<D: ?Sized + Send + Sync + 'static>(
        &self,
        layer: &LayerRegistry<D>,
        provides: fn(&DriverRecord) -> bool,
        route: impl FnOnce(Arc<Registry>) -> Arc<D>,
        trace: fn(Arc<D>, Arc<TracerRegistry>) -> Arc<D>,
    ) -> Status {
        layer.ensure_initialized(
            &self.trace_switch,
            || {
                let registry = self.registry_arc();
                if !registry.records().iter().any(provides) {
                    return Err(Status::Uninitialized);
                }
                Ok(route(registry))
            },
            |inner| trace(inner, Arc::clone(&self.tracers)),
        )
    }

    /// Wraps `routed` in the validation layer, if enabled.
    fn validated<D: ?Sized>(
        &self,
        routed: Arc<D>,
        registry: Arc<Registry>,
        wrap: fn(Arc<D>, Arc<Registry>, Arc<Validator>) -> Arc<D>,
    ) -> Arc<D> {
        match &self.validator {
            Some(validator) => wrap(routed, registry, Arc::clone(validator)),
            None => routed,
        }
    }

    fn ensure_core(&self) -> Status {
        self.ensure_layer(
            &self.core,
            |r| r.core().is_some(),
            |registry| {
                let routed: Arc<dyn CoreDdi> = Arc::new(RoutedCore::new(Arc::clone(&registry)));
                self.validated(routed, registry, |inner, registry, validator| {
                    Arc::new(ValidatedCore::new(inner, registry, validator)) as Arc<dyn CoreDdi>
                })
            },
            |inner, tracers| Arc::new(TracedCore::new(inner, tracers)) as Arc<dyn CoreDdi>,
        )
    }

    fn ensure_tools(&self) -> Status {
        self.ensure_layer(
            &self.tools,
            |r| r.tools().is_some(),
            |registry| {
                let routed: Arc<dyn ToolsDdi> = Arc::new(RoutedTools::new(Arc::clone(&registry)));
                self.validated(routed, registry, |inner, registry, validator| {
                    Arc::new(ValidatedTools::new(inner, registry, validator)) as Arc<dyn ToolsDdi>
                })
            },
            |inner, tracers| Arc::new(TracedTools::new(inner, tracers)) as Arc<dyn ToolsDdi>,
        )
    }

    fn ensure_sysman(&self) -> Status {
        self.ensure_layer(
            &self.sysman,
            |r| r.sysman().is_some(),
            |registry| {
                let routed: Arc<dyn SysmanDdi> =
                    Arc::new(RoutedSysman::new(Arc::clone(&registry)));
                self.validated(routed, registry, |inner, registry, validator| {
                    Arc::new(ValidatedSysman::new(inner, registry, validator))
                        as Arc<dyn SysmanDdi>
                })
            },
            |inner, tracers| Arc::new(TracedSysman::new(inner, tracers)) as Arc<dyn SysmanDdi>,
        )
    }

    fn ensure_tracing(&self) -> Status {
        self.tracing
            .ensure_initialized_untraced(|| Ok(Arc::clone(&self.tracers) as Arc<dyn TracerDdi>))
    }

    fn table<D: ?Sized + Send + Sync + 'static>(
        layer: &LayerRegistry<D>,
        status: Status,
    ) -> Result<&'static DispatchTable<D>, Status> {
        if !status.is_success() {
            return Err(record(Status::Uninitialized));
        }
        record_err(layer.active())
    }

    /// Active core layer table, initializing the layer on first use.
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`] after teardown or if no driver provides
    /// the layer.
    pub fn core(&self) -> Result<&'static DispatchTable<dyn CoreDdi>, Status> {
        self.guard()?;
        Self::table(&self.core, self.ensure_core())
    }

    /// Active tools layer table. Errors as for [`LoaderContext::core`].
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`].
    pub fn tools(&self) -> Result<&'static DispatchTable<dyn ToolsDdi>, Status> {
        self.guard()?;
        Self::table(&self.tools, self.ensure_tools())
    }

    /// Active system management layer table. Errors as for [`LoaderContext::core`].
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`].
    pub fn sysman(&self) -> Result<&'static DispatchTable<dyn SysmanDdi>, Status> {
        self.guard()?;
        Self::table(&self.sysman, self.ensure_sysman())
    }

    /// Active tracing layer table. The tracing layer always initializes.
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`] after teardown.
    pub fn tracing(&self) -> Result<&'static DispatchTable<dyn TracerDdi>, Status> {
        self.guard()?;
        Self::table(&self.tracing, self.ensure_tracing())
    }

    /// Outcome of a layer's initialization, if it has run.
    pub fn layer_status(&self, layer: Layer) -> Option<Status> {
        match layer {
            Layer::Core => self.core.init_status(),
            Layer::Tools => self.tools.init_status(),
            Layer::Sysman => self.sysman.init_status(),
            Layer::Tracing => self.tracing.init_status(),
        }
    }

    // -----------------------------------------------------------------------
    // Initialization entry points
    // -----------------------------------------------------------------------

    fn initialize(&self, flags: InitFlags) -> Result<Vec<DriverView>, Status> {
        let registry = self.registry()?;
        if !self.ensure_core().is_success() {
            return Err(Status::Uninitialized);
        }
        // Optional layers; a failure here only disables that layer.
        let _ = self.ensure_tools();
        let _ = self.ensure_sysman();
        let _ = self.ensure_tracing();

        let matching = registry.matching(flags);
        if matching.is_empty() {
            log::warn!("no initialized driver matches {flags:?}");
            return Err(Status::Uninitialized);
        }
        Ok(matching
            .into_iter()
            .filter_map(|index| registry.view(index))
            .collect())
    }

    /// Legacy initialization.
    ///
    /// Runs once per context; later calls return the first call's status
    /// whatever their flags.
    pub fn init(&self, flags: InitFlags) -> Status {
        if self.is_torn_down() {
            return record(Status::Uninitialized);
        }
        let status = *self.legacy_init.get_or_init(|| {
            let status = self.initialize(flags).err().unwrap_or(Status::Success);
            log::info!("init({flags:?}): {status}");
            status
        });
        record(status)
    }

    /// Initializes and returns the drivers matching `flags`.
    ///
    /// Independent of [`LoaderContext::init`]. The flags are evaluated on
    /// every call, so a call for a different device type may succeed after
    /// an earlier one failed.
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`] after teardown or if no initialized driver
    /// matches `flags`.
    pub fn init_drivers(&self, flags: InitFlags) -> Result<Vec<DriverView>, Status> {
        self.guard()?;
        let _guard = self.driver_init.lock();
        record_err(self.initialize(flags))
    }

    /// Every driver in resolved order, including ones that failed `init`.
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`] after teardown.
    pub fn drivers(&self) -> Result<Vec<DriverView>, Status> {
        Ok(self.registry()?.views())
    }

    // -----------------------------------------------------------------------
    // Device numbering
    // -----------------------------------------------------------------------

    /// Flat identifier of `device`, or [`DeviceId::INVALID`].
    pub fn device_id(&self, device: DeviceHandle) -> DeviceId {
        match self.registry() {
            Ok(registry) => registry.to_identifier(device),
            Err(_) => DeviceId::INVALID,
        }
    }

    /// Device numbered `id`.
    pub fn device_handle(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.registry().ok()?.to_handle(id)
    }

    // -----------------------------------------------------------------------
    // Tracing
    // -----------------------------------------------------------------------

    /// Adds one layer-wide tracing enable.
    ///
    /// The first enable swaps every initialized layer to its traced table.
    /// Layers initialized while enabled start traced.
    pub fn enable_tracing_layer(&self) -> Status {
        if let Err(status) = self.guard() {
            return status;
        }
        self.trace_switch.enable(|| {
            self.core.trace_on(|inner| {
                Arc::new(TracedCore::new(inner, Arc::clone(&self.tracers))) as Arc<dyn CoreDdi>
            });
            self.tools.trace_on(|inner| {
                Arc::new(TracedTools::new(inner, Arc::clone(&self.tracers))) as Arc<dyn ToolsDdi>
            });
            self.sysman.trace_on(|inner| {
                Arc::new(TracedSysman::new(inner, Arc::clone(&self.tracers)))
                    as Arc<dyn SysmanDdi>
            });
            log::info!("tracing layer enabled");
        });
        Status::Success
    }

    /// Drops one layer-wide tracing enable.
    ///
    /// The last disable restores every layer's untraced table. Returns
    /// [`Status::Uninitialized`] if tracing was not enabled.
    pub fn disable_tracing_layer(&self) -> Status {
        if let Err(status) = self.guard() {
            return status;
        }
        record(self.trace_switch.disable(|| {
            self.core.trace_off();
            self.tools.trace_off();
            self.sysman.trace_off();
            log::info!("tracing layer disabled");
        }))
    }

    /// Returns `true` while layer-wide tracing is enabled.
    pub fn is_tracing_layer_enabled(&self) -> bool {
        self.trace_switch.is_enabled()
    }

    /// The validation layer's state, when enabled.
    pub fn validator(&self) -> Option<&Arc<Validator>> {
        self.validator.as_ref()
    }

    /// Tracer registry backing the tracing layer.
    pub fn tracers(&self) -> &Arc<TracerRegistry> {
        &self.tracers
    }

    /// Creates a tracer.
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`] after teardown.
    pub fn tracer_create(&self, desc: TracerDesc) -> Result<TracerHandle, Status> {
        record_err(self.tracing()?.tracer_create(desc))
    }

    /// Destroys a disabled tracer, blocking until its in-flight callbacks finish.
    pub fn tracer_destroy(&self, tracer: TracerHandle) -> Status {
        self.with_tracing(|t| t.tracer_destroy(tracer))
    }

    /// Replaces a disabled tracer's prologues.
    pub fn tracer_set_prologues(&self, tracer: TracerHandle, table: CallbackTable) -> Status {
        self.with_tracing(|t| t.tracer_set_prologues(tracer, table))
    }

    /// Replaces a disabled tracer's epilogues.
    pub fn tracer_set_epilogues(&self, tracer: TracerHandle, table: CallbackTable) -> Status {
        self.with_tracing(|t| t.tracer_set_epilogues(tracer, table))
    }

    /// Clears a disabled tracer's callbacks.
    pub fn tracer_reset_all_callbacks(&self, tracer: TracerHandle) -> Status {
        self.with_tracing(|t| t.tracer_reset_all_callbacks(tracer))
    }

    /// Enables or disables a tracer.
    pub fn tracer_set_enabled(&self, tracer: TracerHandle, enable: bool) -> Status {
        self.with_tracing(|t| t.tracer_set_enabled(tracer, enable))
    }

    fn with_tracing(&self, f: impl FnOnce(&dyn TracerDdi) -> Status) -> Status {
        match self.tracing() {
            Ok(table) => record(f(&**table)),
            Err(status) => status,
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Begins teardown.
    ///
    /// Sets the teardown flag, after which every call fails with
    /// [`Status::Uninitialized`] without touching a dispatch table.
    /// Idempotent.
    ///
    /// Nothing is unloaded here. Calls already in flight, and tables
    /// obtained before teardown, keep working: a driver library stays
    /// loaded while any published table can still reach it.
    pub fn shutdown(&self) {
        if self.teardown.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("loader teardown");
        if let Some(validator) = &self.validator {
            validator.report();
        }
    }
}

impl Drop for LoaderContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LoaderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderContext")
            .field("teardown", &self.is_torn_down())
            .field("initialized", &self.is_initialized())
            .field("core", &self.core)
            .field("tools", &self.tools)
            .field("sysman", &self.sysman)
            .field("trace_switch", &self.trace_switch)
            .finish_non_exhaustive()
    }
}
