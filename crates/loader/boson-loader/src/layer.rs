//! Per-layer dispatch registries.
//!
//! Each API layer owns a [`LayerRegistry`]: a once-only initializer and
//! three published table slots. `active` is what dispatch reads. `initial`
//! is the untraced table, saved so that disabling tracing can restore the
//! exact pointer that was active before. `traced` caches the wrapper built
//! around `initial`, so repeated enable cycles reuse it.
//!
//! Tables are leaked on publication. A reader may hold a table reference
//! for as long as it likes without any lock or reference count.
//!
//! Layer-wide tracing is reference counted in a [`TraceSwitch`] shared by
//! all layers. Table swaps only happen on the 0 -> 1 and 1 -> 0
//! transitions, under the switch's lock.

use std::fmt;
use std::ops::Deref;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use boson_core::sync::{OnceResult, Published};
use boson_driver_api::{Layer, Status};
use parking_lot::Mutex;

/// A published dispatch table.
pub struct DispatchTable<D: ?Sized + 'static> {
    ddi: Arc<D>,
    wraps: Option<&'static DispatchTable<D>>,
}

impl<D: ?Sized + 'static> DispatchTable<D> {
    fn leak(ddi: Arc<D>, wraps: Option<&'static Self>) -> &'static Self {
        Box::leak(Box::new(Self { ddi, wraps }))
    }

    /// The interface calls are forwarded to.
    pub fn ddi(&self) -> &Arc<D> {
        &self.ddi
    }

    /// Returns `true` if this table is a tracing wrapper.
    pub fn is_traced(&self) -> bool {
        self.wraps.is_some()
    }
}

impl<D: ?Sized + 'static> Deref for DispatchTable<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.ddi
    }
}

impl<D: ?Sized + 'static> fmt::Debug for DispatchTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("at", &ptr::from_ref(self))
            .field("traced", &self.is_traced())
            .finish()
    }
}

/// Reference count of layer-wide tracing enables.
pub struct TraceSwitch {
    count: AtomicU32,
    lock: Mutex<()>,
}

impl TraceSwitch {
    /// Creates a switch with `count` outstanding enables.
    pub const fn new(count: u32) -> Self {
        Self {
            count: AtomicU32::new(count),
            lock: Mutex::new(()),
        }
    }

    /// Current count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Returns `true` while at least one enable is outstanding.
    pub fn is_enabled(&self) -> bool {
        self.count() > 0
    }

    /// Increments the count, running `on_first` on the 0 -> 1 transition.
    pub fn enable(&self, on_first: impl FnOnce()) {
        let _guard = self.lock.lock();
        if self.count.fetch_add(1, Ordering::SeqCst) == 0 {
            on_first();
        }
    }

    /// Decrements the count, running `on_last` on the 1 -> 0 transition.
    ///
    /// Returns [`Status::Uninitialized`] without effect if the count is
    /// already zero.
    pub fn disable(&self, on_last: impl FnOnce()) -> Status {
        let _guard = self.lock.lock();
        match self.count.load(Ordering::SeqCst) {
            0 => Status::Uninitialized,
            n => {
                self.count.store(n - 1, Ordering::SeqCst);
                if n == 1 {
                    on_last();
                }
                Status::Success
            }
        }
    }

    fn with_count<R>(&self, f: impl FnOnce(u32) -> R) -> R {
        let _guard = self.lock.lock();
        f(self.count.load(Ordering::SeqCst))
    }
}

impl Default for TraceSwitch {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for TraceSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSwitch")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// Dispatch state of one API layer.
pub struct LayerRegistry<D: ?Sized + 'static> {
    layer: Layer,
    init: OnceResult<Status>,
    active: Published<DispatchTable<D>>,
    initial: Published<DispatchTable<D>>,
    traced: Published<DispatchTable<D>>,
}

impl<D: ?Sized + Send + Sync + 'static> LayerRegistry<D> {
    /// Creates an uninitialized registry for `layer`.
    pub const fn new(layer: Layer) -> Self {
        Self {
            layer,
            init: OnceResult::new(),
            active: Published::empty(),
            initial: Published::empty(),
            traced: Published::empty(),
        }
    }

    /// The layer this registry serves.
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Runs the layer's initialization once and returns its outcome.
    ///
    /// The first caller runs `populate`; racing callers block until it is
    /// done. Every caller, now or later, gets the same status. A failure is
    /// never retried. If layer-wide tracing is enabled when the table is
    /// published, the traced wrapper built by `wrap` is published instead.
    pub fn ensure_initialized(
        &self,
        switch: &TraceSwitch,
        populate: impl FnOnce() -> Result<Arc<D>, Status>,
        wrap: impl FnOnce(Arc<D>) -> Arc<D>,
    ) -> Status {
        *self.init.get_or_init(|| {
            let table = match populate() {
                Ok(ddi) => DispatchTable::leak(ddi, None),
                Err(status) => {
                    log::warn!("{} layer failed to initialize: {status}", self.layer);
                    return status;
                }
            };
            switch.with_count(|count| {
                self.initial.store(table);
                if count > 0 {
                    self.active.store(self.traced_table(table, wrap));
                } else {
                    self.active.store(table);
                }
            });
            log::debug!("{} layer initialized", self.layer);
            Status::Success
        })
    }

    /// Runs the layer's initialization once, never tracing it.
    pub fn ensure_initialized_untraced(
        &self,
        populate: impl FnOnce() -> Result<Arc<D>, Status>,
    ) -> Status {
        *self.init.get_or_init(|| match populate() {
            Ok(ddi) => {
                let table = DispatchTable::leak(ddi, None);
                self.initial.store(table);
                self.active.store(table);
                log::debug!("{} layer initialized", self.layer);
                Status::Success
            }
            Err(status) => {
                log::warn!("{} layer failed to initialize: {status}", self.layer);
                status
            }
        })
    }

    /// Outcome of initialization, if it has run.
    pub fn init_status(&self) -> Option<Status> {
        self.init.get().copied()
    }

    /// The table dispatch currently reads.
    ///
    /// # Errors
    ///
    /// [`Status::Uninitialized`] if the layer never initialized successfully.
    #[inline]
    pub fn active(&self) -> Result<&'static DispatchTable<D>, Status> {
        self.active.load().ok_or(Status::Uninitialized)
    }

    /// The saved untraced table.
    pub fn initial(&self) -> Option<&'static DispatchTable<D>> {
        self.initial.load()
    }

    /// Swaps in the traced table. Call only on the switch's 0 -> 1
    /// transition, from inside [`TraceSwitch::enable`].
    pub fn trace_on(&self, wrap: impl FnOnce(Arc<D>) -> Arc<D>) {
        let Some(current) = self.active.load() else {
            return;
        };
        if current.is_traced() {
            return;
        }
        self.initial.store(current);
        self.active.store(self.traced_table(current, wrap));
        log::debug!("{} layer tracing enabled", self.layer);
    }

    /// Restores the saved untraced table. Call only on the switch's
    /// 1 -> 0 transition, from inside [`TraceSwitch::disable`].
    pub fn trace_off(&self) {
        if let Some(initial) = self.initial.load() {
            self.active.store(initial);
            log::debug!("{} layer tracing disabled", self.layer);
        }
    }

    fn traced_table(
        &self,
        inner: &'static DispatchTable<D>,
        wrap: impl FnOnce(Arc<D>) -> Arc<D>,
    ) -> &'static DispatchTable<D> {
        let cached = self
            .traced
            .load()
            .filter(|t| t.wraps.is_some_and(|w| ptr::eq(w, inner)));
        if let Some(traced) = cached {
            return traced;
        }
        let traced = DispatchTable::leak(wrap(Arc::clone(&inner.ddi)), Some(inner));
        self.traced.store(traced);
        traced
    }
}

impl<D: ?Sized + 'static> fmt::Debug for LayerRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("layer", &self.layer)
            .field("active", &self.active)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}
