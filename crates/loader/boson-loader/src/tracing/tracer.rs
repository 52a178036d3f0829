//! Tracer objects and the registry that owns them.
//!
//! A tracer moves through three states. It starts `Disabled`, where its
//! callback tables may be edited. Enabling it publishes a copy of its
//! tables in the dispatch snapshot. Disabling it publishes a snapshot
//! without it and leaves it `DisabledWaiting` until every call that may
//! still hold the old snapshot has finished; only then does it count as
//! `Disabled` again.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use boson_driver_api::Status;
use parking_lot::{Mutex, RwLock};

use super::callbacks::CallbackTable;

/// Poll interval while destroying a tracer that calls may still reference.
const DESTROY_POLL: Duration = Duration::from_millis(1);

/// Opaque tracer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TracerHandle(NonZeroU64);

impl TracerHandle {
    /// Raw handle value.
    pub const fn as_raw(self) -> u64 {
        self.0.get()
    }
}

/// Tracer creation parameters.
#[derive(Clone)]
pub struct TracerDesc {
    /// Passed to every callback of the tracer.
    pub user_data: Arc<dyn Any + Send + Sync>,
}

impl TracerDesc {
    /// Describes a tracer carrying `user_data`.
    pub fn new(user_data: impl Any + Send + Sync) -> Self {
        Self {
            user_data: Arc::new(user_data),
        }
    }
}

impl Default for TracerDesc {
    fn default() -> Self {
        Self::new(())
    }
}

impl fmt::Debug for TracerDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerDesc").finish_non_exhaustive()
    }
}

/// Lifecycle state of a tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    /// Not traced; tables may be edited.
    Disabled,
    /// Callbacks fire on traced calls.
    Enabled,
    /// Disabled, but calls started while enabled may still run callbacks.
    DisabledWaiting,
}

/// Tracer management operations, the tracing layer's dispatch interface.
pub trait TracerDdi: Send + Sync {
    /// Creates a disabled tracer with empty tables.
    fn tracer_create(&self, desc: TracerDesc) -> Result<TracerHandle, Status>;
    /// Destroys a disabled tracer, waiting for in-flight callbacks.
    fn tracer_destroy(&self, tracer: TracerHandle) -> Status;
    /// Replaces the prologue table.
    fn tracer_set_prologues(&self, tracer: TracerHandle, table: CallbackTable) -> Status;
    /// Replaces the epilogue table.
    fn tracer_set_epilogues(&self, tracer: TracerHandle, table: CallbackTable) -> Status;
    /// Clears both tables.
    fn tracer_reset_all_callbacks(&self, tracer: TracerHandle) -> Status;
    /// Enables or disables the tracer.
    fn tracer_set_enabled(&self, tracer: TracerHandle, enable: bool) -> Status;
}

struct TracerTables {
    state: TracerState,
    prologues: CallbackTable,
    epilogues: CallbackTable,
}

/// A registered tracer.
pub struct Tracer {
    handle: TracerHandle,
    user_data: Arc<dyn Any + Send + Sync>,
    tables: Mutex<TracerTables>,
}

impl Tracer {
    /// This tracer's handle.
    pub fn handle(&self) -> TracerHandle {
        self.handle
    }

    /// User data given at creation.
    pub fn user_data(&self) -> &(dyn Any + Send + Sync) {
        self.user_data.as_ref()
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("handle", &self.handle)
            .field("state", &self.tables.lock().state)
            .finish_non_exhaustive()
    }
}

/// An enabled tracer as captured in a dispatch snapshot.
#[derive(Debug, Clone)]
pub struct ActiveTracer {
    tracer: Arc<Tracer>,
    prologues: CallbackTable,
    epilogues: CallbackTable,
}

impl ActiveTracer {
    /// The tracer.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Prologues as of enabling.
    pub fn prologues(&self) -> &CallbackTable {
        &self.prologues
    }

    /// Epilogues as of enabling.
    pub fn epilogues(&self) -> &CallbackTable {
        &self.epilogues
    }
}

/// Owns every tracer and publishes the enabled ones.
pub struct TracerRegistry {
    next_handle: AtomicU64,
    tracers: Mutex<HashMap<TracerHandle, Arc<Tracer>>>,
    active: RwLock<Arc<[ActiveTracer]>>,
}

impl TracerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            tracers: Mutex::new(HashMap::new()),
            active: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Enabled tracers, in enable order.
    ///
    /// Holding the snapshot keeps its tracers alive.
    #[inline]
    pub fn snapshot(&self) -> Arc<[ActiveTracer]> {
        Arc::clone(&self.active.read())
    }

    /// Number of live tracers.
    pub fn len(&self) -> usize {
        self.tracers.lock().len()
    }

    /// Returns `true` if no tracer exists.
    pub fn is_empty(&self) -> bool {
        self.tracers.lock().is_empty()
    }

    /// Effective state of `tracer`.
    pub fn state(&self, tracer: TracerHandle) -> Option<TracerState> {
        let tracers = self.tracers.lock();
        let tracer = tracers.get(&tracer)?;
        let mut tables = tracer.tables.lock();
        Some(settle(tracer, &mut tables))
    }

    fn with_disabled(
        &self,
        handle: TracerHandle,
        edit: impl FnOnce(&mut TracerTables),
    ) -> Status {
        let tracers = self.tracers.lock();
        let Some(tracer) = tracers.get(&handle) else {
            return Status::InvalidNullHandle;
        };
        let mut tables = tracer.tables.lock();
        if settle(tracer, &mut tables) != TracerState::Disabled {
            return Status::InvalidArgument;
        }
        edit(&mut tables);
        Status::Success
    }

    fn republish(&self, tracers: &HashMap<TracerHandle, Arc<Tracer>>, order: Vec<TracerHandle>) {
        let snapshot: Vec<ActiveTracer> = order
            .into_iter()
            .filter_map(|handle| {
                let tracer = tracers.get(&handle)?;
                let tables = tracer.tables.lock();
                (tables.state == TracerState::Enabled).then(|| ActiveTracer {
                    tracer: Arc::clone(tracer),
                    prologues: tables.prologues.clone(),
                    epilogues: tables.epilogues.clone(),
                })
            })
            .collect();
        *self.active.write() = Arc::from(snapshot);
    }
}

impl Default for TracerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TracerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerRegistry")
            .field("tracers", &self.len())
            .field("enabled", &self.snapshot().len())
            .finish()
    }
}

/// Moves a waiting tracer to `Disabled` once no snapshot references it.
///
/// The registry map holds the only other strong reference.
fn settle(tracer: &Arc<Tracer>, tables: &mut TracerTables) -> TracerState {
    if tables.state == TracerState::DisabledWaiting && Arc::strong_count(tracer) == 1 {
        tables.state = TracerState::Disabled;
    }
    tables.state
}

impl TracerDdi for TracerRegistry {
    fn tracer_create(&self, desc: TracerDesc) -> Result<TracerHandle, Status> {
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let handle = TracerHandle(NonZeroU64::new(raw).ok_or(Status::OutOfHostMemory)?);
        let tracer = Arc::new(Tracer {
            handle,
            user_data: desc.user_data,
            tables: Mutex::new(TracerTables {
                state: TracerState::Disabled,
                prologues: CallbackTable::new(),
                epilogues: CallbackTable::new(),
            }),
        });
        self.tracers.lock().insert(handle, tracer);
        log::debug!("created tracer {}", handle.as_raw());
        Ok(handle)
    }

    fn tracer_destroy(&self, handle: TracerHandle) -> Status {
        let tracer = {
            let mut tracers = self.tracers.lock();
            let Some(tracer) = tracers.get(&handle) else {
                return Status::InvalidNullHandle;
            };
            if tracer.tables.lock().state == TracerState::Enabled {
                return Status::HandleObjectInUse;
            }
            match tracers.remove(&handle) {
                Some(tracer) => tracer,
                None => return Status::InvalidNullHandle,
            }
        };
        while Arc::strong_count(&tracer) > 1 {
            thread::sleep(DESTROY_POLL);
        }
        log::debug!("destroyed tracer {}", handle.as_raw());
        Status::Success
    }

    fn tracer_set_prologues(&self, tracer: TracerHandle, table: CallbackTable) -> Status {
        self.with_disabled(tracer, |tables| tables.prologues = table)
    }

    fn tracer_set_epilogues(&self, tracer: TracerHandle, table: CallbackTable) -> Status {
        self.with_disabled(tracer, |tables| tables.epilogues = table)
    }

    fn tracer_reset_all_callbacks(&self, tracer: TracerHandle) -> Status {
        self.with_disabled(tracer, |tables| {
            tables.prologues = CallbackTable::new();
            tables.epilogues = CallbackTable::new();
        })
    }

    fn tracer_set_enabled(&self, handle: TracerHandle, enable: bool) -> Status {
        let tracers = self.tracers.lock();
        let Some(tracer) = tracers.get(&handle) else {
            return Status::InvalidNullHandle;
        };
        {
            let mut tables = tracer.tables.lock();
            match (tables.state, enable) {
                (TracerState::Enabled, true) => return Status::Success,
                (TracerState::Disabled | TracerState::DisabledWaiting, false) => {
                    return Status::Success;
                }
                (_, true) => tables.state = TracerState::Enabled,
                (_, false) => tables.state = TracerState::DisabledWaiting,
            }
        }

        let mut order: Vec<TracerHandle> = self
            .snapshot()
            .iter()
            .map(|a| a.tracer.handle)
            .filter(|h| *h != handle)
            .collect();
        if enable {
            order.push(handle);
        }
        self.republish(&tracers, order);
        log::debug!(
            "tracer {} {}",
            handle.as_raw(),
            if enable { "enabled" } else { "disabled" }
        );
        Status::Success
    }
}
