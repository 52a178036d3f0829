//! Loom and shuttle compatibility shim.
//!
//! Under `cfg(loom)` this re-exports loom's primitives, under `cfg(shuttle)`
//! shuttle's, and otherwise the `std` equivalents. The cell type always
//! exposes loom's closure-based `with`/`with_mut` API so callers do not
//! change between modes. [`Parker`] blocks on a `parking_lot` condition
//! variable in normal mode and yields to the model scheduler otherwise.

// ---------------------------------------------------------------------------
// Loom mode
// ---------------------------------------------------------------------------

#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
#[cfg(loom)]
pub(crate) use loom::thread::yield_now;

// ---------------------------------------------------------------------------
// Shuttle mode
// ---------------------------------------------------------------------------

#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::thread::yield_now;

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(not(any(loom, shuttle)))]
pub(crate) use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

/// `core::cell::UnsafeCell` with loom's access API.
#[cfg(not(loom))]
#[derive(Debug)]
pub(crate) struct UnsafeCell<T>(core::cell::UnsafeCell<T>);

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    pub(crate) const fn new(data: T) -> Self {
        Self(core::cell::UnsafeCell::new(data))
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
        f(self.0.get())
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}

// ---------------------------------------------------------------------------
// Parking
// ---------------------------------------------------------------------------

/// Spins before a waiter parks.
#[cfg(not(any(loom, shuttle)))]
const SPIN_LIMIT: u32 = 100;

/// Parks threads until another thread changes a condition they poll.
///
/// Whoever changes the condition must call [`Parker::unpark_all`] after
/// the change is visible.
#[cfg(not(any(loom, shuttle)))]
#[derive(Debug)]
pub(crate) struct Parker {
    lock: parking_lot::Mutex<()>,
    changed: parking_lot::Condvar,
}

#[cfg(not(any(loom, shuttle)))]
impl Parker {
    pub(crate) const fn new() -> Self {
        Self {
            lock: parking_lot::Mutex::new(()),
            changed: parking_lot::Condvar::new(),
        }
    }

    /// Returns once `pending` is false.
    pub(crate) fn wait_while(&self, mut pending: impl FnMut() -> bool) {
        for _ in 0..SPIN_LIMIT {
            if !pending() {
                return;
            }
            core::hint::spin_loop();
        }
        let mut guard = self.lock.lock();
        // `pending` is rechecked under the lock, so an unpark between the
        // check and the wait cannot be missed.
        while pending() {
            self.changed.wait(&mut guard);
        }
    }

    /// Wakes every parked thread.
    pub(crate) fn unpark_all(&self) {
        drop(self.lock.lock());
        self.changed.notify_all();
    }
}

/// Model mode: waiters yield so the scheduler can run the thread they wait on.
#[cfg(any(loom, shuttle))]
#[derive(Debug)]
pub(crate) struct Parker;

#[cfg(any(loom, shuttle))]
impl Parker {
    pub(crate) const fn new() -> Self {
        Self
    }

    pub(crate) fn wait_while(&self, mut pending: impl FnMut() -> bool) {
        while pending() {
            yield_now();
        }
    }

    #[allow(clippy::unused_self)]
    pub(crate) fn unpark_all(&self) {}
}
