//! Blocking one-time initialization with a shared outcome.
//!
//! Provides [`OnceResult`], the single initialization idiom of the loader.
//! The first caller runs the initializer; every concurrent caller blocks
//! until it finishes, and every caller (first, racing, or late) observes
//! the same stored value. A value describing failure is stored exactly
//! like a value describing success, so a failed initialization is sticky.
//! Waiters spin briefly, then park until the initializer finishes.

use core::mem::MaybeUninit;

use super::loom_compat::{AtomicU8, Ordering, Parker, UnsafeCell};

const UNINIT: u8 = 0;
const RUNNING: u8 = 1;
const READY: u8 = 2;
/// The initializer panicked. Waiters panic instead of blocking forever.
const POISONED: u8 = 3;

/// A cell whose initializer runs at most once per cell.
///
/// Where [`std::sync::OnceLock`] holds a lazily built value, this cell holds
/// the *outcome* of an initialization, typically a status code or a
/// `Result`. A failure is stored like any other value and is returned to
/// every later caller.
///
/// # Panic safety
///
/// If the initializer panics, the cell becomes poisoned and every waiting
/// or later access panics too. `OnceLock` instead stays empty and lets the
/// next caller run its initializer.
pub struct OnceResult<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
    parker: Parker,
}

// SAFETY: The value is written exactly once by the thread that moved the
// state to RUNNING and is only read after READY is observed with Acquire.
unsafe impl<T: Send> Send for OnceResult<T> {}
unsafe impl<T: Send + Sync> Sync for OnceResult<T> {}

/// Poisons the cell if dropped before initialization completes.
struct RunGuard<'a> {
    state: &'a AtomicU8,
    parker: &'a Parker,
}

impl RunGuard<'_> {
    /// Disarm the guard after the value has been published.
    fn defuse(self) {
        core::mem::forget(self);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.store(POISONED, Ordering::Release);
        self.parker.unpark_all();
    }
}

impl<T> OnceResult<T> {
    /// Creates an empty cell.
    #[cfg(not(any(loom, shuttle)))]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            parker: Parker::new(),
        }
    }

    /// Creates an empty cell.
    #[cfg(any(loom, shuttle))]
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            parker: Parker::new(),
        }
    }

    /// Returns the stored outcome, running `init` first if no caller has.
    ///
    /// Callers that lose the race block until the winner has stored its
    /// outcome.
    ///
    /// # Panics
    ///
    /// Panics if the initializer of this cell panicked, on this or any
    /// other thread.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(value) = self.get() {
            return value;
        }

        if self
            .state
            .compare_exchange(UNINIT, RUNNING, Ordering::Acquire, Ordering::Acquire)
            .is_ok()
        {
            let guard = RunGuard {
                state: &self.state,
                parker: &self.parker,
            };
            let value = init();
            // SAFETY: Only the thread that won UNINIT -> RUNNING writes.
            self.value.with_mut(|slot| unsafe {
                (*slot).write(value);
            });
            self.state.store(READY, Ordering::Release);
            guard.defuse();
            self.parker.unpark_all();
            // SAFETY: Written above and the state is READY.
            return unsafe { self.read() };
        }

        self.wait()
    }

    /// Returns the stored outcome without running anything.
    pub fn get(&self) -> Option<&T> {
        match self.state.load(Ordering::Acquire) {
            // SAFETY: READY is only stored after the value is written.
            READY => Some(unsafe { self.read() }),
            POISONED => panic!("OnceResult poisoned: initializer panicked"),
            _ => None,
        }
    }

    /// Returns `true` once an outcome has been stored.
    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Blocks until the running initializer stores its outcome or panics.
    fn wait(&self) -> &T {
        self.parker.wait_while(|| self.state.load(Ordering::Acquire) == RUNNING);
        // The state never returns to UNINIT, so it is READY or POISONED.
        match self.state.load(Ordering::Acquire) {
            // SAFETY: READY observed with Acquire.
            READY => unsafe { self.read() },
            _ => panic!("OnceResult poisoned: initializer panicked"),
        }
    }

    /// # Safety
    ///
    /// The state must have been observed as READY.
    unsafe fn read(&self) -> &T {
        // SAFETY: Caller guarantees the value was written and published.
        self.value.with(|slot| unsafe { (*slot).assume_init_ref() })
    }
}

impl<T> Default for OnceResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OnceResult<T> {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY means the value is initialized, and `&mut self`
            // guarantees no outstanding borrows.
            self.value.with_mut(|slot| unsafe { (*slot).assume_init_drop() });
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for OnceResult<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut d = f.debug_struct("OnceResult");
        match self.state.load(Ordering::Acquire) {
            // SAFETY: READY observed with Acquire.
            READY => d.field("value", unsafe { self.read() }),
            POISONED => d.field("value", &format_args!("<poisoned>")),
            _ => d.field("value", &format_args!("<pending>")),
        };
        d.finish()
    }
}
