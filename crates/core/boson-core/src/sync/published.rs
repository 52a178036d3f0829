//! Atomically published `'static` references.
//!
//! Provides [`Published`], an atomic slot holding either nothing or a
//! `&'static T`. Readers take a single atomic load and never lock.
//! Writers store with sequentially consistent ordering, so a new value is
//! visible to every thread once the store returns.
//!
//! Values are never reclaimed by the slot. Anything published must live
//! for the rest of the process, typically by leaking a `Box`.

use core::ptr;

use super::loom_compat::{AtomicPtr, Ordering};

/// An atomic slot for a `&'static T`.
pub struct Published<T: 'static> {
    ptr: AtomicPtr<T>,
}

impl<T: 'static> Published<T> {
    /// Creates an empty slot.
    #[cfg(not(any(loom, shuttle)))]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Creates an empty slot.
    #[cfg(any(loom, shuttle))]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Loads the current value.
    #[inline]
    pub fn load(&self) -> Option<&'static T> {
        let ptr = self.ptr.load(Ordering::Acquire);
        // SAFETY: Only null or pointers derived from `&'static T` are stored.
        unsafe { ptr.as_ref() }
    }

    /// Publishes `value`, replacing whatever was there.
    pub fn store(&self, value: &'static T) {
        self.ptr.store(to_ptr(value), Ordering::SeqCst);
    }

    /// Publishes `value` and returns the previous one.
    pub fn swap(&self, value: Option<&'static T>) -> Option<&'static T> {
        let new = value.map_or(ptr::null_mut(), to_ptr);
        let old = self.ptr.swap(new, Ordering::SeqCst);
        // SAFETY: Same invariant as `load`.
        unsafe { old.as_ref() }
    }

    /// Returns `true` if the slot currently holds exactly `value`.
    pub fn holds(&self, value: &'static T) -> bool {
        ptr::eq(self.ptr.load(Ordering::Acquire), value)
    }

    /// Returns `true` if nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.ptr.load(Ordering::Acquire).is_null()
    }
}

impl<T: 'static> Default for Published<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: 'static> core::fmt::Debug for Published<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Published")
            .field(&self.ptr.load(Ordering::Relaxed))
            .finish()
    }
}

fn to_ptr<T>(value: &'static T) -> *mut T {
    ptr::from_ref(value).cast_mut()
}

// SAFETY: The slot only hands out shared `&'static T`, so it is as
// thread-safe as sharing `&T` itself.
unsafe impl<T: Sync + 'static> Send for Published<T> {}
unsafe impl<T: Sync + 'static> Sync for Published<T> {}

#[cfg(all(test, not(any(loom, shuttle))))]
mod tests {
    use super::*;

    static FIRST: u32 = 1;
    static SECOND: u32 = 2;

    #[test]
    fn starts_empty() {
        let slot: Published<u32> = Published::empty();
        assert!(slot.is_empty());
        assert!(slot.load().is_none());
    }

    #[test]
    fn store_then_load() {
        let slot = Published::empty();
        slot.store(&FIRST);
        assert_eq!(slot.load(), Some(&1));
        assert!(slot.holds(&FIRST));
        assert!(!slot.holds(&SECOND));
    }

    #[test]
    fn swap_returns_previous_pointer() {
        let slot = Published::empty();
        assert!(slot.swap(Some(&FIRST)).is_none());
        let old = slot.swap(Some(&SECOND));
        assert!(old.is_some_and(|v| ptr::eq(v, &FIRST)));
        assert!(slot.holds(&SECOND));
    }

    #[test]
    fn swap_none_clears() {
        let slot = Published::empty();
        slot.store(&FIRST);
        slot.swap(None);
        assert!(slot.is_empty());
    }

    #[test]
    fn leaked_values_are_published() {
        let slot = Published::empty();
        let table: &'static Vec<u8> = Box::leak(Box::new(vec![1, 2, 3]));
        slot.store(table);
        assert_eq!(slot.load().map(Vec::len), Some(3));
    }
}
