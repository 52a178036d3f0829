//! Opaque driver-owned handles.
//!
//! Handles are whatever non-null word a driver chooses to hand out,
//! usually a pointer into its own heap. The loader never dereferences them.

use core::fmt;
use core::num::NonZeroUsize;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(NonZeroUsize);

        impl $name {
            /// Wraps a raw handle value; `0` is the null handle and yields `None`.
            pub const fn from_raw(raw: usize) -> Option<Self> {
                match NonZeroUsize::new(raw) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            /// Returns the raw handle value.
            pub const fn as_raw(self) -> usize {
                self.0.get()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }
    };
}

opaque_handle!(
    /// A device exposed by a driver.
    DeviceHandle
);

opaque_handle!(
    /// A context created on a device.
    ContextHandle
);
