//! Type-safe identifiers for loader resources.
//!
//! These newtypes keep flat device numbers and positions in the driver
//! list from being mixed up with each other or with raw handle values.

use core::fmt;

/// Process-wide flat device identifier.
///
/// Identifiers are dense and zero-based across every initialized driver.
/// [`DeviceId::INVALID`] is the "not found" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Returned when a handle has no identifier.
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates a new `DeviceId`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the value as `usize` (convenience for indexing).
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns `false` for [`DeviceId::INVALID`].
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("<invalid>")
        }
    }
}

/// Position of a driver in the resolved (post-ordering) driver list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DriverIndex(u32);

impl DriverIndex {
    /// Creates a new `DriverIndex`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the value as `usize` (convenience for indexing).
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DriverIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_roundtrip() {
        let id = DeviceId::new(3);
        assert_eq!(id.as_u32(), 3);
        assert_eq!(id.as_usize(), 3);
        assert!(id.is_valid());
    }

    #[test]
    fn invalid_sentinel_is_max() {
        assert_eq!(DeviceId::INVALID.as_u32(), u32::MAX);
        assert!(!DeviceId::INVALID.is_valid());
    }

    #[test]
    fn device_id_display() {
        assert_eq!(format!("{}", DeviceId::new(7)), "7");
        assert_eq!(format!("{}", DeviceId::INVALID), "<invalid>");
    }

    #[test]
    fn driver_index_ordering() {
        assert!(DriverIndex::new(0) < DriverIndex::new(1));
        assert_eq!(DriverIndex::new(4).as_usize(), 4);
    }
}
