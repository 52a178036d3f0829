//! API result codes.

use core::fmt;

/// Result code of every dispatched operation.
///
/// Drivers report these and the loader forwards them unchanged. The loader
/// itself only ever produces [`Status::Uninitialized`] and
/// [`Status::UnsupportedFeature`] at the dispatch boundary, plus the tracer
/// lifecycle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    /// The operation completed.
    Success = 0,
    /// A synchronization primitive is not yet signaled.
    NotReady = 1,
    /// A previously valid device became unusable.
    DeviceLost = 2,
    /// Host allocation failed.
    OutOfHostMemory = 3,
    /// The layer never initialized, or teardown has begun.
    Uninitialized = 4,
    /// The driver's table version is not understood.
    UnsupportedVersion = 5,
    /// The layer initialized but the backing driver lacks this operation.
    UnsupportedFeature = 6,
    /// An argument violates a documented precondition.
    InvalidArgument = 7,
    /// A handle argument is null or unknown.
    InvalidNullHandle = 8,
    /// A pointer argument is null.
    InvalidNullPointer = 9,
    /// An enumeration argument is out of range.
    InvalidEnumeration = 10,
    /// The object is still in use and cannot be destroyed.
    HandleObjectInUse = 11,
    /// The requested resource is not available.
    NotAvailable = 12,
    /// Any code not listed above.
    Unknown = 0x7fff_fffe,
}

impl Status {
    /// Returns `true` for [`Status::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Converts `Success` to `Ok(())` and everything else to `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns `self` when it is not [`Status::Success`].
    pub const fn into_result(self) -> Result<(), Status> {
        match self {
            Self::Success => Ok(()),
            other => Err(other),
        }
    }

    /// Returns the raw code used across the C ABI.
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    /// Decodes a raw code, mapping anything unrecognized to [`Status::Unknown`].
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Success,
            1 => Self::NotReady,
            2 => Self::DeviceLost,
            3 => Self::OutOfHostMemory,
            4 => Self::Uninitialized,
            5 => Self::UnsupportedVersion,
            6 => Self::UnsupportedFeature,
            7 => Self::InvalidArgument,
            8 => Self::InvalidNullHandle,
            9 => Self::InvalidNullPointer,
            10 => Self::InvalidEnumeration,
            11 => Self::HandleObjectInUse,
            12 => Self::NotAvailable,
            _ => Self::Unknown,
        }
    }

    /// Fixed description recorded as a thread's last error.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::NotReady => "ERROR NOT READY",
            Self::DeviceLost => "ERROR DEVICE LOST",
            Self::OutOfHostMemory => "ERROR OUT OF HOST MEMORY",
            Self::Uninitialized => "ERROR UNINITIALIZED",
            Self::UnsupportedVersion => "ERROR UNSUPPORTED VERSION",
            Self::UnsupportedFeature => "ERROR UNSUPPORTED FEATURE",
            Self::InvalidArgument => "ERROR INVALID ARGUMENT",
            Self::InvalidNullHandle => "ERROR INVALID NULL HANDLE",
            Self::InvalidNullPointer => "ERROR INVALID NULL POINTER",
            Self::InvalidEnumeration => "ERROR INVALID ENUMERATION",
            Self::HandleObjectInUse => "ERROR HANDLE OBJECT IN USE",
            Self::NotAvailable => "ERROR NOT AVAILABLE",
            Self::Unknown => "ERROR UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::NotReady => f.write_str("not ready"),
            Self::DeviceLost => f.write_str("device lost"),
            Self::OutOfHostMemory => f.write_str("out of host memory"),
            Self::Uninitialized => f.write_str("not initialized"),
            Self::UnsupportedVersion => f.write_str("unsupported version"),
            Self::UnsupportedFeature => f.write_str("operation not supported"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::InvalidNullHandle => f.write_str("invalid null handle"),
            Self::InvalidNullPointer => f.write_str("invalid null pointer"),
            Self::InvalidEnumeration => f.write_str("invalid enumeration"),
            Self::HandleObjectInUse => f.write_str("handle object in use"),
            Self::NotAvailable => f.write_str("not available"),
            Self::Unknown => f.write_str("unknown error"),
        }
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_loader_codes() {
        assert_eq!(format!("{}", Status::Uninitialized), "not initialized");
        assert_eq!(
            format!("{}", Status::UnsupportedFeature),
            "operation not supported"
        );
        assert_eq!(
            format!("{}", Status::HandleObjectInUse),
            "handle object in use"
        );
    }

    #[test]
    fn descriptions_match_last_error_strings() {
        assert_eq!(Status::Uninitialized.description(), "ERROR UNINITIALIZED");
        assert_eq!(
            Status::UnsupportedFeature.description(),
            "ERROR UNSUPPORTED FEATURE"
        );
    }

    #[test]
    fn raw_codes_roundtrip() {
        for status in [
            Status::Success,
            Status::DeviceLost,
            Status::Uninitialized,
            Status::UnsupportedFeature,
            Status::HandleObjectInUse,
            Status::Unknown,
        ] {
            assert_eq!(Status::from_raw(status.to_raw()), status);
        }
    }

    #[test]
    fn unrecognized_raw_code_is_unknown() {
        assert_eq!(Status::from_raw(0xdead), Status::Unknown);
    }

    #[test]
    fn into_result_splits_success() {
        assert_eq!(Status::Success.into_result(), Ok(()));
        assert_eq!(
            Status::DeviceLost.into_result(),
            Err(Status::DeviceLost)
        );
        assert!(Status::Success.is_success());
        assert!(!Status::NotReady.is_success());
    }
}
