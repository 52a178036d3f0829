//! Driver categories and the initialization type filter.

use core::fmt;
use core::str::FromStr;

/// The kind of hardware a driver backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DriverCategory {
    /// Only discrete GPUs.
    DiscreteGpu = 0,
    /// Only integrated GPUs.
    IntegratedGpu = 1,
    /// GPUs of any form factor.
    Gpu = 2,
    /// Neural processing units.
    Npu = 3,
    /// Several kinds of device behind one driver.
    Mixed = 4,
    /// Anything else.
    Other = 5,
}

impl DriverCategory {
    /// All categories, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::DiscreteGpu,
        Self::IntegratedGpu,
        Self::Gpu,
        Self::Npu,
        Self::Mixed,
        Self::Other,
    ];

    /// Returns the configuration name of this category.
    pub const fn name(self) -> &'static str {
        match self {
            Self::DiscreteGpu => "DISCRETE_GPU",
            Self::IntegratedGpu => "INTEGRATED_GPU",
            Self::Gpu => "GPU",
            Self::Npu => "NPU",
            Self::Mixed => "MIXED",
            Self::Other => "OTHER",
        }
    }

    /// Decodes the C ABI value; unknown values become [`DriverCategory::Other`].
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::DiscreteGpu,
            1 => Self::IntegratedGpu,
            2 => Self::Gpu,
            3 => Self::Npu,
            4 => Self::Mixed,
            _ => Self::Other,
        }
    }

    /// Returns the C ABI value.
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for DriverCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a category name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown driver category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for DriverCategory {
    type Err = UnknownCategory;

    /// Parses a configuration name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

bitflags::bitflags! {
    /// Which driver types an initialization call asks for.
    ///
    /// An empty set asks for every supported type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InitFlags: u32 {
        /// GPU drivers of any form factor.
        const GPU_ONLY = 1 << 0;
        /// NPU drivers.
        const NPU_ONLY = 1 << 1;
    }
}

impl InitFlags {
    /// Returns `true` if a driver of `category` satisfies this request.
    ///
    /// [`DriverCategory::Other`] satisfies no request.
    pub fn admits(self, category: DriverCategory) -> bool {
        let wanted = if self.is_empty() { Self::all() } else { self };
        match category {
            DriverCategory::DiscreteGpu | DriverCategory::IntegratedGpu | DriverCategory::Gpu => {
                wanted.contains(Self::GPU_ONLY)
            }
            DriverCategory::Npu => wanted.contains(Self::NPU_ONLY),
            DriverCategory::Mixed => wanted.intersects(Self::GPU_ONLY | Self::NPU_ONLY),
            DriverCategory::Other => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("npu".parse(), Ok(DriverCategory::Npu));
        assert_eq!("Discrete_GPU".parse(), Ok(DriverCategory::DiscreteGpu));
        assert!("fpga".parse::<DriverCategory>().is_err());
    }

    #[test]
    fn raw_roundtrip() {
        for category in DriverCategory::ALL {
            assert_eq!(DriverCategory::from_raw(category.to_raw()), category);
        }
        assert_eq!(DriverCategory::from_raw(99), DriverCategory::Other);
    }

    #[test]
    fn gpu_flag_admits_every_gpu_form() {
        let flags = InitFlags::GPU_ONLY;
        assert!(flags.admits(DriverCategory::DiscreteGpu));
        assert!(flags.admits(DriverCategory::IntegratedGpu));
        assert!(flags.admits(DriverCategory::Gpu));
        assert!(flags.admits(DriverCategory::Mixed));
        assert!(!flags.admits(DriverCategory::Npu));
    }

    #[test]
    fn npu_flag_rejects_gpus() {
        let flags = InitFlags::NPU_ONLY;
        assert!(flags.admits(DriverCategory::Npu));
        assert!(!flags.admits(DriverCategory::Gpu));
    }

    #[test]
    fn empty_flags_admit_all_but_other() {
        let flags = InitFlags::empty();
        assert!(flags.admits(DriverCategory::Gpu));
        assert!(flags.admits(DriverCategory::Npu));
        assert!(!flags.admits(DriverCategory::Other));
    }
}
