//! Static driver registration.
//!
//! Drivers linked directly into the process describe themselves with a
//! [`StaticDriverEntry`] and hand it to the loader, which treats them the
//! same as drivers loaded from shared libraries.

use std::sync::Arc;

use crate::category::DriverCategory;
use crate::driver::DriverModule;

/// A driver compiled into the process.
#[derive(Clone, Copy)]
pub struct StaticDriverEntry {
    /// Driver name (for logging).
    pub name: &'static str,
    /// Category the driver will report.
    pub category: DriverCategory,
    /// Builds the driver instance.
    pub create: fn() -> Arc<dyn DriverModule>,
}

impl core::fmt::Debug for StaticDriverEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StaticDriverEntry")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Declare a static driver entry.
///
/// # Example
///
/// ```ignore
/// boson_driver_api::static_driver_entry!(MY_DRIVER, StaticDriverEntry {
///     name: "my_driver",
///     category: DriverCategory::Gpu,
///     create: || Arc::new(MyDriver::default()),
/// });
/// ```
#[macro_export]
macro_rules! static_driver_entry {
    ($name:ident, $entry:expr) => {
        /// Static registration entry for this driver.
        pub static $name: $crate::registration::StaticDriverEntry = $entry;
    };
}
