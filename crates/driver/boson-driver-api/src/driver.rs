//! The driver module interface.

use std::sync::Arc;

use crate::category::{DriverCategory, InitFlags};
use crate::ddi::{CoreDdi, SysmanDdi, ToolsDdi};
use crate::status::Status;

/// Identity a driver reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    /// Driver name (informational, for logging).
    pub name: String,
    /// What the driver backs.
    pub category: DriverCategory,
}

impl DriverInfo {
    /// Creates a new `DriverInfo`.
    pub fn new(name: impl Into<String>, category: DriverCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}

/// A backing driver, however it was linked.
///
/// The loader calls [`DriverModule::init`] once, then asks for each
/// layer's dispatch interface. Returning `None` for a layer means the
/// driver does not provide that layer at all.
pub trait DriverModule: Send + Sync {
    /// Reports name and category.
    fn info(&self) -> DriverInfo;

    /// Initializes the driver for the requested device types.
    fn init(&self, flags: InitFlags) -> Status;

    /// Core layer interface.
    fn core(&self) -> Option<Arc<dyn CoreDdi>>;

    /// Tools layer interface.
    fn tools(&self) -> Option<Arc<dyn ToolsDdi>> {
        None
    }

    /// System management layer interface.
    fn sysman(&self) -> Option<Arc<dyn SysmanDdi>> {
        None
    }
}
