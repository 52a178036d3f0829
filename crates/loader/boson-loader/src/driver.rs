//! Per-driver tracking records.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use boson_core::DriverIndex;
use boson_driver_api::{
    CoreDdi, DriverCategory, DriverInfo, DriverModule, InitFlags, Status, SysmanDdi, ToolsDdi,
};

/// Where a driver came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverSource {
    /// The built-in null driver.
    Null,
    /// Linked into the process and handed to the builder.
    Linked,
    /// Loaded from a shared library.
    Library(PathBuf),
}

impl fmt::Display for DriverSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("builtin"),
            Self::Linked => f.write_str("linked"),
            Self::Library(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A discovered driver before initialization.
pub struct Candidate {
    /// The driver itself.
    pub module: Arc<dyn DriverModule>,
    /// Where it came from.
    pub source: DriverSource,
}

impl Candidate {
    /// Wraps `module`.
    pub fn new(module: Arc<dyn DriverModule>, source: DriverSource) -> Self {
        Self { module, source }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("info", &self.module.info())
            .field("source", &self.source)
            .finish()
    }
}

/// One driver after initialization.
///
/// Records are never removed: a driver whose `init` failed keeps its
/// status here but exposes no layers.
pub struct DriverRecord {
    info: DriverInfo,
    source: DriverSource,
    init_status: Status,
    in_use: AtomicBool,
    core: Option<Arc<dyn CoreDdi>>,
    tools: Option<Arc<dyn ToolsDdi>>,
    sysman: Option<Arc<dyn SysmanDdi>>,
}

impl DriverRecord {
    /// Runs the driver's one-time `init` for every device type and records
    /// the outcome.
    pub fn initialize(candidate: Candidate) -> Self {
        let Candidate { module, source } = candidate;
        let info = module.info();
        let init_status = module.init(InitFlags::empty());
        let usable = init_status.is_success();
        if usable {
            log::info!("driver {} ({}) initialized", info.name, info.category);
        } else {
            log::warn!(
                "driver {} ({}) failed to initialize: {init_status}",
                info.name,
                info.category
            );
        }
        Self {
            core: module.core().filter(|_| usable),
            tools: module.tools().filter(|_| usable),
            sysman: module.sysman().filter(|_| usable),
            info,
            source,
            init_status,
            in_use: AtomicBool::new(false),
        }
    }

    /// Reported name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Reported category.
    pub fn category(&self) -> DriverCategory {
        self.info.category
    }

    /// Origin.
    pub fn source(&self) -> &DriverSource {
        &self.source
    }

    /// Result of the driver's `init`.
    pub fn init_status(&self) -> Status {
        self.init_status
    }

    /// Returns `true` if the driver initialized and takes part in dispatch.
    pub fn is_usable(&self) -> bool {
        self.init_status.is_success()
    }

    /// Records that a handle from this driver reached the application.
    pub fn mark_in_use(&self) {
        if !self.in_use.swap(true, Ordering::AcqRel) {
            log::debug!("driver {} now in use", self.info.name);
        }
    }

    /// Returns `true` once a handle from this driver has escaped.
    pub fn in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    /// Core layer, if provided and initialized.
    pub fn core(&self) -> Option<&Arc<dyn CoreDdi>> {
        self.core.as_ref()
    }

    /// Tools layer, if provided and initialized.
    pub fn tools(&self) -> Option<&Arc<dyn ToolsDdi>> {
        self.tools.as_ref()
    }

    /// System management layer, if provided and initialized.
    pub fn sysman(&self) -> Option<&Arc<dyn SysmanDdi>> {
        self.sysman.as_ref()
    }
}

impl fmt::Debug for DriverRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRecord")
            .field("info", &self.info)
            .field("source", &self.source)
            .field("init_status", &self.init_status)
            .field("in_use", &self.in_use())
            .finish_non_exhaustive()
    }
}

/// Snapshot of a driver record for callers outside the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverView {
    /// Position in the resolved order.
    pub index: DriverIndex,
    /// Reported name.
    pub name: String,
    /// Reported category.
    pub category: DriverCategory,
    /// Where the driver came from.
    pub source: DriverSource,
    /// Result of the driver's `init`.
    pub init_status: Status,
    /// Whether a handle from this driver has reached the application.
    pub in_use: bool,
    /// Devices numbered for this driver.
    pub devices: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use boson_null_driver::{NullDriver, NullDriverConfig};

    fn candidate(config: NullDriverConfig) -> (NullDriver, Candidate) {
        let driver = NullDriver::new(config);
        let candidate = Candidate::new(Arc::new(driver.clone()), DriverSource::Linked);
        (driver, candidate)
    }

    #[test]
    fn successful_init_exposes_layers() {
        let (driver, candidate) = candidate(NullDriverConfig::named("gpu", DriverCategory::Gpu));
        let record = DriverRecord::initialize(candidate);
        assert!(record.is_usable());
        assert!(record.core().is_some());
        assert!(record.tools().is_some());
        assert!(record.sysman().is_some());
        assert_eq!(driver.init_calls(), 1);
    }

    #[test]
    fn failed_init_is_kept_without_layers() {
        let (_, candidate) = candidate(
            NullDriverConfig::named("broken", DriverCategory::Npu)
                .failing_init(Status::DeviceLost),
        );
        let record = DriverRecord::initialize(candidate);
        assert!(!record.is_usable());
        assert_eq!(record.init_status(), Status::DeviceLost);
        assert!(record.core().is_none());
    }

    #[test]
    fn other_category_null_driver_is_unusable() {
        let (_, candidate) = candidate(NullDriverConfig::named("misc", DriverCategory::Other));
        let record = DriverRecord::initialize(candidate);
        assert_eq!(record.category(), DriverCategory::Other);
        assert_eq!(record.name(), "misc");
        assert_eq!(record.init_status(), Status::Uninitialized);
        assert!(!record.is_usable());
    }

    #[test]
    fn in_use_latches() {
        let (_, candidate) = candidate(NullDriverConfig::default());
        let record = DriverRecord::initialize(candidate);
        assert!(!record.in_use());
        record.mark_in_use();
        record.mark_in_use();
        assert!(record.in_use());
    }

    #[test]
    fn source_display() {
        assert_eq!(DriverSource::Null.to_string(), "builtin");
        assert_eq!(
            DriverSource::Library(PathBuf::from("/opt/libboson_driver_x.so")).to_string(),
            "/opt/libboson_driver_x.so"
        );
    }
}
