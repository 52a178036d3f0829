//! Driver-facing contract for the Boson dispatch loader.
//!
//! This crate defines what a backing driver looks like to the loader:
//!
//! - **Layer 0** -- Result codes ([`Status`]) and opaque handles ([`DeviceHandle`],
//!   [`ContextHandle`]).
//! - **Layer 1** -- Identity: [`DriverCategory`], [`DriverInfo`] and the
//!   initialization filter [`InitFlags`].
//! - **Layer 2** -- Dispatch interfaces, one per API layer ([`CoreDdi`], [`ToolsDdi`],
//!   [`SysmanDdi`]). Every method defaults to [`Status::UnsupportedFeature`].
//! - **Layer 3** -- The [`DriverModule`] trait tying identity and dispatch together,
//!   plus [`StaticDriverEntry`] for drivers linked into the process and [`ffi`] for
//!   drivers loaded from shared libraries.

pub mod category;
pub mod ddi;
pub mod driver;
pub mod ffi;
pub mod handle;
pub mod registration;
pub mod status;
pub mod types;

// Re-export all public types at the crate root for ergonomic imports.
pub use category::{DriverCategory, InitFlags};
pub use ddi::{CoreDdi, Layer, SysmanDdi, ToolsDdi};
pub use driver::{DriverInfo, DriverModule};
pub use handle::{ContextHandle, DeviceHandle};
pub use registration::StaticDriverEntry;
pub use status::Status;
pub use types::{DebugProperties, DeviceProperties, DeviceState, DeviceType, MetricGroup, PowerUsage};
