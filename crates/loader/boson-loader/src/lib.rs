//! Boson runtime dispatch loader.
//!
//! Applications call one API; the loader routes each call to whichever
//! driver owns the handle involved. The crate is organized bottom-up:
//!
//! - **Discovery** -- [`config`], [`discovery`], [`module`], [`ffi_driver`]:
//!   find candidate drivers, from linked modules, the built-in null driver,
//!   and shared libraries.
//! - **Resolution** -- [`ordering`], [`driver`], [`registry`], [`handles`],
//!   [`objects`]: order candidates by policy, initialize them once, number
//!   their devices, and track who owns each handle.
//! - **Dispatch** -- [`layer`], [`routing`], [`validation`], [`tracing`]:
//!   one lazily initialized, atomically published table per API layer,
//!   optionally validated, with a tracing wrapper swapped in while tracing
//!   is enabled.
//! - **Surface** -- [`context`], [`api`], [`error_state`]: the context tying
//!   it together, process-wide entry points, and per-thread error text.
//!
//! ```ignore
//! use boson_loader::{LoaderBuilder, LoaderConfig};
//! use boson_driver_api::InitFlags;
//!
//! let ctx = LoaderBuilder::new(LoaderConfig::default()).build();
//! for driver in ctx.init_drivers(InitFlags::GPU_ONLY)? {
//!     println!("{} {}", driver.index, driver.name);
//! }
//! let devices = ctx.core()?.device_get()?;
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod error_state;
pub mod ffi_driver;
pub mod handles;
pub mod layer;
pub mod module;
pub mod objects;
pub mod ordering;
pub mod registry;
pub mod routing;
pub mod tracing;
pub mod validation;

pub use api::{global, shutdown};
pub use config::{Env, LoaderConfig, LogLevel, ProcessEnv, ValidationConfig};
pub use context::{LoaderBuilder, LoaderContext};
pub use driver::{DriverSource, DriverView};
pub use error::LoaderError;
pub use error_state::last_error_description;
pub use layer::DispatchTable;
pub use registry::Registry;
pub use tracing::{
    ApiFunction, CallbackData, CallbackTable, TracerDesc, TracerHandle, TracerState,
};
pub use validation::{LeakReport, Validator};
