//! Validation layer.
//!
//! When enabled, the core, tools and sysman layers dispatch through the
//! `Validated*` wrappers, installed beneath any tracing wrapper. Three
//! independent checks are available:
//!
//! - **Parameter validation** rejects device handles the loader never
//!   enumerated.
//! - **Handle lifetime** tracks live contexts. Destroying an unknown or
//!   already destroyed context fails, as does an unforced reset of a
//!   device that still has contexts.
//! - **Leak checker** counts successful creates and destroys and reports
//!   the balance at teardown.

pub mod validated;
pub mod validator;

pub use validated::{ValidatedCore, ValidatedSysman, ValidatedTools};
pub use validator::{LeakReport, Validator};
