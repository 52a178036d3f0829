//! Core types and synchronization primitives for the Boson loader.
//!
//! This crate holds the host-testable building blocks shared by the
//! driver API and the loader itself: typed identifiers and the two
//! synchronization primitives every dispatch path relies on.
//!
//! - [`sync::OnceResult`] runs an initializer exactly once and hands the
//!   same outcome to every caller, including callers that raced it.
//! - [`sync::Published`] holds a `'static` reference behind an atomic
//!   pointer so readers never take a lock.
//!
//! Both primitives go through [`sync::loom_compat`] and can be model
//! checked with `--cfg loom` or `--cfg shuttle`.

#![warn(missing_docs)]

pub mod id;
pub mod sync;

pub use id::{DeviceId, DriverIndex};
