//! Synchronization primitives used on every dispatch path.

pub(crate) mod loom_compat;
pub mod once;
pub mod published;

pub use once::OnceResult;
pub use published::Published;
