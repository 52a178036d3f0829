//! API tracing.
//!
//! Tracers register prologue and epilogue [`CallbackTable`]s through the
//! [`TracerDdi`] interface. While layer-wide tracing is enabled, the core,
//! tools, and sysman layers dispatch through the `Traced*` wrappers, which
//! run the callbacks of every enabled tracer around the real call.

pub mod callbacks;
pub mod traced;
pub mod tracer;

pub use callbacks::{ApiFunction, Callback, CallbackData, CallbackTable, TraceParams};
pub use traced::{
    CallOutcome, ContextParams, DeviceParams, DeviceResetParams, TracedCore, TracedSysman,
    TracedTools, traced_call,
};
pub use tracer::{
    ActiveTracer, Tracer, TracerDdi, TracerDesc, TracerHandle, TracerRegistry, TracerState,
};
