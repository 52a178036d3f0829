//! Per-thread description of the last loader-produced failure.

use std::cell::Cell;

use boson_driver_api::Status;

thread_local! {
    static LAST_ERROR: Cell<Option<&'static str>> = const { Cell::new(None) };
}

/// Records `status` as the calling thread's last error and returns it.
pub fn record(status: Status) -> Status {
    if !status.is_success() {
        LAST_ERROR.set(Some(status.description()));
    }
    status
}

/// [`record`] for `Result`-returning paths.
///
/// # Errors
///
/// Passes `result`'s error through after recording it.
pub fn record_err<T>(result: Result<T, Status>) -> Result<T, Status> {
    result.map_err(record)
}

/// Description of the last failure the loader produced on this thread.
pub fn last_error_description() -> Option<&'static str> {
    LAST_ERROR.get()
}

/// Forgets this thread's last error.
pub fn clear_last_error() {
    LAST_ERROR.set(None);
}
