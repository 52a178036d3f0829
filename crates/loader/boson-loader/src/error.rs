//! Errors raised by the loader's own plumbing.
//!
//! These never cross the public call surface directly. Configuration and
//! discovery problems are logged and the affected driver or file is
//! skipped; callers only ever see a [`Status`].

use std::io;
use std::path::PathBuf;

use boson_driver_api::Status;

/// Errors from configuration loading and driver discovery.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// A configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A configuration file is not valid TOML for [`LoaderConfig`](crate::LoaderConfig).
    #[error("invalid loader configuration {}: {source}", path.display())]
    Config {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// An environment variable holds a value that cannot be used.
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },

    /// A shared library could not be loaded.
    #[error("failed to load driver library {}: {source}", path.display())]
    Library {
        /// Library that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A required entry point is missing from a driver library.
    #[error("{}: missing required symbol {symbol}", path.display())]
    MissingSymbol {
        /// Library that failed.
        path: PathBuf,
        /// Symbol that was not found.
        symbol: &'static str,
    },

    /// A driver was built against an incompatible table version.
    #[error("{}: table version {found:#x} is incompatible with {expected:#x}", path.display())]
    VersionMismatch {
        /// Library that failed.
        path: PathBuf,
        /// Version the driver reported.
        found: u32,
        /// Version the loader speaks.
        expected: u32,
    },

    /// A driver entry point returned a failure.
    #[error("{}: {call} failed: {status}", path.display())]
    DriverCall {
        /// Library that failed.
        path: PathBuf,
        /// Entry point name.
        call: &'static str,
        /// Returned status.
        status: Status,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_symbol_message() {
        let err = LoaderError::MissingSymbol {
            path: PathBuf::from("libboson_driver_x.so"),
            symbol: "bosonDriverInit",
        };
        assert_eq!(
            err.to_string(),
            "libboson_driver_x.so: missing required symbol bosonDriverInit"
        );
    }

    #[test]
    fn io_error_has_source() {
        use std::error::Error as _;
        let err = LoaderError::Io {
            path: PathBuf::from("/nope.toml"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("failed to read /nope.toml"));
    }

    #[test]
    fn version_mismatch_is_hex() {
        let err = LoaderError::VersionMismatch {
            path: PathBuf::from("d.so"),
            found: 0x0002_0000,
            expected: 0x0001_0000,
        };
        assert_eq!(
            err.to_string(),
            "d.so: table version 0x20000 is incompatible with 0x10000"
        );
    }
}
