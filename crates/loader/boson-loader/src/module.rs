//! Native module abstraction.
//!
//! The registry only needs three things from a shared library: open it,
//! look up a symbol, and close it. [`NativeModule`] covers the last two
//! (closing is `Drop`), and [`DynamicLibrary`] implements it over
//! `libloading` when the `dynamic` feature is on. Modules are shared as
//! `Arc<dyn NativeModule>`; the last clone to go unloads the library.

use std::ffi::c_void;
use std::path::Path;

/// A loaded native module.
pub trait NativeModule: Send + Sync {
    /// Where the module was loaded from.
    fn path(&self) -> &Path;

    /// Returns the address of `name`, if exported.
    ///
    /// # Safety
    ///
    /// The returned address is only valid while the module stays loaded.
    unsafe fn symbol(&self, name: &str) -> Option<*const c_void>;
}

/// Looks up `name` and reinterprets its address as `F`.
///
/// # Safety
///
/// `F` must be a function pointer type matching the symbol's real
/// signature, and the result must not outlive `module`.
pub unsafe fn symbol_as<F: Copy>(module: &dyn NativeModule, name: &str) -> Option<F> {
    assert_eq!(
        size_of::<F>(),
        size_of::<*const c_void>(),
        "symbol type must be pointer sized"
    );
    // SAFETY: Forwarded to the caller.
    let address = unsafe { module.symbol(name) }?;
    if address.is_null() {
        return None;
    }
    // SAFETY: Sizes match and the caller guarantees the signature.
    Some(unsafe { std::mem::transmute_copy::<*const c_void, F>(&address) })
}

#[cfg(feature = "dynamic")]
pub use dynamic::DynamicLibrary;

#[cfg(feature = "dynamic")]
mod dynamic {
    use std::ffi::c_void;
    use std::path::{Path, PathBuf};

    use libloading::Library;

    use super::NativeModule;
    use crate::error::LoaderError;

    /// A shared library opened with `libloading`.
    #[derive(Debug)]
    pub struct DynamicLibrary {
        path: PathBuf,
        library: Library,
    }

    impl DynamicLibrary {
        /// Opens `path`.
        ///
        /// # Errors
        ///
        /// Returns [`LoaderError::Library`] if the platform loader refuses it.
        ///
        /// # Safety
        ///
        /// Loading runs the library's initializers, which can do anything.
        pub unsafe fn load(path: &Path) -> Result<Self, LoaderError> {
            // SAFETY: Forwarded to the caller.
            let library = unsafe { Library::new(path) }.map_err(|e| LoaderError::Library {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;
            log::debug!("loaded driver library {}", path.display());
            Ok(Self {
                path: path.to_path_buf(),
                library,
            })
        }
    }

    impl NativeModule for DynamicLibrary {
        fn path(&self) -> &Path {
            &self.path
        }

        unsafe fn symbol(&self, name: &str) -> Option<*const c_void> {
            // SAFETY: Reading a symbol's address as a pointer is always valid;
            // using it is the caller's responsibility.
            unsafe { self.library.get::<*const c_void>(name.as_bytes()) }
                .ok()
                .map(|sym| *sym)
        }
    }

    impl Drop for DynamicLibrary {
        fn drop(&mut self) {
            log::debug!("unloading driver library {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// A module whose symbols are plain addresses in this process.
    struct FakeModule {
        path: PathBuf,
        symbols: HashMap<&'static str, usize>,
    }

    impl NativeModule for FakeModule {
        fn path(&self) -> &Path {
            &self.path
        }

        unsafe fn symbol(&self, name: &str) -> Option<*const c_void> {
            self.symbols.get(name).map(|&a| a as *const c_void)
        }
    }

    extern "C" fn answer() -> u32 {
        42
    }

    fn fake(path: &str) -> Arc<dyn NativeModule> {
        let mut symbols = HashMap::new();
        symbols.insert("answer", answer as usize);
        Arc::new(FakeModule {
            path: PathBuf::from(path),
            symbols,
        })
    }

    #[test]
    fn typed_symbol_lookup() {
        let module = fake("a.so");
        let f: Option<extern "C" fn() -> u32> = unsafe { symbol_as(module.as_ref(), "answer") };
        assert_eq!(f.map(|f| f()), Some(42));
        let missing: Option<extern "C" fn() -> u32> =
            unsafe { symbol_as(module.as_ref(), "question") };
        assert!(missing.is_none());
    }

    #[cfg(feature = "dynamic")]
    #[test]
    fn missing_library_fails_to_load() {
        let result = unsafe { DynamicLibrary::load(Path::new("/nonexistent/libboson_driver_x.so")) };
        assert!(matches!(result, Err(crate::error::LoaderError::Library { .. })));
    }
}
