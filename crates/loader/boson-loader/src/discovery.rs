//! Driver discovery.
//!
//! Candidates are gathered in a fixed order: drivers linked in by the
//! builder, the null driver when enabled, libraries named explicitly in
//! the configuration, then libraries found by scanning each search
//! directory. Anything that fails to load is logged and skipped.
//!
//! A library-backed candidate owns its library, so the library stays
//! loaded for as long as the driver or any interface it handed out is
//! reachable.

use std::collections::HashSet;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use boson_null_driver::{NullDriver, NullDriverConfig};
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::driver::{Candidate, DriverSource};

/// File name stem shared by every driver library.
pub const DRIVER_LIBRARY_STEM: &str = "boson_driver_";

/// Returns `true` if `file_name` looks like a driver library on this platform.
pub fn is_driver_library(file_name: &str) -> bool {
    file_name
        .strip_prefix(DLL_PREFIX)
        .and_then(|rest| rest.strip_prefix(DRIVER_LIBRARY_STEM))
        .and_then(|rest| rest.strip_suffix(DLL_SUFFIX))
        .is_some_and(|name| !name.is_empty())
}

/// Lists driver libraries directly inside `dir`, sorted by file name.
pub fn scan_directory(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("skipping unreadable entry in {}: {e}", dir.display());
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .filter(|entry| entry.file_name().to_str().is_some_and(is_driver_library))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Resolves an explicitly configured driver name.
///
/// Paths are used as given. A bare name is looked up in each search
/// directory, and otherwise left for the platform loader to find.
pub fn resolve_driver_name(name: &str, search_paths: &[PathBuf]) -> PathBuf {
    let path = Path::new(name);
    if path.components().count() > 1 || path.is_absolute() {
        return path.to_path_buf();
    }
    search_paths
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Builds the null driver described by `config`.
pub fn null_driver(config: &LoaderConfig) -> Candidate {
    let category = config.null_driver_type;
    let name = format!("null-{}", category.name().to_ascii_lowercase());
    let driver = NullDriver::new(
        NullDriverConfig::named(name, category).with_devices(config.null_driver_devices),
    );
    Candidate::new(Arc::new(driver), DriverSource::Null)
}

/// Gathers every driver candidate, in discovery order.
pub fn discover(config: &LoaderConfig, linked: Vec<Candidate>) -> Vec<Candidate> {
    let mut candidates = linked;

    if config.enable_null_driver {
        log::debug!("null driver enabled as {}", config.null_driver_type);
        candidates.push(null_driver(config));
    }

    let named = config
        .driver_names
        .iter()
        .map(|name| resolve_driver_name(name, &config.driver_search_paths));
    let scanned = config
        .driver_search_paths
        .iter()
        .flat_map(|dir| scan_directory(dir));

    let mut seen = HashSet::new();
    for path in named.chain(scanned) {
        let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if !seen.insert(key) {
            log::debug!("{} already discovered", path.display());
            continue;
        }
        candidates.extend(load_library(&path));
    }

    log::debug!("discovered {} driver(s)", candidates.len());
    candidates
}

#[cfg(feature = "dynamic")]
fn load_library(path: &Path) -> Option<Candidate> {
    use crate::ffi_driver::FfiDriver;
    use crate::module::{DynamicLibrary, NativeModule};

    // SAFETY: Driver libraries are trusted to follow the ffi contract.
    let loaded = unsafe { DynamicLibrary::load(path) }.and_then(|library| {
        let library: Arc<dyn NativeModule> = Arc::new(library);
        unsafe { FfiDriver::from_module(library) }
    });
    match loaded {
        Ok(driver) => {
            log::info!("loaded driver library {}", path.display());
            Some(Candidate::new(
                Arc::new(driver),
                DriverSource::Library(path.to_path_buf()),
            ))
        }
        Err(e) => {
            log::warn!("skipping driver: {e}");
            None
        }
    }
}

#[cfg(not(feature = "dynamic"))]
fn load_library(path: &Path) -> Option<Candidate> {
    log::warn!(
        "skipping driver {}: built without dynamic loading",
        path.display()
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use boson_driver_api::DriverCategory;

    fn library_name(name: &str) -> String {
        format!("{DLL_PREFIX}{DRIVER_LIBRARY_STEM}{name}{DLL_SUFFIX}")
    }

    #[test]
    fn library_name_filter() {
        assert!(is_driver_library(&library_name("gpu")));
        assert!(!is_driver_library(&library_name("")));
        assert!(!is_driver_library(&format!("{DLL_PREFIX}other{DLL_SUFFIX}")));
        assert!(!is_driver_library(&format!("{DLL_PREFIX}{DRIVER_LIBRARY_STEM}gpu.txt")));
    }

    #[test]
    fn scan_is_sorted_and_shallow() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            std::fs::write(dir.path().join(library_name(name)), b"").unwrap();
        }
        std::fs::write(dir.path().join("README"), b"").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join(library_name("deep")), b"").unwrap();

        let found: Vec<_> = scan_directory(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            found,
            [library_name("alpha"), library_name("mid"), library_name("zeta")]
        );
    }

    #[test]
    fn missing_directory_scans_empty() {
        assert!(scan_directory(Path::new("/nonexistent/boson/drivers")).is_empty());
    }

    #[test]
    fn bare_names_resolve_against_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let name = library_name("local");
        std::fs::write(dir.path().join(&name), b"").unwrap();
        let paths = vec![dir.path().to_path_buf()];
        assert_eq!(resolve_driver_name(&name, &paths), dir.path().join(&name));
        assert_eq!(
            resolve_driver_name("libsystem.so", &paths),
            PathBuf::from("libsystem.so")
        );
        assert_eq!(
            resolve_driver_name("/abs/lib.so", &paths),
            PathBuf::from("/abs/lib.so")
        );
    }

    #[test]
    fn null_driver_follows_config() {
        let config = LoaderConfig {
            enable_null_driver: true,
            null_driver_type: DriverCategory::Npu,
            null_driver_devices: 3,
            ..LoaderConfig::default()
        };
        let discovered = discover(&config, Vec::new());
        assert_eq!(discovered.len(), 1);
        let candidate = &discovered[0];
        let info = candidate.module.info();
        assert_eq!(info.name, "null-npu");
        assert_eq!(info.category, DriverCategory::Npu);
        assert_eq!(candidate.source, DriverSource::Null);
        assert_eq!(candidate.module.core().unwrap().device_get().unwrap().len(), 3);
    }

    #[test]
    fn linked_drivers_come_first() {
        let config = LoaderConfig {
            enable_null_driver: true,
            ..LoaderConfig::default()
        };
        let linked = NullDriver::new(NullDriverConfig::named("linked", DriverCategory::Npu));
        let discovered = discover(
            &config,
            vec![Candidate::new(Arc::new(linked), DriverSource::Linked)],
        );
        let names: Vec<_> = discovered.iter().map(|c| c.module.info().name).collect();
        assert_eq!(names, ["linked", "null-gpu"]);
    }

    #[test]
    fn unloadable_libraries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(library_name("garbage")), b"not a library").unwrap();
        let config = LoaderConfig {
            driver_search_paths: vec![dir.path().to_path_buf()],
            ..LoaderConfig::default()
        };
        let discovered = discover(&config, Vec::new());
        assert!(discovered.is_empty());
    }
}
