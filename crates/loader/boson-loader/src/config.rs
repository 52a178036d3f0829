//! Loader configuration.
//!
//! Built in three steps: defaults, then an optional TOML file named by
//! `BOSON_LOADER_CONFIG`, then individual environment overrides. All
//! environment access goes through [`Env`] so tests never touch the real
//! process environment.
//!
//! ```toml
//! drivers_order = "NPU,DISCRETE_GPU_ONLY"
//! enable_null_driver = true
//! null_driver_type = "NPU"
//! null_driver_devices = 2
//! driver_search_paths = ["/opt/boson/drivers"]
//! log_level = "debug"
//!
//! [validation]
//! enabled = true
//! leak_checker = false
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use boson_driver_api::DriverCategory;
use serde::{Deserialize, Deserializer};

use crate::error::LoaderError;

/// Path of a TOML configuration file.
pub const ENV_CONFIG_FILE: &str = "BOSON_LOADER_CONFIG";
/// Driver ordering policy string.
pub const ENV_DRIVERS_ORDER: &str = "BOSON_DRIVERS_ORDER";
/// `1` enables the built-in null driver.
pub const ENV_ENABLE_NULL_DRIVER: &str = "BOSON_ENABLE_NULL_DRIVER";
/// Category the null driver reports.
pub const ENV_NULL_DRIVER_TYPE: &str = "BOSON_NULL_DRIVER_TYPE";
/// `1` starts with layer-wide tracing enabled.
pub const ENV_ENABLE_TRACING_LAYER: &str = "BOSON_ENABLE_TRACING_LAYER";
/// Directories searched for driver libraries.
pub const ENV_DRIVER_PATHS: &str = "BOSON_DRIVER_PATHS";
/// Maximum log level.
pub const ENV_LOG_LEVEL: &str = "BOSON_LOG_LEVEL";
/// `1` wraps every layer in the validation layer.
pub const ENV_ENABLE_VALIDATION_LAYER: &str = "BOSON_ENABLE_VALIDATION_LAYER";
/// Validation of handle arguments against the enumerated devices.
pub const ENV_ENABLE_PARAMETER_VALIDATION: &str = "BOSON_ENABLE_PARAMETER_VALIDATION";
/// Tracking of context lifetimes.
pub const ENV_ENABLE_HANDLE_LIFETIME: &str = "BOSON_ENABLE_HANDLE_LIFETIME";
/// Counting of create and destroy calls.
pub const ENV_ENABLE_BASIC_LEAK_CHECKER: &str = "BOSON_ENABLE_BASIC_LEAK_CHECKER";

/// Source of environment variables.
pub trait Env {
    /// Returns the value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Env for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl Env for HashMap<&str, &str> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| (*v).to_string())
    }
}

/// Reads a boolean switch: exactly `"1"` is true, anything else (or unset) is false.
pub fn getenv_tobool(env: &dyn Env, key: &str) -> bool {
    env.var(key).is_some_and(|v| v == "1")
}

/// Maximum log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Diagnostics.
    Debug,
    /// Progress messages.
    Info,
    /// Unexpected conditions.
    Warn,
    /// Failures.
    Error,
    /// Nothing.
    Off,
}

impl LogLevel {
    /// Converts to the `log` crate's filter.
    pub const fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Trace => log::LevelFilter::Trace,
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warn => log::LevelFilter::Warn,
            Self::Error => log::LevelFilter::Error,
            Self::Off => log::LevelFilter::Off,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "critical" => Ok(Self::Error),
            "off" => Ok(Self::Off),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        })
    }
}

/// Validation layer settings.
///
/// The individual checks only run while `enabled` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Install the validation layer.
    pub enabled: bool,
    /// Reject device arguments the loader never enumerated.
    pub parameter_validation: bool,
    /// Reject destroyed or unknown contexts, and resets of devices that
    /// still have live contexts unless forced.
    pub handle_lifetime: bool,
    /// Count creates and destroys and report the balance at teardown.
    pub leak_checker: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            parameter_validation: true,
            handle_lifetime: true,
            leak_checker: true,
        }
    }
}

impl ValidationConfig {
    fn apply_env(&mut self, env: &dyn Env) {
        for (key, flag) in [
            (ENV_ENABLE_VALIDATION_LAYER, &mut self.enabled),
            (ENV_ENABLE_PARAMETER_VALIDATION, &mut self.parameter_validation),
            (ENV_ENABLE_HANDLE_LIFETIME, &mut self.handle_lifetime),
            (ENV_ENABLE_BASIC_LEAK_CHECKER, &mut self.leak_checker),
        ] {
            if env.var(key).is_some() {
                *flag = getenv_tobool(env, key);
            }
        }
    }
}

/// Effective loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Driver ordering policy; `None` or empty keeps discovery order.
    pub drivers_order: Option<String>,
    /// Load the built-in null driver.
    pub enable_null_driver: bool,
    /// Category reported by the null driver.
    #[serde(deserialize_with = "deserialize_category")]
    pub null_driver_type: DriverCategory,
    /// Devices exposed by the null driver.
    pub null_driver_devices: u32,
    /// Start with layer-wide tracing enabled.
    pub enable_tracing_layer: bool,
    /// Directories scanned for driver libraries.
    pub driver_search_paths: Vec<PathBuf>,
    /// Driver libraries loaded by name or path, before the scanned ones.
    pub driver_names: Vec<String>,
    /// Applied with `log::set_max_level` when set.
    pub log_level: Option<LogLevel>,
    /// Validation layer settings.
    pub validation: ValidationConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            drivers_order: None,
            enable_null_driver: false,
            null_driver_type: DriverCategory::Gpu,
            null_driver_devices: 1,
            enable_tracing_layer: false,
            driver_search_paths: Vec::new(),
            driver_names: Vec::new(),
            log_level: None,
            validation: ValidationConfig::default(),
        }
    }
}

fn deserialize_category<'de, D: Deserializer<'de>>(d: D) -> Result<DriverCategory, D::Error> {
    let name = String::deserialize(d)?;
    name.parse().map_err(serde::de::Error::custom)
}

impl LoaderConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the document is malformed or has unknown keys.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Builds the effective configuration from `env`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration file cannot be read or parsed, or an
    /// override holds an unusable value.
    pub fn load(env: &dyn Env) -> Result<Self, LoaderError> {
        let mut config = match env.var(ENV_CONFIG_FILE) {
            Some(path) if !path.is_empty() => {
                let path = PathBuf::from(path);
                let content = std::fs::read_to_string(&path).map_err(|source| LoaderError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml_str(&content)
                    .map_err(|source| LoaderError::Config { path, source })?
            }
            _ => Self::default(),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    /// Applies environment overrides on top of `self`.
    ///
    /// # Errors
    ///
    /// Fails on an unknown null driver type or log level.
    pub fn apply_env(&mut self, env: &dyn Env) -> Result<(), LoaderError> {
        self.validation.apply_env(env);
        if let Some(order) = env.var(ENV_DRIVERS_ORDER) {
            self.drivers_order = Some(order);
        }
        if env.var(ENV_ENABLE_NULL_DRIVER).is_some() {
            self.enable_null_driver = getenv_tobool(env, ENV_ENABLE_NULL_DRIVER);
        }
        if let Some(kind) = env.var(ENV_NULL_DRIVER_TYPE) {
            self.null_driver_type = kind.trim().parse().map_err(|_| LoaderError::InvalidEnv {
                key: ENV_NULL_DRIVER_TYPE,
                value: kind.clone(),
            })?;
        }
        if env.var(ENV_ENABLE_TRACING_LAYER).is_some() {
            self.enable_tracing_layer = getenv_tobool(env, ENV_ENABLE_TRACING_LAYER);
        }
        if let Some(paths) = env.var(ENV_DRIVER_PATHS) {
            self.driver_search_paths = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(level) = env.var(ENV_LOG_LEVEL) {
            self.log_level = Some(level.parse().map_err(|()| LoaderError::InvalidEnv {
                key: ENV_LOG_LEVEL,
                value: level.clone(),
            })?);
        }
        Ok(())
    }

    /// The ordering policy, or `""` when none is configured.
    pub fn ordering_policy(&self) -> &str {
        self.drivers_order.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn env(pairs: &[(&'static str, &'static str)]) -> HashMap<&'static str, &'static str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn tobool_only_accepts_one() {
        let e = env(&[("A", "1"), ("B", "true"), ("C", "0"), ("D", "")]);
        assert!(getenv_tobool(&e, "A"));
        assert!(!getenv_tobool(&e, "B"));
        assert!(!getenv_tobool(&e, "C"));
        assert!(!getenv_tobool(&e, "D"));
        assert!(!getenv_tobool(&e, "UNSET"));
    }

    #[test]
    fn defaults_without_env() {
        let config = LoaderConfig::load(&env(&[])).unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.ordering_policy(), "");
    }

    #[test]
    fn env_overrides() {
        let e = env(&[
            (ENV_DRIVERS_ORDER, "NPU,0"),
            (ENV_ENABLE_NULL_DRIVER, "1"),
            (ENV_NULL_DRIVER_TYPE, "npu"),
            (ENV_ENABLE_TRACING_LAYER, "1"),
            (ENV_LOG_LEVEL, "debug"),
        ]);
        let config = LoaderConfig::load(&e).unwrap();
        assert_eq!(config.ordering_policy(), "NPU,0");
        assert!(config.enable_null_driver);
        assert_eq!(config.null_driver_type, DriverCategory::Npu);
        assert!(config.enable_tracing_layer);
        assert_eq!(config.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn unknown_null_driver_type_is_rejected() {
        let e = env(&[(ENV_NULL_DRIVER_TYPE, "FPGA")]);
        let err = LoaderConfig::load(&e).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidEnv { key: ENV_NULL_DRIVER_TYPE, .. }));
    }

    #[test]
    fn driver_paths_split() {
        let joined = std::env::join_paths(["/a", "/b"]).unwrap();
        let mut map = HashMap::new();
        map.insert(ENV_DRIVER_PATHS.to_string(), joined.into_string().unwrap());
        let config = LoaderConfig::load(&map).unwrap();
        assert_eq!(
            config.driver_search_paths,
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[test]
    fn toml_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
drivers_order = "GPU"
enable_null_driver = true
null_driver_type = "DISCRETE_GPU"
null_driver_devices = 3
log_level = "warn"
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut map = HashMap::new();
        map.insert(ENV_CONFIG_FILE.to_string(), path);
        map.insert(ENV_DRIVERS_ORDER.to_string(), "NPU".to_string());
        let config = LoaderConfig::load(&map).unwrap();

        assert_eq!(config.ordering_policy(), "NPU");
        assert!(config.enable_null_driver);
        assert_eq!(config.null_driver_type, DriverCategory::DiscreteGpu);
        assert_eq!(config.null_driver_devices, 3);
        assert_eq!(config.log_level, Some(LogLevel::Warn));
    }

    #[test]
    fn validation_settings() {
        let config = LoaderConfig::from_toml_str(
            "[validation]\nenabled = true\nleak_checker = false\n",
        )
        .unwrap();
        assert!(config.validation.enabled);
        assert!(config.validation.parameter_validation);
        assert!(!config.validation.leak_checker);

        let e = env(&[
            (ENV_ENABLE_VALIDATION_LAYER, "1"),
            (ENV_ENABLE_HANDLE_LIFETIME, "0"),
        ]);
        let config = LoaderConfig::load(&e).unwrap();
        assert!(config.validation.enabled);
        assert!(!config.validation.handle_lifetime);
        assert!(config.validation.leak_checker);

        assert!(LoaderConfig::from_toml_str("[validation]\nthreading = true").is_err());
    }

    #[test]
    fn unknown_keys_fail() {
        let err = LoaderConfig::from_toml_str("bogus = 1").unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let e = env(&[(ENV_CONFIG_FILE, "/definitely/not/here.toml")]);
        assert!(matches!(
            LoaderConfig::load(&e),
            Err(LoaderError::Io { .. })
        ));
    }
}
