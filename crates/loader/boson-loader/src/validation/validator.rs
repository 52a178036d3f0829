//! Validation state shared by every validated layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use boson_core::DeviceId;
use boson_driver_api::{ContextHandle, DeviceHandle, Status};
use parking_lot::Mutex;

use crate::config::ValidationConfig;
use crate::handles::DeviceHandleTable;

/// Create and destroy counts seen by the leak checker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// Successful `context_create` calls.
    pub context_create: u64,
    /// Successful `context_destroy` calls.
    pub context_destroy: u64,
}

impl LeakReport {
    /// Contexts created but never destroyed.
    pub fn leaked(&self) -> u64 {
        self.context_create.saturating_sub(self.context_destroy)
    }
}

/// Checks and bookkeeping for the validation layer.
#[derive(Debug)]
pub struct Validator {
    config: ValidationConfig,
    /// Live contexts and the device each was created on.
    contexts: Mutex<HashMap<ContextHandle, DeviceHandle>>,
    created: AtomicU64,
    destroyed: AtomicU64,
}

impl Validator {
    /// Creates a validator running the checks `config` enables.
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            contexts: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
        }
    }

    /// The checks in effect.
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Rejects a device the loader never enumerated.
    ///
    /// # Errors
    ///
    /// [`Status::InvalidNullHandle`].
    pub fn check_device(
        &self,
        devices: &DeviceHandleTable,
        device: DeviceHandle,
    ) -> Result<(), Status> {
        if self.config.parameter_validation && devices.to_identifier(device) == DeviceId::INVALID {
            log::warn!("validation: {device:?} was never enumerated");
            return Err(Status::InvalidNullHandle);
        }
        Ok(())
    }

    /// Rejects a context that is not live.
    ///
    /// # Errors
    ///
    /// [`Status::InvalidNullHandle`] for a destroyed or unknown context.
    pub fn check_context(&self, context: ContextHandle) -> Result<(), Status> {
        if self.config.handle_lifetime && !self.contexts.lock().contains_key(&context) {
            log::warn!("validation: {context:?} is not a live context");
            return Err(Status::InvalidNullHandle);
        }
        Ok(())
    }

    /// Rejects an unforced reset of a device that still has live contexts.
    ///
    /// # Errors
    ///
    /// [`Status::HandleObjectInUse`].
    pub fn check_reset(&self, device: DeviceHandle, force: bool) -> Result<(), Status> {
        if !self.config.handle_lifetime || force {
            return Ok(());
        }
        let live = self.contexts.lock().values().filter(|&&d| d == device).count();
        if live > 0 {
            log::warn!("validation: reset of {device:?} with {live} live context(s)");
            return Err(Status::HandleObjectInUse);
        }
        Ok(())
    }

    /// Records a context the driver created on `device`.
    pub fn context_created(&self, context: ContextHandle, device: DeviceHandle) {
        if self.config.handle_lifetime {
            self.contexts.lock().insert(context, device);
        }
        if self.config.leak_checker {
            self.created.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a context the driver destroyed.
    pub fn context_destroyed(&self, context: ContextHandle) {
        if self.config.handle_lifetime {
            self.contexts.lock().remove(&context);
        }
        if self.config.leak_checker {
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of tracked live contexts.
    pub fn live_contexts(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Current create and destroy counts.
    pub fn leak_report(&self) -> LeakReport {
        LeakReport {
            context_create: self.created.load(Ordering::Relaxed),
            context_destroy: self.destroyed.load(Ordering::Relaxed),
        }
    }

    /// Logs the create/destroy balance.
    pub fn report(&self) {
        if !self.config.leak_checker {
            return;
        }
        let report = self.leak_report();
        log::info!(
            "context_create = {}, context_destroy = {}",
            report.context_create,
            report.context_destroy
        );
        if report.leaked() > 0 {
            log::warn!("{} context(s) leaked", report.leaked());
        }
    }
}
