//! Register backend trait and error types.
//!
//! This module defines:
//! - `RegisterBackend` trait - Interface for pluggable register exchange backends
//! - `BackendError` enum - Error types for exchange operations
//! - `BackendFactory` type alias - Factory function type
//! - `BackendDiagnostics` struct - Optional backend diagnostics

use crate::config::BackendConfig;
use crate::xchg::types::{RegisterRequest, ValueSlot};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Error types for backend operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Backend initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Field-bus communication error
    #[error("Communication error: {0}")]
    CommunicationError(String),

    /// Backend not found
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// A backend of that name is already registered
    #[error("Backend already registered: {0}")]
    DuplicateBackend(String),

    /// Register not present on the addressed node
    #[error("Unknown register {itf}/{id}/{reg:#06x}/{subreg}")]
    UnknownRegister {
        /// Interface number
        itf: u8,
        /// Slave id
        id: u8,
        /// Register index
        reg: u16,
        /// Sub-index
        subreg: u8,
    },

    /// Reply does not match the request batch
    #[error("Reply shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch {
        /// Number of requests issued
        expected: usize,
        /// Number of values available
        actual: usize,
    },
}

impl BackendError {
    /// Error for a request addressing an unknown register.
    pub fn unknown_register(req: &RegisterRequest) -> Self {
        BackendError::UnknownRegister {
            itf: req.interface_id,
            id: req.slave_id,
            reg: req.register,
            subreg: req.sub_register,
        }
    }
}

/// Future returned by [`RegisterBackend::exchange`].
pub type ExchangeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + 'a>>;

/// Factory function type for creating backend instances.
pub type BackendFactory = fn() -> Box<dyn RegisterBackend>;

/// Optional backend diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendDiagnostics {
    /// Number of exchanges issued
    pub exchange_count: u64,
    /// Number of failed exchanges
    pub failure_count: u64,
    /// Number of register reads performed
    pub read_count: u64,
}

/// Trait defining the interface for register exchange backends.
///
/// The service issues compiled request batches through this trait; the
/// backend performs the bus reads and writes one value per request into the
/// positionally matching slot.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before the first exchange
/// 2. `exchange()` - Called for every one-shot read and every poll tick
/// 3. `shutdown()` - Called when the service stops
pub trait RegisterBackend: Send + Sync {
    /// Returns the backend's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the backend's semantic version.
    fn version(&self) -> &'static str;

    /// Initialize the backend with its configuration.
    ///
    /// # Errors
    /// Return `BackendError::InitFailed` if initialization cannot complete.
    fn init(&mut self, config: &BackendConfig) -> Result<(), BackendError>;

    /// Read every register of `requests` into `values`.
    ///
    /// `values` has exactly one slot per request; slot `i` receives the value
    /// of request `i`, encoded with that request's value kind. Slots are
    /// overwritten in place.
    fn exchange<'a>(
        &'a self,
        requests: &'a [RegisterRequest],
        values: &'a mut [ValueSlot],
    ) -> ExchangeFuture<'a>;

    /// Graceful shutdown of the backend.
    fn shutdown(&self) -> Result<(), BackendError>;

    /// Get backend-specific diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<BackendDiagnostics> {
        None
    }
}
