//! Prelude module for common re-exports.
//!
//! # Usage
//!
//! ```rust
//! use cobridge_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    BackendConfig, ConfigError, ConfigLoader, EventConfig, LogLevel, RegisterPreset,
    ServiceConfig, SharedConfig,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{API_NAME, DEFAULT_CHANNEL_CAPACITY, XCHG_GET_VERB, XCHG_SERVICE_NAME};

// ─── Register Exchange ──────────────────────────────────────────────
pub use crate::xchg::{
    BackendDiagnostics, BackendError, BackendFactory, ExchangeFuture, RegisterBackend,
    RegisterRequest, RequestBatch, ResultBatch, ValueError, ValueKind, ValueSlot,
};
