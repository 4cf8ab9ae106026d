//! CANopen register exchange.
//!
//! - [`types`] - Typed value codec, register requests and batches
//! - [`backend`] - Backend trait performing the actual bus reads

pub mod backend;
pub mod types;

pub use backend::{BackendDiagnostics, BackendError, BackendFactory, ExchangeFuture, RegisterBackend};
pub use types::{RegisterRequest, RequestBatch, ResultBatch, ValueError, ValueKind, ValueSlot};
