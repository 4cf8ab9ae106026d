//! Register backend implementations.
//!
//! - [`simulation`] - In-memory object dictionary for development and testing
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `backends/`
//! 2. Implement the `RegisterBackend` trait from `cobridge_common::xchg`
//! 3. Register its factory in [`register_all_backends`]

pub mod simulation;

use crate::backend_registry::BackendRegistry;
use cobridge_common::xchg::BackendError;

/// Register all built-in backends.
///
/// # Errors
/// Fails if a built-in name is already taken in `registry`.
pub fn register_all_backends(registry: &mut BackendRegistry) -> Result<(), BackendError> {
    registry.register("simulation", simulation::create_backend)
}
