//! Simulation backend.
//!
//! Serves register reads from an in-memory object dictionary so the service
//! can run without a field bus.

mod backend;

pub use backend::SimulationBackend;

use cobridge_common::xchg::RegisterBackend;

/// Factory function to create a simulation backend instance.
pub fn create_backend() -> Box<dyn RegisterBackend> {
    Box::new(SimulationBackend::new())
}
