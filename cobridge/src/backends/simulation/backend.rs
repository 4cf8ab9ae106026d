//! Simulation backend implementation.
//!
//! Registers are keyed by `(itf, id, reg, subreg)`. Each one stores the raw
//! slot of its preset kind; a read copies that slot, so a request with a
//! different value kind reinterprets the same bytes the way a real node
//! would. Counter registers advance by one after every successful exchange
//! and wrap within the range of their kind.

use cobridge_common::config::BackendConfig;
use cobridge_common::xchg::{
    BackendDiagnostics, BackendError, ExchangeFuture, RegisterBackend, RegisterRequest, ValueKind,
    ValueSlot,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

type RegisterKey = (u8, u8, u16, u8);

fn key_of(req: &RegisterRequest) -> RegisterKey {
    (req.interface_id, req.slave_id, req.register, req.sub_register)
}

#[derive(Debug, Clone, Copy)]
struct SimRegister {
    kind: ValueKind,
    value: i128,
    counter: bool,
}

impl SimRegister {
    fn slot(&self) -> ValueSlot {
        // `value` is kept within `kind.range()` by `advance`.
        ValueSlot::from_i128(self.kind, self.value).unwrap_or_default()
    }

    fn advance(&mut self) {
        let (min, max) = self.kind.range();
        self.value = if self.value >= max { min } else { self.value + 1 };
    }
}

#[derive(Debug, Default)]
struct SimState {
    registers: HashMap<RegisterKey, SimRegister>,
    pending_failures: u32,
    diagnostics: BackendDiagnostics,
}

/// Simulation backend implementing the `RegisterBackend` trait.
pub struct SimulationBackend {
    /// Backend name
    name: &'static str,
    /// Backend version
    version: &'static str,
    /// Artificial exchange latency
    latency: Duration,
    /// Reject reads of registers that were never preset
    strict: bool,
    /// Object dictionary and counters
    state: Mutex<SimState>,
}

impl SimulationBackend {
    /// Create a new simulation backend with an empty object dictionary.
    pub fn new() -> Self {
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            latency: Duration::ZERO,
            strict: false,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Set (or create) a register.
    pub fn set_register(
        &self,
        itf: u8,
        id: u8,
        reg: u16,
        subreg: u8,
        kind: ValueKind,
        value: i128,
    ) -> Result<(), BackendError> {
        let (min, max) = kind.range();
        if value < min || value > max {
            return Err(BackendError::ConfigError(format!(
                "value {value} out of range for {kind}"
            )));
        }
        let mut state = self.state.lock();
        let counter = state
            .registers
            .get(&(itf, id, reg, subreg))
            .is_some_and(|r| r.counter);
        state.registers.insert(
            (itf, id, reg, subreg),
            SimRegister {
                kind,
                value,
                counter,
            },
        );
        Ok(())
    }

    /// Make the next `count` exchanges fail with a communication error.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().pending_failures = count;
    }

    /// Number of registers in the object dictionary.
    pub fn register_count(&self) -> usize {
        self.state.lock().registers.len()
    }

    fn exchange_now(
        &self,
        requests: &[RegisterRequest],
        values: &mut [ValueSlot],
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.diagnostics.exchange_count += 1;

        if requests.len() != values.len() {
            state.diagnostics.failure_count += 1;
            return Err(BackendError::ShapeMismatch {
                expected: requests.len(),
                actual: values.len(),
            });
        }

        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            state.diagnostics.failure_count += 1;
            return Err(BackendError::CommunicationError(
                "injected bus failure".to_string(),
            ));
        }

        if self.strict {
            if let Some(missing) = requests
                .iter()
                .find(|req| !state.registers.contains_key(&key_of(req)))
            {
                state.diagnostics.failure_count += 1;
                return Err(BackendError::unknown_register(missing));
            }
        }

        for (req, slot) in requests.iter().zip(values.iter_mut()) {
            *slot = state
                .registers
                .get(&key_of(req))
                .map(SimRegister::slot)
                .unwrap_or_default();
        }
        state.diagnostics.read_count += requests.len() as u64;

        for register in state.registers.values_mut().filter(|r| r.counter) {
            register.advance();
        }
        Ok(())
    }
}

impl Default for SimulationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBackend for SimulationBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &BackendConfig) -> Result<(), BackendError> {
        info!(
            "Initializing simulation backend with {} registers (strict={}, latency={}ms)",
            config.registers.len(),
            config.strict,
            config.latency_ms
        );

        let mut registers = HashMap::with_capacity(config.registers.len());
        for preset in &config.registers {
            preset
                .slot()
                .map_err(|e| BackendError::InitFailed(e.to_string()))?;
            let key = (preset.itf, preset.id, preset.reg, preset.subreg);
            let register = SimRegister {
                kind: preset.kind,
                value: i128::from(preset.value),
                counter: preset.counter,
            };
            if registers.insert(key, register).is_some() {
                warn!(
                    "Register {}/{}/{:#06x}/{} preset twice, keeping the last value",
                    preset.itf, preset.id, preset.reg, preset.subreg
                );
            }
        }

        self.strict = config.strict;
        self.latency = Duration::from_millis(config.latency_ms);
        self.state.get_mut().registers = registers;
        Ok(())
    }

    fn exchange<'a>(
        &'a self,
        requests: &'a [RegisterRequest],
        values: &'a mut [ValueSlot],
    ) -> ExchangeFuture<'a> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            debug!("Simulation exchange of {} requests", requests.len());
            self.exchange_now(requests, values)
        })
    }

    fn shutdown(&self) -> Result<(), BackendError> {
        let state = self.state.lock();
        info!(
            "Shutting down simulation backend after {} exchanges ({} failed)",
            state.diagnostics.exchange_count, state.diagnostics.failure_count
        );
        Ok(())
    }

    fn diagnostics(&self) -> Option<BackendDiagnostics> {
        Some(self.state.lock().diagnostics.clone())
    }
}
