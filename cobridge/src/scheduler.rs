//! Poll scheduler.
//!
//! One timer task per subscription. Each period the task leases the
//! subscription's buffers, issues the stored batch to the backend, renders
//! the refreshed result buffer and publishes it on the subscription channel.
//!
//! ```text
//! Idle ──arm──► Armed ──period──► Firing ──► Armed ──► … ──remove──► Cancelled
//! ```
//!
//! A failed exchange skips publication for that period only; the timer
//! keeps running until the subscription is removed.

use crate::registry::{SubscriptionHandle, SubscriptionRegistry};
use cobridge_common::xchg::{BackendError, RegisterBackend, RegisterRequest, ValueSlot};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Values published to this many listeners.
    Published(usize),
    /// Values rendered but nobody was listening.
    NoListeners,
    /// Publication skipped for this period.
    Skipped(String),
    /// The subscription is gone; the timer must stop.
    Cancelled,
}

/// Drives the timers of all subscriptions against one backend.
#[derive(Clone)]
pub struct PollScheduler {
    backend: Arc<dyn RegisterBackend>,
    registry: Arc<SubscriptionRegistry>,
}

impl PollScheduler {
    /// Create a scheduler for subscriptions of `registry`.
    pub fn new(backend: Arc<dyn RegisterBackend>, registry: Arc<SubscriptionRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Start the timer of a freshly created subscription.
    ///
    /// The first tick fires immediately, then every period. Must be called
    /// from within a Tokio runtime.
    ///
    /// # Errors
    /// Fails if no runtime is available to host the timer task.
    pub fn arm(&self, handle: &SubscriptionHandle) -> Result<(), TryCurrentError> {
        let runtime = Handle::try_current()?;
        let timer = runtime.spawn(self.clone().run(
            handle.name().to_string(),
            handle.id(),
            handle.period(),
            handle.token().clone(),
        ));
        if !self.registry.attach_timer(handle, timer) {
            debug!("Subscription '{}' removed before its timer was attached", handle.name());
        }
        Ok(())
    }

    async fn run(
        self,
        name: String,
        id: u64,
        period: Duration,
        token: CancellationToken,
    ) {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Timer of '{}' armed ({}ms)", name, period.as_millis());

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = timer.tick() => {}
            }

            match self.tick(&name, id).await {
                TickOutcome::Cancelled => break,
                TickOutcome::Published(listeners) => {
                    debug!("Tick of '{}' published to {} listeners", name, listeners);
                }
                TickOutcome::NoListeners => debug!("Tick of '{}' had no listeners", name),
                TickOutcome::Skipped(reason) => warn!("Tick of '{}' skipped: {}", name, reason),
            }
        }

        debug!("Timer of '{}' cancelled", name);
    }

    /// Run one tick of subscription `id`.
    pub async fn tick(&self, name: &str, id: u64) -> TickOutcome {
        let Some(lease) = self.registry.lease(name, id) else {
            return TickOutcome::Cancelled;
        };

        let mut buffers = lease.buffers.lock().await;
        let pair = &mut *buffers;
        if let Err(e) = self.exchange(&pair.requests, &mut pair.results).await {
            return TickOutcome::Skipped(e.to_string());
        }

        let rendered = match pair.render() {
            Ok(rendered) => rendered,
            Err(e) => return TickOutcome::Skipped(e.to_string()),
        };
        drop(buffers);

        match lease.events.send(Arc::from(rendered.into_string())) {
            Ok(listeners) => TickOutcome::Published(listeners),
            Err(_) => TickOutcome::NoListeners,
        }
    }

    async fn exchange(
        &self,
        requests: &[RegisterRequest],
        values: &mut [ValueSlot],
    ) -> Result<(), BackendError> {
        if requests.len() != values.len() {
            return Err(BackendError::ShapeMismatch {
                expected: requests.len(),
                actual: values.len(),
            });
        }
        self.backend.exchange(requests, values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulation::SimulationBackend;
    use crate::batch::pair;
    use crate::compiler::compile;
    use cobridge_common::config::{BackendConfig, RegisterPreset};
    use cobridge_common::xchg::ValueKind;
    use serde_json::json;
    use tokio::sync::broadcast::error::RecvError;

    fn setup() -> (Arc<SimulationBackend>, Arc<SubscriptionRegistry>, PollScheduler) {
        let mut backend = SimulationBackend::new();
        backend
            .init(&BackendConfig {
                registers: vec![RegisterPreset {
                    itf: 0,
                    id: 1,
                    reg: 0x6041,
                    subreg: 0,
                    kind: ValueKind::U16,
                    value: 100,
                    counter: true,
                }],
                ..Default::default()
            })
            .unwrap();
        let backend = Arc::new(backend);
        let registry = Arc::new(SubscriptionRegistry::new(8));
        let scheduler = PollScheduler::new(backend.clone(), Arc::clone(&registry));
        (backend, registry, scheduler)
    }

    fn status_word(registry: &SubscriptionRegistry, period_ms: u64) -> SubscriptionHandle {
        let requests = compile(&json!({"itf":0,"id":1,"reg":"0x6041","subreg":0,"type":"u16"})).unwrap();
        registry
            .create("status", pair(requests).unwrap(), Duration::from_millis(period_ms))
            .unwrap()
    }

    #[tokio::test]
    async fn tick_reuses_buffers_and_publishes() {
        let (_backend, registry, scheduler) = setup();
        let mut handle = status_word(&registry, 100);

        assert_eq!(scheduler.tick("status", handle.id()).await, TickOutcome::Published(1));
        assert_eq!(scheduler.tick("status", handle.id()).await, TickOutcome::Published(1));
        assert_eq!(handle.receiver().recv().await.unwrap().as_ref(), "[100]");
        assert_eq!(handle.receiver().recv().await.unwrap().as_ref(), "[101]");
    }

    #[tokio::test]
    async fn backend_failure_skips_publication() {
        let (backend, registry, scheduler) = setup();
        let mut handle = status_word(&registry, 100);

        backend.fail_next(1);
        assert!(matches!(
            scheduler.tick("status", handle.id()).await,
            TickOutcome::Skipped(_)
        ));
        assert!(handle.receiver().try_recv().is_err());

        // The subscription survives and the next tick publishes.
        assert_eq!(scheduler.tick("status", handle.id()).await, TickOutcome::Published(1));
        assert!(registry.contains("status"));
    }

    #[tokio::test]
    async fn tick_without_listeners_is_not_an_error() {
        let (_backend, registry, scheduler) = setup();
        let handle = status_word(&registry, 100);
        let id = handle.id();
        drop(handle.into_receiver());
        assert_eq!(scheduler.tick("status", id).await, TickOutcome::NoListeners);
    }

    #[tokio::test]
    async fn tick_after_removal_is_cancelled() {
        let (_backend, registry, scheduler) = setup();
        let handle = status_word(&registry, 100);
        registry.remove("status").unwrap();
        assert_eq!(scheduler.tick("status", handle.id()).await, TickOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_every_period_until_removed() {
        let (backend, registry, scheduler) = setup();
        let mut handle = status_word(&registry, 50);
        scheduler.arm(&handle).unwrap();
        assert!(registry.has_timer("status"));

        for expected in ["[100]", "[101]", "[102]"] {
            assert_eq!(handle.receiver().recv().await.unwrap().as_ref(), expected);
        }

        registry.remove("status").unwrap();
        let before = backend.diagnostics().unwrap().exchange_count;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(backend.diagnostics().unwrap().exchange_count, before);

        // Drain until the channel reports it was torn down.
        loop {
            match handle.receiver().recv().await {
                Ok(_) => continue,
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_rearm() {
        let (backend, registry, scheduler) = setup();
        let mut handle = status_word(&registry, 20);
        backend.fail_next(3);
        scheduler.arm(&handle).unwrap();

        // Three skipped periods, then values flow again.
        assert_eq!(handle.receiver().recv().await.unwrap().as_ref(), "[100]");
        assert_eq!(backend.diagnostics().unwrap().failure_count, 3);
    }

    #[test]
    fn arm_outside_runtime_fails() {
        let (_backend, registry, scheduler) = setup();
        let handle = status_word(&registry, 10);
        assert!(scheduler.arm(&handle).is_err());
        assert!(!registry.has_timer("status"));
    }
}
