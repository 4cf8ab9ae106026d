//! Subscription registry.
//!
//! Name-keyed table of live polling subscriptions, guarded by one mutex.
//! Every subscription owns its batch pair, its broadcast channel and the
//! cancellation token of its poll timer. Removing the table entry is the
//! only way these are released: dropping a `Subscription` cancels its
//! timer, and the channel closes once the last in-flight tick lets go of it.
//!
//! The table lock is never held across an await. A tick takes a
//! [`TickLease`] under the lock; once `remove` has returned no new lease can
//! be taken, while a tick that already holds one may finish with it.

use crate::batch::BatchPair;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Payload published on a subscription channel: a compact JSON array.
pub type EventPayload = Arc<str>;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A subscription with this name is alive.
    #[error("subscription name already in use: {0}")]
    DuplicateName(String),

    /// No subscription with this name.
    #[error("no such subscription: {0}")]
    NotFound(String),
}

/// A live polling subscription.
struct Subscription {
    /// Distinguishes successive subscriptions reusing a name.
    id: u64,
    period: Duration,
    requests: usize,
    buffers: Arc<AsyncMutex<BatchPair>>,
    events: broadcast::Sender<EventPayload>,
    token: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// What the creator of a subscription gets back.
#[derive(Debug)]
pub struct SubscriptionHandle {
    name: String,
    id: u64,
    period: Duration,
    token: CancellationToken,
    receiver: broadcast::Receiver<EventPayload>,
}

impl SubscriptionHandle {
    /// Subscription name, also the name of its channel.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry-unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Poll period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Token cancelled when the subscription is removed.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Listener attached at creation time.
    pub fn receiver(&mut self) -> &mut broadcast::Receiver<EventPayload> {
        &mut self.receiver
    }

    /// Take the listener, dropping the rest of the handle.
    pub fn into_receiver(self) -> broadcast::Receiver<EventPayload> {
        self.receiver
    }
}

/// Access to a subscription's buffers and channel for one tick.
pub struct TickLease {
    /// Batch pair, locked for the duration of the tick.
    pub buffers: Arc<AsyncMutex<BatchPair>>,
    /// Publication channel.
    pub events: broadcast::Sender<EventPayload>,
}

/// Summary of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Name
    pub name: String,
    /// Poll period
    pub period: Duration,
    /// Number of registers read per tick
    pub requests: usize,
    /// Current number of listeners
    pub listeners: usize,
}

#[derive(Default)]
struct Table {
    entries: HashMap<String, Subscription>,
    next_id: u64,
}

/// Process-wide table of subscriptions.
pub struct SubscriptionRegistry {
    table: Mutex<Table>,
    channel_capacity: usize,
}

impl SubscriptionRegistry {
    /// Create an empty registry whose channels buffer `channel_capacity` payloads.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Register a new subscription owning `buffers`.
    ///
    /// # Errors
    /// `RegistryError::DuplicateName` if `name` is already in use; the
    /// existing subscription is left untouched.
    pub fn create(
        &self,
        name: &str,
        buffers: BatchPair,
        period: Duration,
    ) -> Result<SubscriptionHandle, RegistryError> {
        let mut table = self.table.lock();
        if table.entries.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        table.next_id += 1;
        let id = table.next_id;
        let requests = buffers.requests.len();
        let (events, receiver) = broadcast::channel(self.channel_capacity);
        let token = CancellationToken::new();
        table.entries.insert(
            name.to_string(),
            Subscription {
                id,
                period,
                requests,
                buffers: Arc::new(AsyncMutex::new(buffers)),
                events,
                token: token.clone(),
                timer: None,
            },
        );
        info!(
            "Subscription '{}' created (id={}, {} registers, period={}ms)",
            name,
            id,
            requests,
            period.as_millis()
        );

        Ok(SubscriptionHandle {
            name: name.to_string(),
            id,
            period,
            token,
            receiver,
        })
    }

    /// Store the timer task of a created subscription.
    ///
    /// Returns false when the subscription was removed in the meantime; its
    /// token is then already cancelled and the task winds down by itself.
    pub fn attach_timer(&self, handle: &SubscriptionHandle, timer: JoinHandle<()>) -> bool {
        let mut table = self.table.lock();
        match table.entries.get_mut(&handle.name) {
            Some(entry) if entry.id == handle.id => {
                entry.timer = Some(timer);
                true
            }
            _ => false,
        }
    }

    /// Take the buffers and channel of subscription `id` for one tick.
    ///
    /// `None` once the subscription has been removed.
    pub fn lease(&self, name: &str, id: u64) -> Option<TickLease> {
        let table = self.table.lock();
        table
            .entries
            .get(name)
            .filter(|entry| entry.id == id)
            .map(|entry| TickLease {
                buffers: Arc::clone(&entry.buffers),
                events: entry.events.clone(),
            })
    }

    /// Attach another listener to a live subscription.
    pub fn subscribe(&self, name: &str) -> Result<broadcast::Receiver<EventPayload>, RegistryError> {
        let table = self.table.lock();
        table
            .entries
            .get(name)
            .map(|entry| entry.events.subscribe())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Remove a subscription, cancelling its timer.
    ///
    /// No tick starts after this returns. A tick already running keeps its
    /// lease until it completes; the buffers and channel are released then.
    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let removed = {
            let mut table = self.table.lock();
            let entry = table
                .entries
                .remove(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            entry.token.cancel();
            entry
        };
        info!("Subscription '{}' removed (id={})", name, removed.id);
        drop(removed);
        Ok(())
    }

    /// Remove the subscription `handle` was created for.
    ///
    /// Returns `false`, leaving the table untouched, when the name now
    /// belongs to a later subscription or is gone.
    pub fn remove_handle(&self, handle: &SubscriptionHandle) -> bool {
        let removed = {
            let mut table = self.table.lock();
            match table.entries.get(&handle.name) {
                Some(entry) if entry.id == handle.id => table.entries.remove(&handle.name),
                _ => None,
            }
        };
        match removed {
            Some(entry) => {
                entry.token.cancel();
                debug!("Subscription '{}' withdrawn (id={})", handle.name, entry.id);
                true
            }
            None => false,
        }
    }

    /// Remove every subscription. Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        let drained: Vec<(String, Subscription)> = {
            let mut table = self.table.lock();
            let drained: Vec<_> = table.entries.drain().collect();
            for (_, entry) in &drained {
                entry.token.cancel();
            }
            drained
        };
        for (name, entry) in &drained {
            debug!("Subscription '{}' released (id={})", name, entry.id);
        }
        drained.len()
    }

    /// True if a subscription named `name` is alive.
    pub fn contains(&self, name: &str) -> bool {
        self.table.lock().entries.contains_key(name)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// True when no subscription is alive.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summaries of all live subscriptions, sorted by name.
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let table = self.table.lock();
        let mut infos: Vec<SubscriptionInfo> = table
            .entries
            .iter()
            .map(|(name, entry)| SubscriptionInfo {
                name: name.clone(),
                period: entry.period,
                requests: entry.requests,
                listeners: entry.events.receiver_count(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// True if the timer of `name` has been attached.
    pub fn has_timer(&self, name: &str) -> bool {
        self.table
            .lock()
            .entries
            .get(name)
            .is_some_and(|entry| entry.timer.is_some())
    }
}
