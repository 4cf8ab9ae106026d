//! # cobridge
//!
//! CANopen register polling bridge with a pluggable backend architecture.
//!
//! Turns declarative, tree-shaped descriptions of register reads into flat
//! typed request batches, issues them against a register exchange backend
//! and renders the results as JSON arrays. Named subscriptions re-issue a
//! compiled batch on a fixed period and publish each result on their own
//! broadcast channel.
//!
//! # Module Structure
//!
//! - [`compiler`] - Description tree to request batch
//! - [`batch`] - Result buffer pairing and JSON rendering
//! - [`registry`] - Name-keyed subscription table
//! - [`scheduler`] - Per-subscription poll timers
//! - [`service`] - Verb service (`get`, `add`, `rem`, `info`)
//! - [`console`] - Newline-delimited JSON front end
//! - [`backend_registry`] - Backend factory registration
//! - [`backends`] - Backend implementations
//! - [`error`] - Service error kinds and status codes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         cobridge                                 │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │   Console   │───►│   Service    │───►│ SubscriptionRegistry│  │
//! │  │  (NDJSON)   │    │ get/add/rem  │    │  + PollScheduler    │  │
//! │  └─────────────┘    └──────┬───────┘    └──────────┬──────────┘  │
//! │                            │ compile + pair        │ tick        │
//! │                            ▼                       ▼             │
//! │                   ┌─────────────────────────────────────┐        │
//! │                   │  RegisterBackend (trait object)     │        │
//! │                   └─────────────────────────────────────┘        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod backend_registry;
pub mod backends;
pub mod batch;
pub mod compiler;
pub mod console;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod service;

// Re-export key types for convenience
pub use crate::backend_registry::BackendRegistry;
pub use crate::error::ServiceError;
pub use crate::service::{Response, Service};
