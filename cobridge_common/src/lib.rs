//! Cobridge Common Library
//!
//! Shared building blocks for the cobridge workspace: the typed value codec
//! used on the CANopen register exchange, the backend contract, and
//! configuration loading.
//!
//! # Module Structure
//!
//! - [`xchg`] - Register requests, value slots and the backend trait
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Service-wide constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use cobridge_common::prelude::*;
//!
//! let kind: ValueKind = "u16".parse().unwrap();
//! let mut slot = ValueSlot::default();
//! slot.set_u16(1234);
//! assert_eq!(slot.to_json(kind), serde_json::json!(1234));
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod xchg;
