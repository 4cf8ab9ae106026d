//! Batch pairing and JSON rendering.
//!
//! A compiled [`RequestBatch`] travels together with a [`ResultBatch`] of the
//! same length; slot `i` holds the value of request `i`. Rendering turns a
//! filled pair into a compact JSON array, decoding each slot with the value
//! kind of its request.

use cobridge_common::consts::{RENDER_BYTES_PER_VALUE, RENDER_HEADROOM};
use cobridge_common::xchg::{RegisterRequest, RequestBatch, ResultBatch, ValueSlot};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised while pairing or rendering batches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Requests and values are not positionally paired.
    #[error("batch length mismatch: {requests} requests, {values} values")]
    LengthMismatch {
        /// Number of requests
        requests: usize,
        /// Number of value slots
        values: usize,
    },

    /// Buffer allocation failed.
    #[error("out of memory while allocating batch buffers")]
    ResourceExhausted,

    /// Formatting a value failed.
    #[error("failed to format value {index}")]
    Format {
        /// Index of the value
        index: usize,
    },
}

/// A request batch and its result buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPair {
    /// Compiled requests, read-only once paired.
    pub requests: RequestBatch,
    /// One slot per request, overwritten by each exchange.
    pub results: ResultBatch,
}

impl BatchPair {
    /// Render the current results.
    pub fn render(&self) -> Result<JsonArray, BatchError> {
        render(&self.requests, &self.results)
    }
}

/// Pair `requests` with a zero-filled result buffer of the same length.
pub fn pair(requests: RequestBatch) -> Result<BatchPair, BatchError> {
    let results = ResultBatch::zeroed(requests.len()).map_err(|_| BatchError::ResourceExhausted)?;
    Ok(BatchPair { requests, results })
}

/// Compact JSON array text produced by [`render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonArray {
    text: String,
    count: usize,
}

impl JsonArray {
    /// JSON text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Unwrap into the JSON text.
    pub fn into_string(self) -> String {
        self.text
    }

    /// Parse into a `serde_json::Value`.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.text)
    }
}

impl fmt::Display for JsonArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Render `values` as a JSON array of numbers in request order.
///
/// The output starts from a small per-value estimate and grows by a quarter
/// plus headroom whenever less than one full token of space remains, so a
/// value is always formatted into a buffer large enough to hold it.
///
/// # Errors
/// - `BatchError::LengthMismatch` if the slices are not the same length
///   (a pairing defect, not a user error)
/// - `BatchError::ResourceExhausted` if the output cannot grow
pub fn render(requests: &[RegisterRequest], values: &[ValueSlot]) -> Result<JsonArray, BatchError> {
    if requests.len() != values.len() {
        return Err(BatchError::LengthMismatch {
            requests: requests.len(),
            values: values.len(),
        });
    }

    let mut text = String::new();
    let estimate = requests
        .len()
        .saturating_mul(RENDER_BYTES_PER_VALUE)
        .saturating_add(3);
    text.try_reserve(estimate)
        .map_err(|_| BatchError::ResourceExhausted)?;

    text.push('[');
    for (index, (request, slot)) in requests.iter().zip(values).enumerate() {
        if text.capacity() - text.len() < RENDER_HEADROOM {
            let grow = RENDER_HEADROOM + text.capacity() / 4;
            text.try_reserve(grow)
                .map_err(|_| BatchError::ResourceExhausted)?;
        }
        if index > 0 {
            text.push(',');
        }
        slot.write_decimal(request.value_kind, &mut text)
            .map_err(|_| BatchError::Format { index })?;
    }
    text.push(']');

    Ok(JsonArray {
        text,
        count: requests.len(),
    })
}
