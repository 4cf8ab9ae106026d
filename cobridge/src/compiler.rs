//! Request compiler.
//!
//! Flattens a tree-shaped JSON description of register reads into a
//! [`RequestBatch`]. A description node is either:
//!
//! - an array: every element is compiled in order with the same inherited
//!   state, so siblings never see each other's fields;
//! - an object: the recognized fields `itf`, `id`, `reg`, `subreg`, `type`
//!   and `tpdo` overwrite the inherited request; a node with `items` is a
//!   branch handing its state down, a node without is a leaf that emits one
//!   request once all mandatory fields are known.
//!
//! ```rust
//! use cobridge::compiler::compile;
//! use serde_json::json;
//!
//! let batch = compile(&json!({
//!     "itf": 0, "id": 4, "type": "u16",
//!     "items": [{ "reg": "0x6041", "subreg": 0 }, { "reg": 24676, "subreg": 0 }]
//! })).unwrap();
//! assert_eq!(batch.len(), 2);
//! assert_eq!(batch[0].register, 0x6041);
//! ```

use bitflags::bitflags;
use cobridge_common::xchg::{RegisterRequest, RequestBatch, ValueKind};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while compiling a description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Malformed, incomplete or wrongly typed description.
    #[error("invalid description: {0}")]
    Invalid(String),

    /// The request batch could not be allocated.
    #[error("out of memory while building the request batch")]
    ResourceExhausted,
}

bitflags! {
    /// Fields set on the request so far, by a node or one of its ancestors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Fields: u8 {
        /// `itf` seen.
        const ITF    = 0x01;
        /// `id` seen.
        const ID     = 0x02;
        /// `reg` seen.
        const REG    = 0x04;
        /// `subreg` seen.
        const SUBREG = 0x08;
        /// `type` seen.
        const TYPE   = 0x10;
        /// `tpdo` seen.
        const TPDO   = 0x20;
    }
}

impl Fields {
    /// Fields a leaf must have before it may emit a request.
    pub const REQUIRED: Self = Self::from_bits_truncate(
        Self::ITF.bits() | Self::ID.bits() | Self::REG.bits() | Self::SUBREG.bits() | Self::TYPE.bits(),
    );
}

/// Request under construction plus the fields already assigned.
#[derive(Debug, Clone, Copy, Default)]
struct Inherited {
    request: RegisterRequest,
    fields: Fields,
}

/// Compile a description into a non-empty request batch.
///
/// Requests appear in depth-first pre-order, array elements in document
/// order. Compilation stops at the first invalid node.
///
/// # Errors
/// - `CompileError::Invalid` for a malformed node, an incomplete leaf, or a
///   description producing no request at all
/// - `CompileError::ResourceExhausted` if the batch cannot grow
pub fn compile(description: &Value) -> Result<RequestBatch, CompileError> {
    let mut requests: Vec<RegisterRequest> = Vec::new();
    // Work stack instead of recursion: nesting depth is caller controlled.
    let mut pending: Vec<(&Value, Inherited)> = vec![(description, Inherited::default())];

    while let Some((node, inherited)) = pending.pop() {
        match node {
            Value::Array(elements) => {
                pending.extend(elements.iter().rev().map(|element| (element, inherited)));
            }
            Value::Object(map) => {
                let state = apply_fields(map, inherited)?;
                if let Some(items) = map.get("items") {
                    pending.push((items, state));
                } else if state.fields.contains(Fields::REQUIRED) {
                    requests
                        .try_reserve(1)
                        .map_err(|_| CompileError::ResourceExhausted)?;
                    requests.push(state.request);
                } else {
                    let missing = Fields::REQUIRED.difference(state.fields);
                    return Err(CompileError::Invalid(format!(
                        "incomplete request, missing {}",
                        field_names(missing)
                    )));
                }
            }
            other => {
                return Err(CompileError::Invalid(format!(
                    "expected an object or an array, got {}",
                    json_type(other)
                )));
            }
        }
    }

    RequestBatch::new(requests)
        .ok_or_else(|| CompileError::Invalid("description yields no request".to_string()))
}

/// Overwrite the inherited request with the fields present on `map`.
fn apply_fields(map: &Map<String, Value>, mut state: Inherited) -> Result<Inherited, CompileError> {
    if let Some(value) = map.get("itf") {
        state.request.interface_id = parse_u8("itf", value)?;
        state.fields |= Fields::ITF;
    }
    if let Some(value) = map.get("id") {
        state.request.slave_id = parse_u8("id", value)?;
        state.fields |= Fields::ID;
    }
    if let Some(value) = map.get("reg") {
        state.request.register = parse_u16("reg", value)?;
        state.fields |= Fields::REG;
    }
    if let Some(value) = map.get("subreg") {
        state.request.sub_register = parse_u8("subreg", value)?;
        state.fields |= Fields::SUBREG;
    }
    if let Some(value) = map.get("type") {
        state.request.value_kind = parse_kind(value)?;
        state.fields |= Fields::TYPE;
    }
    if let Some(value) = map.get("tpdo") {
        let tpdo = parse_bool("tpdo", value)?;
        // tpdo is stored in the interface byte: it replaces any `itf` of the
        // same node and leaves the ITF presence bit untouched.
        state.request.interface_id = u8::from(tpdo);
        state.request.is_transmit_pdo = tpdo;
        state.fields |= Fields::TPDO;
    }
    Ok(state)
}

/// Integer given as a JSON integer or as a hexadecimal string.
fn parse_xint(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => {
            let digits = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            i64::from_str_radix(digits, 16).ok()
        }
        _ => None,
    }
}

fn parse_u8(field: &str, value: &Value) -> Result<u8, CompileError> {
    parse_xint(value)
        .and_then(|x| u8::try_from(x).ok())
        .ok_or_else(|| invalid_field(field, value, "an integer in 0..=255"))
}

fn parse_u16(field: &str, value: &Value) -> Result<u16, CompileError> {
    parse_xint(value)
        .and_then(|x| u16::try_from(x).ok())
        .ok_or_else(|| invalid_field(field, value, "an integer in 0..=65535"))
}

fn parse_bool(field: &str, value: &Value) -> Result<bool, CompileError> {
    value
        .as_bool()
        .ok_or_else(|| invalid_field(field, value, "a boolean"))
}

/// Value kind as a code 0..=7 (integer or hex string) or a literal name.
fn parse_kind(value: &Value) -> Result<ValueKind, CompileError> {
    let expected = "a kind code 0..=7 or one of u8, i8, u16, i16, u32, i32, u64, i64";
    if let Some(code) = parse_xint(value) {
        return u8::try_from(code)
            .ok()
            .and_then(|code| ValueKind::try_from(code).ok())
            .ok_or_else(|| invalid_field("type", value, expected));
    }
    value
        .as_str()
        .and_then(|name| name.parse::<ValueKind>().ok())
        .ok_or_else(|| invalid_field("type", value, expected))
}

fn invalid_field(field: &str, value: &Value, expected: &str) -> CompileError {
    CompileError::Invalid(format!("field '{field}' must be {expected}, got {value}"))
}

fn field_names(fields: Fields) -> String {
    const NAMES: [(Fields, &str); 6] = [
        (Fields::ITF, "itf"),
        (Fields::ID, "id"),
        (Fields::REG, "reg"),
        (Fields::SUBREG, "subreg"),
        (Fields::TYPE, "type"),
        (Fields::TPDO, "tpdo"),
    ];
    NAMES
        .iter()
        .filter(|(flag, _)| fields.contains(*flag))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
