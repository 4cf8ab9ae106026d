//! Register exchange value types.
//!
//! This module defines the data exchanged with the CANopen register backend:
//! - `ValueKind` - The eight fixed-width integer interpretations
//! - `ValueSlot` - An 8 byte container holding one value of any kind
//! - `RegisterRequest` - One addressable register read
//! - `RequestBatch` / `ResultBatch` - Positionally paired request and value arrays
//!
//! A slot carries no tag: its bytes are interpreted through the `ValueKind`
//! of the request at the same index.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use static_assertions::const_assert_eq;
use std::collections::TryReserveError;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while encoding or decoding typed values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Kind name not one of `u8 … i64`.
    #[error("unknown value kind: {0:?}")]
    UnknownKind(String),

    /// Kind code outside 0..=7.
    #[error("unknown value kind code: {0}")]
    UnknownKindCode(u8),

    /// Value does not fit the kind.
    #[error("value {value} out of range for {kind}")]
    OutOfRange {
        /// Target kind
        kind: ValueKind,
        /// Offending value
        value: i128,
    },
}

/// Integer interpretation of a value slot.
///
/// The discriminants are the wire codes of the exchange protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ValueKind {
    /// Unsigned 8 bit
    #[default]
    U8 = 0,
    /// Signed 8 bit
    I8 = 1,
    /// Unsigned 16 bit
    U16 = 2,
    /// Signed 16 bit
    I16 = 3,
    /// Unsigned 32 bit
    U32 = 4,
    /// Signed 32 bit
    I32 = 5,
    /// Unsigned 64 bit
    U64 = 6,
    /// Signed 64 bit
    I64 = 7,
}

impl ValueKind {
    /// All kinds in wire-code order.
    pub const ALL: [ValueKind; 8] = [
        ValueKind::U8,
        ValueKind::I8,
        ValueKind::U16,
        ValueKind::I16,
        ValueKind::U32,
        ValueKind::I32,
        ValueKind::U64,
        ValueKind::I64,
    ];

    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Literal name (`"u8"`, `"i16"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::U8 => "u8",
            ValueKind::I8 => "i8",
            ValueKind::U16 => "u16",
            ValueKind::I16 => "i16",
            ValueKind::U32 => "u32",
            ValueKind::I32 => "i32",
            ValueKind::U64 => "u64",
            ValueKind::I64 => "i64",
        }
    }

    /// True for the `i*` kinds.
    pub fn is_signed(self) -> bool {
        self.code() & 1 == 1
    }

    /// Number of significant bytes in a slot.
    pub fn width_bytes(self) -> usize {
        1 << (self.code() >> 1)
    }

    /// Inclusive value range of the kind.
    pub fn range(self) -> (i128, i128) {
        match self {
            ValueKind::U8 => (0, u8::MAX.into()),
            ValueKind::I8 => (i8::MIN.into(), i8::MAX.into()),
            ValueKind::U16 => (0, u16::MAX.into()),
            ValueKind::I16 => (i16::MIN.into(), i16::MAX.into()),
            ValueKind::U32 => (0, u32::MAX.into()),
            ValueKind::I32 => (i32::MIN.into(), i32::MAX.into()),
            ValueKind::U64 => (0, u64::MAX.into()),
            ValueKind::I64 => (i64::MIN.into(), i64::MAX.into()),
        }
    }
}

impl TryFrom<u8> for ValueKind {
    type Error = ValueError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        ValueKind::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(ValueError::UnknownKindCode(code))
    }
}

impl FromStr for ValueKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValueError::UnknownKind(s.to_string()))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untagged 8 byte value container, little-endian.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ValueSlot([u8; 8]);

const_assert_eq!(std::mem::size_of::<ValueSlot>(), 8);

macro_rules! slot_accessors {
    ($($get:ident, $set:ident, $ty:ty);* $(;)?) => {
        $(
            #[doc = concat!("Read the slot as `", stringify!($ty), "`.")]
            pub fn $get(&self) -> $ty {
                const N: usize = std::mem::size_of::<$ty>();
                let mut bytes = [0u8; N];
                bytes.copy_from_slice(&self.0[..N]);
                <$ty>::from_le_bytes(bytes)
            }

            #[doc = concat!("Store a `", stringify!($ty), "`, zeroing the upper bytes.")]
            pub fn $set(&mut self, value: $ty) {
                const N: usize = std::mem::size_of::<$ty>();
                self.0 = [0u8; 8];
                self.0[..N].copy_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl ValueSlot {
    slot_accessors! {
        u8, set_u8, u8;
        i8, set_i8, i8;
        u16, set_u16, u16;
        i16, set_i16, i16;
        u32, set_u32, u32;
        i32, set_i32, i32;
        u64, set_u64, u64;
        i64, set_i64, i64;
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Build a slot from raw bytes.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Value of the slot interpreted as `kind`, widened.
    pub fn get(&self, kind: ValueKind) -> i128 {
        match kind {
            ValueKind::U8 => self.u8().into(),
            ValueKind::I8 => self.i8().into(),
            ValueKind::U16 => self.u16().into(),
            ValueKind::I16 => self.i16().into(),
            ValueKind::U32 => self.u32().into(),
            ValueKind::I32 => self.i32().into(),
            ValueKind::U64 => self.u64().into(),
            ValueKind::I64 => self.i64().into(),
        }
    }

    /// Encode `value` as `kind`.
    ///
    /// # Errors
    /// `ValueError::OutOfRange` when the value does not fit the kind.
    pub fn from_i128(kind: ValueKind, value: i128) -> Result<Self, ValueError> {
        let out_of_range = || ValueError::OutOfRange { kind, value };
        let mut slot = ValueSlot::default();
        match kind {
            ValueKind::U8 => slot.set_u8(u8::try_from(value).map_err(|_| out_of_range())?),
            ValueKind::I8 => slot.set_i8(i8::try_from(value).map_err(|_| out_of_range())?),
            ValueKind::U16 => slot.set_u16(u16::try_from(value).map_err(|_| out_of_range())?),
            ValueKind::I16 => slot.set_i16(i16::try_from(value).map_err(|_| out_of_range())?),
            ValueKind::U32 => slot.set_u32(u32::try_from(value).map_err(|_| out_of_range())?),
            ValueKind::I32 => slot.set_i32(i32::try_from(value).map_err(|_| out_of_range())?),
            ValueKind::U64 => slot.set_u64(u64::try_from(value).map_err(|_| out_of_range())?),
            ValueKind::I64 => slot.set_i64(i64::try_from(value).map_err(|_| out_of_range())?),
        }
        Ok(slot)
    }

    /// Decode the slot as a JSON number of `kind`.
    pub fn to_json(&self, kind: ValueKind) -> Value {
        match kind {
            ValueKind::U8 => self.u8().into(),
            ValueKind::I8 => self.i8().into(),
            ValueKind::U16 => self.u16().into(),
            ValueKind::I16 => self.i16().into(),
            ValueKind::U32 => self.u32().into(),
            ValueKind::I32 => self.i32().into(),
            ValueKind::U64 => self.u64().into(),
            ValueKind::I64 => self.i64().into(),
        }
    }

    /// Append the decimal text of the slot as `kind` to `out`.
    pub fn write_decimal<W: fmt::Write>(&self, kind: ValueKind, out: &mut W) -> fmt::Result {
        match kind {
            ValueKind::U8 => write!(out, "{}", self.u8()),
            ValueKind::I8 => write!(out, "{}", self.i8()),
            ValueKind::U16 => write!(out, "{}", self.u16()),
            ValueKind::I16 => write!(out, "{}", self.i16()),
            ValueKind::U32 => write!(out, "{}", self.u32()),
            ValueKind::I32 => write!(out, "{}", self.i32()),
            ValueKind::U64 => write!(out, "{}", self.u64()),
            ValueKind::I64 => write!(out, "{}", self.i64()),
        }
    }
}

impl fmt::Debug for ValueSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueSlot({:#018x})", self.u64())
    }
}

/// One register read addressed on the field bus.
///
/// `is_transmit_pdo` shares its wire byte semantics with `interface_id`
/// when set through a description (see the request compiler).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegisterRequest {
    /// Interface number
    pub interface_id: u8,
    /// Slave node id
    pub slave_id: u8,
    /// Object dictionary index
    pub register: u16,
    /// Object dictionary sub-index
    pub sub_register: u8,
    /// Interpretation of the returned value
    pub value_kind: ValueKind,
    /// Read from the transmit PDO image instead of SDO
    pub is_transmit_pdo: bool,
}

/// Ordered, non-empty list of register requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBatch(Vec<RegisterRequest>);

impl RequestBatch {
    /// Wrap compiled requests; `None` when empty.
    pub fn new(requests: Vec<RegisterRequest>) -> Option<Self> {
        if requests.is_empty() {
            None
        } else {
            Some(Self(requests))
        }
    }
}

impl Deref for RequestBatch {
    type Target = [RegisterRequest];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Zero-initialized value slots paired with a request batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultBatch(Vec<ValueSlot>);

impl ResultBatch {
    /// Allocate `len` zeroed slots.
    ///
    /// # Errors
    /// Fails instead of aborting when the allocation cannot be satisfied.
    pub fn zeroed(len: usize) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(len)?;
        slots.resize(len, ValueSlot::default());
        Ok(Self(slots))
    }
}

impl Deref for ResultBatch {
    type Target = [ValueSlot];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ResultBatch {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
