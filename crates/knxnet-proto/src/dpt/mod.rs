//! Datapoint type (DPT) value codec.
//!
//! This module is standalone: nothing in [`crate::codec`] or the tunnel crate
//! calls into it. It exists for callers that want to turn the raw bytes
//! carried inside a cEMI APDU into an application-level value (a temperature,
//! a switch state, a percentage) without hand-rolling the KNX datapoint
//! formats themselves.
//!
//! Datapoint types are looked up by their dotted identifier (`"9.001"`) through
//! a fixed, compile-time table — there is no runtime plugin mechanism.
//!
//! ```rust
//! use knxnet_proto::dpt::{decode, encode, DptValue};
//!
//! let bytes = encode("1.001", &DptValue::Bool(true)).unwrap();
//! assert_eq!(bytes, vec![0x01]);
//! assert_eq!(decode("1.001", &bytes).unwrap(), DptValue::Bool(true));
//! ```

mod dpt1;
mod dpt5;
mod dpt9;

use once_cell::sync::Lazy;
use thiserror::Error;

/// A decoded or to-be-encoded datapoint value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DptValue {
    Bool(bool),
    Scaled(u8),
    Float(f32),
}

/// Errors raised by datapoint encode/decode.
#[derive(Debug, Error, PartialEq)]
pub enum DptError {
    #[error("unknown datapoint type identifier: {0}")]
    UnknownType(String),

    #[error("wrong value kind for datapoint type {dpt}: got {got}")]
    WrongValueKind { dpt: String, got: &'static str },

    #[error("{0} byte(s) is not enough data for this datapoint type")]
    InsufficientData(usize),

    #[error("value out of range for this datapoint type")]
    OutOfRange,
}

type EncodeFn = fn(&DptValue) -> Result<Vec<u8>, DptError>;
type DecodeFn = fn(&[u8]) -> Result<DptValue, DptError>;

struct DptEntry {
    identifier: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

/// Fixed table of known datapoint types, built once and never mutated.
static REGISTRY: Lazy<Vec<DptEntry>> = Lazy::new(|| {
    let mut entries = Vec::new();
    dpt1::register(&mut entries);
    dpt5::register(&mut entries);
    dpt9::register(&mut entries);
    entries
});

fn lookup(identifier: &str) -> Result<&'static DptEntry, DptError> {
    REGISTRY
        .iter()
        .find(|e| e.identifier == identifier)
        .ok_or_else(|| DptError::UnknownType(identifier.to_string()))
}

/// Encodes `value` as the wire bytes for datapoint type `identifier` (e.g. `"9.001"`).
pub fn encode(identifier: &str, value: &DptValue) -> Result<Vec<u8>, DptError> {
    (lookup(identifier)?.encode)(value)
}

/// Decodes wire bytes as datapoint type `identifier`.
pub fn decode(identifier: &str, bytes: &[u8]) -> Result<DptValue, DptError> {
    (lookup(identifier)?.decode)(bytes)
}

/// Returns `true` if `identifier` names a datapoint type in the registry.
pub fn is_known(identifier: &str) -> bool {
    REGISTRY.iter().any(|e| e.identifier == identifier)
}
