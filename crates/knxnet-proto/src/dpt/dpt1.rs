//! DPT 1.xxx — 1-bit boolean values (switch, bool, enable, up/down, ...).
//!
//! Wire format is a single byte whose LSB carries the value; the other 7 bits
//! are always zero on the wire and ignored on decode.

use super::{DptEntry, DptError, DptValue};

const IDENTIFIERS: &[&str] = &[
    "1.001", // Switch
    "1.002", // Bool
    "1.003", // Enable
    "1.008", // UpDown
    "1.009", // OpenClose
    "1.010", // Start
];

fn encode(value: &DptValue) -> Result<Vec<u8>, DptError> {
    match value {
        DptValue::Bool(b) => Ok(vec![if *b { 0x01 } else { 0x00 }]),
        other => Err(DptError::WrongValueKind {
            dpt: "1.xxx".to_string(),
            got: kind_name(other),
        }),
    }
}

fn decode(bytes: &[u8]) -> Result<DptValue, DptError> {
    let byte = *bytes.first().ok_or(DptError::InsufficientData(1))?;
    Ok(DptValue::Bool(byte & 0x01 != 0))
}

fn kind_name(v: &DptValue) -> &'static str {
    match v {
        DptValue::Bool(_) => "Bool",
        DptValue::Scaled(_) => "Scaled",
        DptValue::Float(_) => "Float",
    }
}

pub(super) fn register(entries: &mut Vec<DptEntry>) {
    for id in IDENTIFIERS {
        entries.push(DptEntry {
            identifier: id,
            encode,
            decode,
        });
    }
}
