//! DPT 5.xxx — 8-bit unsigned scaled values (percentage, angle, tariff, ...).
//!
//! Wire format is a single raw byte (0-255). Scaling to a physical unit
//! (e.g. 0-100% for DPT 5.001) is left to the caller; this module only
//! guarantees the byte round-trips as an unsigned 8-bit value.

use super::{DptEntry, DptError, DptValue};

const IDENTIFIERS: &[&str] = &[
    "5.001", // Percentage (0-100%, scaled 0-255 on the wire)
    "5.003", // Angle (0-360°, scaled 0-255 on the wire)
    "5.004", // Percentage 0-255
    "5.010", // Counter pulses
];

fn encode(value: &DptValue) -> Result<Vec<u8>, DptError> {
    match value {
        DptValue::Scaled(v) => Ok(vec![*v]),
        other => Err(DptError::WrongValueKind {
            dpt: "5.xxx".to_string(),
            got: kind_name(other),
        }),
    }
}

fn decode(bytes: &[u8]) -> Result<DptValue, DptError> {
    let byte = *bytes.first().ok_or(DptError::InsufficientData(1))?;
    Ok(DptValue::Scaled(byte))
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
