//! DPT 9.xxx — 2-byte KNX float (temperature, humidity, illuminance, ...).
//!
//! ```text
//! Byte 0: MEEE EMMM
//! Byte 1: MMMM MMMM
//!
//! M = sign (part of the 11-bit two's complement mantissa)
//! E = 4-bit exponent
//! value = 0.01 * mantissa * 2^exponent
//! ```
//!
//! Range roughly -671088.64..=670760.96 with resolution 0.01 at exponent 0.

use super::{DptEntry, DptError, DptValue};

const IDENTIFIERS: &[&str] = &[
    "9.001", // Temperature, °C
    "9.004", // Illuminance, lux
    "9.005", // Wind speed, m/s
    "9.006", // Pressure, Pa
    "9.007", // Humidity, %
];

fn encode(value: &DptValue) -> Result<Vec<u8>, DptError> {
    let v = match value {
        DptValue::Float(v) => *v,
        other => {
            return Err(DptError::WrongValueKind {
                dpt: "9.xxx".to_string(),
                got: kind_name(other),
            })
        }
    };

    if v == 0.0 {
        return Ok(vec![0x00, 0x00]);
    }

    let mut exponent: u8 = 0;
    let mut mantissa_f = v * 100.0;
    while !(-2048.0..=2047.0).contains(&mantissa_f) && exponent < 15 {
        exponent += 1;
        mantissa_f = v * 100.0 / (1u32 << exponent) as f32;
    }
    if !(-2048.0..=2047.0).contains(&mantissa_f) {
        return Err(DptError::OutOfRange);
    }

    let mantissa = if mantissa_f >= 0.0 {
        (mantissa_f + 0.5) as i16
    } else {
        (mantissa_f - 0.5) as i16
    };
    let mantissa_u16 = mantissa as u16 & 0x07FF;
    let raw = (u16::from(exponent) << 11) | mantissa_u16;
    Ok(raw.to_be_bytes().to_vec())
}

fn decode(bytes: &[u8]) -> Result<DptValue, DptError> {
    if bytes.len() < 2 {
        return Err(DptError::InsufficientData(2));
    }
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    let exponent = ((raw >> 11) & 0x0F) as u8;
    let mantissa_raw = raw & 0x07FF;
    let mantissa = if mantissa_raw & 0x0400 != 0 {
        (mantissa_raw | 0xF800) as i16
    } else {
        mantissa_raw as i16
    };
    let value = (0.01 * f32::from(mantissa)) * (1u32 << exponent) as f32;
    Ok(DptValue::Float(value))
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

#[cfg(test)]
mod tests {
    use super::super::{decode as dpt_decode, encode as dpt_encode, DptValue};

    fn assert_close(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() < eps, "{a} not within {eps} of {b}");
    }

    #[test]
    fn zero_round_trips_exactly() {
        let bytes = dpt_encode("9.001", &DptValue::Float(0.0)).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00]);
        assert_eq!(dpt_decode("9.001", &bytes).unwrap(), DptValue::Float(0.0));
    }

    #[test]
    fn positive_temperature_round_trips() {
        let bytes = dpt_encode("9.001", &DptValue::Float(21.5)).unwrap();
        let DptValue::Float(decoded) = dpt_decode("9.001", &bytes).unwrap() else {
            panic!("expected Float")
        };
        assert_close(decoded, 21.5, 0.1);
    }

    #[test]
    fn negative_temperature_round_trips() {
        let bytes = dpt_encode("9.001", &DptValue::Float(-5.0)).unwrap();
        let DptValue::Float(decoded) = dpt_decode("9.001", &bytes).unwrap() else {
            panic!("expected Float")
        };
        assert_close(decoded, -5.0, 0.01);
    }

    #[test]
    fn large_pressure_value_round_trips_within_tolerance() {
        let bytes = dpt_encode("9.006", &DptValue::Float(100_000.0)).unwrap();
        let DptValue::Float(decoded) = dpt_decode("9.006", &bytes).unwrap() else {
            panic!("expected Float")
        };
        assert_close(decoded, 100_000.0, 500.0);
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(matches!(
            dpt_decode("9.001", &[0x00]),
            Err(DptError::InsufficientData(2))
        ));
    }
}
