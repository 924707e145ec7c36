//! Value interpretation grammars (spec.md §4.4).

use crate::error::DtsError;
use crate::tokenizer::parse_int_literal;
use crate::value::{CellTerm, Chunk};

/// `boolean-value(V)`: true for `y|yes|on|true|okay` and empty/undefined;
/// false for `n|no|off|false|disabled`; otherwise parsed as a base-10/hex
/// integer and compared against zero.
pub fn boolean_value(v: &str) -> Result<bool, DtsError> {
    match v.trim() {
        "" | "y" | "yes" | "on" | "true" | "okay" => Ok(true),
        "n" | "no" | "off" | "false" | "disabled" => Ok(false),
        other => parse_int_literal(other)
            .map(|n| n != 0)
            .ok_or_else(|| DtsError::BadBoolean(other.to_string())),
    }
}

/// `integer-value(V, width)`: synonyms, a `&label` passthrough for
/// 4-byte cells, or a masked (possibly hex) integer expression.
pub fn integer_value(v: &str, width_bytes: u8) -> Result<IntegerValue, DtsError> {
    let trimmed = v.trim();
    if let Some(label) = trimmed.strip_prefix('&') {
        return if width_bytes == 4 {
            Ok(IntegerValue::Label(label.to_string()))
        } else {
            Err(DtsError::BadInteger(trimmed.to_string()))
        };
    }
    let raw = match trimmed {
        "y" | "yes" | "on" | "true" | "down" => 1i128,
        "n" | "no" | "off" | "false" | "none" => 0,
        "up" => 2,
        other => parse_int_literal(other).ok_or_else(|| DtsError::BadInteger(other.to_string()))?,
    };
    Ok(IntegerValue::Int(mask_to_width(raw, width_bytes)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegerValue {
    Int(u64),
    Label(String),
}

/// Masks a signed value down to the unsigned range of `width_bytes`.
pub fn mask_to_width(value: i128, width_bytes: u8) -> u64 {
    if width_bytes == 0 || width_bytes >= 16 {
        return value as u64;
    }
    let bits = width_bytes as u32 * 8;
    let mask: u128 = if bits >= 128 { u128::MAX } else { (1u128 << bits) - 1 };
    ((value as u128) & mask) as u64
}

/// Renders a masked integer back into a `CellTerm`/`Chunk` for a given
/// element width, used when the Parameter Engine writes a new value.
pub fn int_to_cell_term(value: u64, elem_size: u8) -> CellTerm {
    let masked = mask_to_width(value as i128, elem_size);
    CellTerm::Int {
        value: masked as i128,
        text: format!("{masked:#x}"),
    }
}

pub fn int_to_string_chunk(value: u64) -> Chunk {
    Chunk::Str(format!("{value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_value_synonyms() {
        assert!(boolean_value("y").unwrap());
        assert!(boolean_value("okay").unwrap());
        assert!(boolean_value("").unwrap());
        assert!(!boolean_value("n").unwrap());
        assert!(!boolean_value("disabled").unwrap());
        assert!(boolean_value("3").unwrap());
        assert!(!boolean_value("0").unwrap());
        assert!(boolean_value("0x10").unwrap());
        assert!(boolean_value_fails("nonsense"));
    }

    fn boolean_value_fails(s: &str) -> bool {
        boolean_value(s).is_err()
    }

    #[test]
    fn integer_value_synonyms_and_mask() {
        assert_eq!(integer_value("up", 1).unwrap(), IntegerValue::Int(2));
        assert_eq!(integer_value("down", 1).unwrap(), IntegerValue::Int(1));
        assert_eq!(integer_value("0x1ff", 1).unwrap(), IntegerValue::Int(0xff));
        assert_eq!(
            integer_value("&foo", 4).unwrap(),
            IntegerValue::Label("foo".into())
        );
        assert!(integer_value("&foo", 1).is_err());
    }
}
