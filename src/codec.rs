//! # Register Codec
//!
//! Pure conversion from raw register words to typed values and from typed
//! values to published readings. No I/O.
//!
//! ## Supported Data Types
//!
//! | Type | Registers | Result |
//! |------|-----------|--------|
//! | uint16 | 1 | `U16(words[0])` |
//! | int16 | 1 | `I16`, two's complement of `words[0]` |
//! | uint32 | 2 | `U32((hi << 16) \| lo)` |
//! | float32 | 2 | `F32`, IEEE-754 bits of `(hi << 16) \| lo` |
//!
//! `hi`/`lo` come from the first/second word, or the reverse when the
//! descriptor sets `word_swap`.

use crate::bytes::WordOrder;
use crate::descriptor::DataType;
use crate::error::{ModbusError, ModbusResult};
use crate::value::{ModbusValue, Reading};

/// Largest `precision` accepted by [`apply_scale`].
pub const MAX_PRECISION: u32 = 10;

/// Decode register words into a typed value.
///
/// Words beyond what the data type needs are ignored.
///
/// # Example
///
/// ```rust
/// use ensolarx_modbus::{decode, DataType, ModbusValue};
///
/// let value = decode(&[0x1234, 0x5678], DataType::Uint32, false).unwrap();
/// assert_eq!(value, ModbusValue::U32(0x12345678));
/// ```
///
/// # Errors
///
/// `ModbusError::Decode` when fewer words than the data type requires
/// were supplied.
pub fn decode(words: &[u16], data_type: DataType, word_swap: bool) -> ModbusResult<ModbusValue> {
    let required = data_type.register_count() as usize;
    if words.len() < required {
        return Err(ModbusError::decode(format!(
            "{} needs {} register(s), got {}",
            data_type,
            required,
            words.len()
        )));
    }

    let value = match data_type {
        DataType::Uint16 => ModbusValue::U16(words[0]),
        DataType::Int16 => ModbusValue::I16(words[0] as i16),
        DataType::Uint32 => {
            ModbusValue::U32(WordOrder::from_word_swap(word_swap).combine([words[0], words[1]]))
        }
        DataType::Float32 => {
            let bits = WordOrder::from_word_swap(word_swap).combine([words[0], words[1]]);
            ModbusValue::F32(f32::from_bits(bits))
        }
    };
    Ok(value)
}

/// Scale and round a decoded value.
///
/// An integer read with `scale == 1.0` stays an integer (precision has
/// nothing to round). Everything else becomes a float, multiplied by
/// `scale` and rounded half away from zero to `precision` fractional digits
/// when set.
///
/// ```rust
/// use ensolarx_modbus::{apply_scale, ModbusValue, Reading};
///
/// assert_eq!(apply_scale(ModbusValue::U16(250), 0.1, Some(1)), Reading::Float(25.0));
/// assert_eq!(apply_scale(ModbusValue::U16(100), 1.0, None), Reading::Int(100));
/// ```
pub fn apply_scale(raw: ModbusValue, scale: f64, precision: Option<u32>) -> Reading {
    #[allow(clippy::float_cmp)]
    let unscaled = scale == 1.0;

    if unscaled {
        if let Some(int) = raw.as_i64() {
            return Reading::Int(int);
        }
    }

    let mut value = raw.as_f64();
    if !unscaled {
        value *= scale;
    }
    if let Some(digits) = precision {
        value = round_to(value, digits);
    }
    Reading::Float(value)
}

/// Round to `digits` fractional digits.
pub fn round_to(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(digits.min(MAX_PRECISION) as i32);
    (value * factor).round() / factor
}
