//! # Value Types
//!
//! [`ModbusValue`] is what a register decode produces; [`Reading`] is what
//! a snapshot carries after scaling.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw value of one descriptor as decoded from its register words.
///
/// ```rust
/// use ensolarx_modbus::ModbusValue;
///
/// let cell = ModbusValue::U16(3312);
/// assert_eq!(cell.register_count(), 1);
/// assert_eq!(cell.as_i64(), Some(3312));
/// assert_eq!(ModbusValue::F32(0.5).as_i64(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModbusValue {
    U16(u16),
    I16(i16),
    U32(u32),
    F32(f32),
}

impl ModbusValue {
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::F32(v) => f64::from(v),
            other => other.as_i64().unwrap_or_default() as f64,
        }
    }

    /// Integer view of the value; `None` for floats.
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::U16(v) => Some(v.into()),
            Self::I16(v) => Some(v.into()),
            Self::U32(v) => Some(v.into()),
            Self::F32(_) => None,
        }
    }

    /// Registers the value occupies on the wire.
    #[inline]
    pub fn register_count(&self) -> usize {
        if matches!(self, Self::U32(_) | Self::F32(_)) {
            2
        } else {
            1
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::U16(_) => "uint16",
            Self::I16(_) => "int16",
            Self::U32(_) => "uint32",
            Self::F32(_) => "float32",
        }
    }
}

impl fmt::Display for ModbusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_i64() {
            Some(i) => write!(f, "{}", i),
            None => write!(f, "{}", self.as_f64()),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ModbusValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive!(u16 => U16, i16 => I16, u32 => U32, f32 => F32);

/// A published value: integer when the register was read unscaled,
/// floating point otherwise.
///
/// Serializes as a bare JSON number. Floats compare by bit pattern, so an
/// unavailable (NaN) reading equals itself and `0.0 != -0.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Int(i64),
    Float(f64),
}

impl Reading {
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            Reading::Int(v) => *v as f64,
            Reading::Float(v) => *v,
        }
    }

    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, Reading::Int(_))
    }
}

impl PartialEq for Reading {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reading::Int(a), Reading::Int(b)) => a == b,
            (Reading::Float(a), Reading::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Reading {}

impl From<ModbusValue> for Reading {
    fn from(value: ModbusValue) -> Self {
        match value.as_i64() {
            Some(v) => Reading::Int(v),
            None => Reading::Float(value.as_f64()),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Int(v) => write!(f, "{}", v),
            Reading::Float(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_views() {
        assert_eq!(ModbusValue::I16(-50).as_f64(), -50.0);
        assert_eq!(ModbusValue::U32(70_000).as_f64(), 70_000.0);
        assert_eq!(ModbusValue::F32(0.25).as_f64(), 0.25);
        assert_eq!(ModbusValue::I16(-1).as_i64(), Some(-1));
        assert_eq!(ModbusValue::U32(u32::MAX).as_i64(), Some(4_294_967_295));
        assert_eq!(ModbusValue::from(1.0f32).as_i64(), None);
    }

    #[test]
    fn test_width_and_name() {
        assert_eq!(ModbusValue::from(7u16).register_count(), 1);
        assert_eq!(ModbusValue::from(-7i16).register_count(), 1);
        assert_eq!(ModbusValue::from(7u32).register_count(), 2);
        assert_eq!(ModbusValue::F32(0.0).type_name(), "float32");
    }

    #[test]
    fn test_reading_from_value() {
        assert_eq!(Reading::from(ModbusValue::U16(100)), Reading::Int(100));
        assert_eq!(Reading::from(ModbusValue::F32(3.5)), Reading::Float(3.5));
        assert!(Reading::from(ModbusValue::I16(-3)).is_integer());
    }

    #[test]
    fn test_reading_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Reading::Int(-12)).unwrap(), "-12");
        assert_eq!(serde_json::to_string(&Reading::Float(25.5)).unwrap(), "25.5");
        let back: Reading = serde_json::from_str("7").unwrap();
        assert_eq!(back, Reading::Int(7));
    }

    #[test]
    fn test_reading_equality_is_bitwise() {
        let unavailable = Reading::from(ModbusValue::F32(f32::from_bits(0xFFFF_FFFF)));
        assert!(unavailable.as_f64().is_nan());
        assert_eq!(unavailable, unavailable);
        assert_eq!(Reading::Float(f64::NAN), Reading::Float(f64::NAN));
        assert_ne!(Reading::Float(0.0), Reading::Float(-0.0));
        assert_ne!(Reading::Int(1), Reading::Float(1.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(ModbusValue::I16(-1234).to_string(), "-1234");
        assert_eq!(ModbusValue::F32(1.5).to_string(), "1.5");
        assert_eq!(format!("{}", Reading::Float(0.5)), "0.5");
    }
}
