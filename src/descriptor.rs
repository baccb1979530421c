//! Register descriptor table.
//!
//! A descriptor says where a value lives (address and bank), how to decode
//! it (data type and word order), how to scale it, and whether a failed
//! read may be retried against the other bank. Tables are validated once
//! when loaded; the coordinator never re-checks a descriptor.
//!
//! Records are JSON5 objects:
//!
//! ```json5
//! { name: "battery_voltage", address: 17, unit: "V", data_type: "uint16",
//!   scale: 0.1, precision: 1, input_type: "holding", word_swap: false, fallback: true }
//! ```
//!
//! Only `name` and `address` are required. Unknown fields are ignored.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::MAX_PRECISION;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::ModbusFunction;

const ENSOLARX_REGISTER_MAP: &str = include_str!("../registers/ensolarx.json5");

/// Register data type of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    #[serde(alias = "u16")]
    Uint16,
    #[serde(alias = "i16")]
    Int16,
    #[serde(alias = "u32")]
    Uint32,
    #[serde(alias = "f32", alias = "float")]
    Float32,
}

impl DataType {
    /// Number of registers read for this type.
    pub fn register_count(self) -> u16 {
        match self {
            Self::Uint16 | Self::Int16 => 1,
            Self::Uint32 | Self::Float32 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Float32 => "float32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holding (FC03) or input (FC04) registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterBank {
    #[default]
    Holding,
    Input,
}

impl RegisterBank {
    /// The bank tried on fallback.
    pub fn other(self) -> Self {
        match self {
            Self::Holding => Self::Input,
            Self::Input => Self::Holding,
        }
    }

    pub fn function(self) -> ModbusFunction {
        match self {
            Self::Holding => ModbusFunction::ReadHoldingRegisters,
            Self::Input => ModbusFunction::ReadInputRegisters,
        }
    }

    pub fn function_code(self) -> u8 {
        self.function().to_u8()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Holding => "holding",
            Self::Input => "input",
        }
    }

    /// Diagnostic label of a read attempt, e.g. `holding[2w]`.
    pub fn attempt_label(self, count: u16) -> String {
        format!("{}[{}w]", self.as_str(), count)
    }
}

impl fmt::Display for RegisterBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One polled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    pub name: String,
    pub address: u16,
    /// Display unit, passed through to consumers untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, alias = "dtype")]
    pub data_type: DataType,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, rename = "input_type", alias = "bank")]
    pub bank: RegisterBank,
    #[serde(default)]
    pub word_swap: bool,
    #[serde(default = "default_fallback", rename = "fallback")]
    pub allow_fallback: bool,
}

fn default_scale() -> f64 {
    1.0
}

fn default_fallback() -> bool {
    true
}

impl RegisterDescriptor {
    /// Unscaled holding-register descriptor with fallback enabled.
    pub fn new<S: Into<String>>(name: S, address: u16, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            address,
            unit: None,
            data_type,
            scale: default_scale(),
            precision: None,
            bank: RegisterBank::default(),
            word_swap: false,
            allow_fallback: default_fallback(),
        }
    }

    pub fn with_bank(mut self, bank: RegisterBank) -> Self {
        self.bank = bank;
        self
    }

    pub fn with_scale(mut self, scale: f64, precision: Option<u32>) -> Self {
        self.scale = scale;
        self.precision = precision;
        self
    }

    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_word_swap(mut self, word_swap: bool) -> Self {
        self.word_swap = word_swap;
        self
    }

    pub fn with_fallback(mut self, allow_fallback: bool) -> Self {
        self.allow_fallback = allow_fallback;
        self
    }

    pub fn register_count(&self) -> u16 {
        self.data_type.register_count()
    }

    /// Snapshot key for lookup by address.
    pub fn address_key(&self) -> String {
        self.address.to_string()
    }

    fn validate(&self) -> ModbusResult<()> {
        if self.name.trim().is_empty() {
            return Err(ModbusError::configuration(format!(
                "Register at address {} has an empty name",
                self.address
            )));
        }
        if !self.scale.is_finite() {
            return Err(ModbusError::configuration(format!(
                "Register '{}' has a non-finite scale",
                self.name
            )));
        }
        if let Some(precision) = self.precision {
            if precision > MAX_PRECISION {
                return Err(ModbusError::configuration(format!(
                    "Register '{}' precision {} exceeds {}",
                    self.name, precision, MAX_PRECISION
                )));
            }
        }
        if u32::from(self.address) + u32::from(self.register_count()) > 0x1_0000 {
            return Err(ModbusError::configuration(format!(
                "Register '{}' at {} runs past the end of the address space",
                self.name, self.address
            )));
        }
        Ok(())
    }
}

/// On-disk table layout: a bare list or `{ registers: [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TableFile {
    List(Vec<RegisterDescriptor>),
    Wrapped { registers: Vec<RegisterDescriptor> },
}

/// Validated, ordered descriptor table.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorTable {
    descriptors: Vec<RegisterDescriptor>,
}

impl DescriptorTable {
    /// Validate and wrap a list of descriptors.
    ///
    /// # Errors
    ///
    /// `ModbusError::Configuration` when the table is empty, a name is
    /// blank or repeated, an `(address, bank)` pair is repeated, a scale is
    /// not finite, or a precision is out of range.
    pub fn from_records(descriptors: Vec<RegisterDescriptor>) -> ModbusResult<Self> {
        if descriptors.is_empty() {
            return Err(ModbusError::configuration("Register table is empty"));
        }

        let mut names = HashSet::new();
        let mut locations = HashSet::new();
        for descriptor in &descriptors {
            descriptor.validate()?;
            if !names.insert(descriptor.name.as_str()) {
                return Err(ModbusError::configuration(format!(
                    "Duplicate register name '{}'",
                    descriptor.name
                )));
            }
            if !locations.insert((descriptor.address, descriptor.bank)) {
                return Err(ModbusError::configuration(format!(
                    "Duplicate {} register address {}",
                    descriptor.bank, descriptor.address
                )));
            }
        }

        debug!("Loaded register table with {} entries", descriptors.len());
        Ok(Self { descriptors })
    }

    /// Parse a JSON5 (or plain JSON) table.
    pub fn from_json5_str(source: &str) -> ModbusResult<Self> {
        let file: TableFile = json5::from_str(source).map_err(|e| {
            ModbusError::configuration(format!("Failed to parse register table: {}", e))
        })?;
        let descriptors = match file {
            TableFile::List(list) => list,
            TableFile::Wrapped { registers } => registers,
        };
        Self::from_records(descriptors)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ModbusResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::configuration(format!(
                "Failed to read register table {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json5_str(&source)
    }

    /// Bundled register map of the EnsolarX / LE-03MW inverter.
    pub fn ensolarx_default() -> ModbusResult<Self> {
        Self::from_json5_str(ENSOLARX_REGISTER_MAP)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisterDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RegisterDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn as_slice(&self) -> &[RegisterDescriptor] {
        &self.descriptors
    }
}

impl<'a> IntoIterator for &'a DescriptorTable {
    type Item = &'a RegisterDescriptor;
    type IntoIter = std::slice::Iter<'a, RegisterDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}
