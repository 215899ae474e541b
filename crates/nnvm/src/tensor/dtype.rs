use std::fmt;

use serde::{Deserialize, Serialize};

/// Element data types understood by kernels and the stack VM.
///
/// The quantized variants share storage with their plain 8-bit counterparts;
/// they only differ in how a graph interprets the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    QuantUInt8,
    QuantInt8,
}

impl DataType {
    pub const ALL: [DataType; 9] = [
        DataType::Int8,
        DataType::UInt8,
        DataType::Int16,
        DataType::UInt16,
        DataType::Int32,
        DataType::UInt32,
        DataType::Float32,
        DataType::QuantUInt8,
        DataType::QuantInt8,
    ];

    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 | DataType::QuantUInt8 | DataType::QuantInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
        }
    }

    /// Stable tag used by the bytecode encoding.
    pub fn tag(self) -> u8 {
        match self {
            DataType::Int8 => 0,
            DataType::UInt8 => 1,
            DataType::Int16 => 2,
            DataType::UInt16 => 3,
            DataType::Int32 => 4,
            DataType::UInt32 => 5,
            DataType::Float32 => 6,
            DataType::QuantUInt8 => 7,
            DataType::QuantInt8 => 8,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        DataType::ALL.iter().copied().find(|dtype| dtype.tag() == tag)
    }

    /// Plain type the bytes are stored as.
    pub fn storage(self) -> DataType {
        match self {
            DataType::QuantUInt8 => DataType::UInt8,
            DataType::QuantInt8 => DataType::Int8,
            other => other,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Representable value range, used to saturate conversions.
    pub fn value_range(self) -> (f64, f64) {
        match self.storage() {
            DataType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            DataType::UInt8 => (0.0, u8::MAX as f64),
            DataType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::UInt16 => (0.0, u16::MAX as f64),
            DataType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::UInt32 => (0.0, u32::MAX as f64),
            _ => (f32::MIN as f64, f32::MAX as f64),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Int8 => "i8",
            DataType::UInt8 => "u8",
            DataType::Int16 => "i16",
            DataType::UInt16 => "u16",
            DataType::Int32 => "i32",
            DataType::UInt32 => "u32",
            DataType::Float32 => "f32",
            DataType::QuantUInt8 => "qu8",
            DataType::QuantInt8 => "qi8",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for dtype in DataType::ALL {
            assert_eq!(DataType::from_tag(dtype.tag()), Some(dtype));
        }
        assert_eq!(DataType::from_tag(200), None);
    }

    #[test]
    fn quantized_types_share_storage_width() {
        assert_eq!(DataType::QuantUInt8.storage(), DataType::UInt8);
        assert_eq!(DataType::QuantInt8.size_in_bytes(), 1);
        assert_eq!(DataType::Float32.size_in_bytes(), 4);
    }
}
