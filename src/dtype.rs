//! Element types and dtype resolution for binary operators.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

use crate::infer::InferError;

/// Enum specifying the element type of a tensor.
///
/// Two data types are compatible only if they are identical. There is no
/// implicit widening or promotion.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    BFloat16,
    Float32,
    Float64,
}

impl DataType {
    const ALL: [DataType; 13] = [
        DataType::Bool,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
        DataType::Float16,
        DataType::BFloat16,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Return the canonical name of this type (eg. "float32").
    pub fn name(self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float16 => "float16",
            DataType::BFloat16 => "bfloat16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when parsing an unrecognized data type name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseDataTypeError(String);

impl fmt::Display for ParseDataTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown data type \"{}\"", self.0)
    }
}

impl Error for ParseDataTypeError {}

impl FromStr for DataType {
    type Err = ParseDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|dtype| dtype.name() == s)
            .ok_or_else(|| ParseDataTypeError(s.to_string()))
    }
}

/// Rule used to combine the dtypes of an operator's operands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpClass {
    /// Operands must have the same dtype, which is also the result dtype.
    Arithmetic,
    /// Operands may have any dtypes. The result is always boolean.
    Comparison,
    /// The result has the dtype of the first operand.
    Identity,
}

/// Combine the dtypes of two operands according to an operator class.
///
/// `None` represents an unknown dtype. Arithmetic operators are optimistic:
/// if either dtype is unknown the operands are assumed to match at runtime and
/// the result dtype is unknown.
pub fn resolve_dtype(
    class: OpClass,
    lhs: Option<DataType>,
    rhs: Option<DataType>,
) -> Result<Option<DataType>, InferError> {
    match class {
        OpClass::Arithmetic => match (lhs, rhs) {
            (Some(lhs), Some(rhs)) if lhs != rhs => Err(InferError::DtypeMismatch { lhs, rhs }),
            (Some(lhs), Some(_)) => Ok(Some(lhs)),
            _ => Ok(None),
        },
        OpClass::Comparison => Ok(Some(DataType::Bool)),
        OpClass::Identity => Ok(lhs),
    }
}
