use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::contract::ScalarType;
use crate::core::{ExecutionError, FromValue, Value};
use crate::result::{QueryResult, Record};

/// How the tuples of a bound query become a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecodeRule {
    /// Exactly one tuple of exactly one column, converted to the type.
    Scalar(ScalarType),
    /// Zero or one tuple.
    Row,
    RowSet,
}

/// A scalar converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl ScalarValue {
    pub fn convert(value: &Value, scalar_type: ScalarType) -> Result<Self, ExecutionError> {
        Ok(match scalar_type {
            ScalarType::U8 => Self::U8(u8::from_value(value)?),
            ScalarType::U16 => Self::U16(u16::from_value(value)?),
            ScalarType::U32 => Self::U32(u32::from_value(value)?),
            ScalarType::U64 => Self::U64(u64::from_value(value)?),
            ScalarType::I8 => Self::I8(i8::from_value(value)?),
            ScalarType::I16 => Self::I16(i16::from_value(value)?),
            ScalarType::I32 => Self::I32(i32::from_value(value)?),
            ScalarType::I64 => Self::I64(i64::from_value(value)?),
            ScalarType::Text => Self::Text(String::from_value(value)?),
            ScalarType::Timestamp => Self::Timestamp(NaiveDateTime::from_value(value)?),
        })
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Self::U8(v) => Some(i128::from(*v)),
            Self::U16(v) => Some(i128::from(*v)),
            Self::U32(v) => Some(i128::from(*v)),
            Self::U64(v) => Some(i128::from(*v)),
            Self::I8(v) => Some(i128::from(*v)),
            Self::I16(v) => Some(i128::from(*v)),
            Self::I32(v) => Some(i128::from(*v)),
            Self::I64(v) => Some(i128::from(*v)),
            Self::Text(_) | Self::Timestamp(_) => None,
        }
    }
}

macro_rules! scalar_into_int {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<ScalarValue> for $ty {
                type Error = ExecutionError;

                fn try_from(value: ScalarValue) -> Result<Self, Self::Error> {
                    let wide = value.as_i128().ok_or_else(|| {
                        ExecutionError::Decode(format!(
                            "{:?} is not an integer scalar",
                            value
                        ))
                    })?;
                    <$ty>::try_from(wide).map_err(|_| ExecutionError::Overflow {
                        value: wide.to_string(),
                        target: stringify!($ty).to_string(),
                    })
                }
            }
        )*
    };
}

scalar_into_int!(u8, u16, u32, u64, i8, i16, i32, i64);

impl TryFrom<ScalarValue> for String {
    type Error = ExecutionError;

    fn try_from(value: ScalarValue) -> Result<Self, Self::Error> {
        match value {
            ScalarValue::Text(s) => Ok(s),
            other => Err(ExecutionError::Decode(format!("{:?} is not a text scalar", other))),
        }
    }
}

impl TryFrom<ScalarValue> for NaiveDateTime {
    type Error = ExecutionError;

    fn try_from(value: ScalarValue) -> Result<Self, Self::Error> {
        match value {
            ScalarValue::Timestamp(ts) => Ok(ts),
            other => Err(ExecutionError::Decode(format!(
                "{:?} is not a timestamp scalar",
                other
            ))),
        }
    }
}

/// Output of a bound method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedResult {
    Scalar(ScalarValue),
    Row(Option<Record>),
    Rows(Vec<Record>),
}

impl DecodedResult {
    pub fn into_scalar(self) -> Result<ScalarValue, ExecutionError> {
        match self {
            Self::Scalar(value) => Ok(value),
            other => Err(mismatch("a scalar", &other)),
        }
    }

    pub fn into_row(self) -> Result<Option<Record>, ExecutionError> {
        match self {
            Self::Row(record) => Ok(record),
            other => Err(mismatch("a single row", &other)),
        }
    }

    pub fn into_rows(self) -> Result<Vec<Record>, ExecutionError> {
        match self {
            Self::Rows(records) => Ok(records),
            Self::Row(record) => Ok(record.into_iter().collect()),
            other => Err(mismatch("a row set", &other)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "a scalar",
            Self::Row(_) => "a single row",
            Self::Rows(_) => "a row set",
        }
    }
}

fn mismatch(expected: &str, actual: &DecodedResult) -> ExecutionError {
    ExecutionError::Decode(format!(
        "method returns {}, not {}",
        actual.kind(),
        expected
    ))
}

fn tuples(count: usize) -> String {
    match count {
        1 => "1 tuple".to_string(),
        n => format!("{} tuples", n),
    }
}

impl DecodeRule {
    pub fn decode(&self, result: QueryResult) -> Result<DecodedResult, ExecutionError> {
        match self {
            DecodeRule::Scalar(scalar_type) => {
                if result.row_count() != 1 || result.column_count() != 1 {
                    return Err(ExecutionError::CardinalityMismatch {
                        expected: "1 tuple of 1 column".to_string(),
                        actual: format!(
                            "{} of {} column(s)",
                            tuples(result.row_count()),
                            result.column_count()
                        ),
                    });
                }
                let value = &result.rows[0][0];
                Ok(DecodedResult::Scalar(ScalarValue::convert(value, *scalar_type)?))
            }
            DecodeRule::Row => {
                if result.row_count() > 1 {
                    return Err(ExecutionError::CardinalityMismatch {
                        expected: "at most 1 tuple".to_string(),
                        actual: tuples(result.row_count()),
                    });
                }
                Ok(DecodedResult::Row(result.into_records().into_iter().next()))
            }
            DecodeRule::RowSet => Ok(DecodedResult::Rows(result.into_records())),
        }
    }
}
