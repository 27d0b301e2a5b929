//! Constant values
//!
//! Values appear in two places: as constants inside query expressions and as
//! cells of records returned by the backend.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use std::fmt;

/// A constant value carried by a query expression or a result record
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point number
    Float(f64),
    /// String value
    String(String),
    /// Point in time with an offset (normalized to UTC when rendered)
    DateTime(DateTime<FixedOffset>),
    /// Signed time span
    Duration(chrono::Duration),
    /// Sequence of values
    Array(Vec<Value>),
    /// Any other value, carried by its string form
    Other(String),
}

impl Value {
    /// Create a catch-all value from anything displayable
    pub fn other(value: impl fmt::Display) -> Self {
        Self::Other(value.to_string())
    }

    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::Duration(_) => "duration",
            Self::Array(_) => "array",
            Self::Other(_) => "other",
        }
    }

    /// Convert to a signed integer when the value has a numeric meaning
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Float(v) if v.is_finite() => Some(*v as i64),
            Self::Bool(v) => Some(*v as i64),
            Self::String(s) | Self::Other(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert to a float when the value has a numeric meaning
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::String(s) | Self::Other(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow the string content of string-like values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Other(s) => Some(s),
            _ => None,
        }
    }

    /// The date-time value converted to UTC
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt.with_timezone(&Utc)),
            Self::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}

/// Microseconds of a duration, saturating on overflow
pub(crate) fn duration_micros(duration: &chrono::Duration) -> i64 {
    duration.num_microseconds().unwrap_or_else(|| {
        duration
            .num_milliseconds()
            .checked_mul(1000)
            .unwrap_or(if duration < &chrono::Duration::zero() {
                i64::MIN
            } else {
                i64::MAX
            })
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) | Self::Other(s) => write!(f, "{}", s),
            Self::DateTime(dt) => write!(
                f,
                "{}",
                dt.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ),
            Self::Duration(d) => write!(f, "{}us", duration_micros(d)),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::UInt(v as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Self::DateTime(v)
    }
}

impl From<chrono::Duration> for Value {
    fn from(v: chrono::Duration) -> Self {
        Self::Duration(v)
    }
}

impl From<std::time::Duration> for Value {
    fn from(v: std::time::Duration) -> Self {
        Self::Duration(chrono::Duration::from_std(v).unwrap_or(chrono::Duration::MAX))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_datetime_is_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let dt = offset.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        assert_eq!(Value::from(dt).to_string(), "2024-01-15T12:00:00Z");
    }

    #[test]
    fn test_display_duration_micros() {
        assert_eq!(
            Value::from(chrono::Duration::milliseconds(1)).to_string(),
            "1000us"
        );
        assert_eq!(
            Value::from(std::time::Duration::from_secs(2)).to_string(),
            "2000000us"
        );
    }

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(Value::Int(3).as_i64(), Some(3));
        assert_eq!(Value::UInt(7).as_i64(), Some(7));
        assert_eq!(Value::Float(2.9).as_i64(), Some(2));
        assert_eq!(Value::from("42").as_i64(), Some(42));
        assert_eq!(Value::from("x").as_i64(), None);
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
    }

    #[test]
    fn test_vec_conversion() {
        let value = Value::from(vec![1, 2]);
        assert_eq!(value, Value::Array(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(value.to_string(), "[1, 2]");
    }
}
