//! Scalar and composite value representation shared by the evaluator,
//! the record model, and the storage seam.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

/// Typed value held by constant record entries and storage fields.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum FieldData {
    /// Null literal.
    #[default]
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Arbitrary binary payload.
    Bytes(Vec<u8>),
    /// Nanoseconds since Unix epoch in UTC.
    DateTime(i64),
    /// Ordered list of values.
    Array(Vec<FieldData>),
    /// String-keyed map, e.g. the result of `properties(n)`.
    Map(BTreeMap<String, FieldData>),
}

impl FieldData {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldData::Null => "null",
            FieldData::Bool(_) => "boolean",
            FieldData::Int(_) => "integer",
            FieldData::Float(_) => "float",
            FieldData::String(_) => "string",
            FieldData::Bytes(_) => "bytes",
            FieldData::DateTime(_) => "datetime",
            FieldData::Array(_) => "list",
            FieldData::Map(_) => "map",
        }
    }

    /// Returns true for the null literal.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldData::Null)
    }

    /// Returns true for integers and floats.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldData::Int(_) | FieldData::Float(_))
    }

    /// Returns true for strings.
    pub fn is_string(&self) -> bool {
        matches!(self, FieldData::String(_))
    }

    /// Returns true for lists.
    pub fn is_array(&self) -> bool {
        matches!(self, FieldData::Array(_))
    }

    /// Boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldData::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldData::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric payload promoted to float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldData::Int(v) => Some(*v as f64),
            FieldData::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldData::String(s) => Some(s),
            _ => None,
        }
    }

    /// List payload, if any.
    pub fn as_array(&self) -> Option<&[FieldData]> {
        match self {
            FieldData::Array(items) => Some(items),
            _ => None,
        }
    }

    /// True when both values belong to the same comparison family.
    /// Integers and floats form one numeric family.
    pub fn same_kind(&self, other: &FieldData) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Compares two values of the same family. Returns `None` when the values
    /// are not comparable (different families, nulls, maps, NaN).
    pub fn compare(&self, other: &FieldData) -> Option<Ordering> {
        match (self, other) {
            (FieldData::Int(a), FieldData::Int(b)) => Some(a.cmp(b)),
            (FieldData::Int(_), FieldData::Float(_))
            | (FieldData::Float(_), FieldData::Int(_))
            | (FieldData::Float(_), FieldData::Float(_)) => {
                let a = self.as_float()?;
                let b = other.as_float()?;
                a.partial_cmp(&b)
            }
            (FieldData::Bool(a), FieldData::Bool(b)) => Some(a.cmp(b)),
            (FieldData::String(a), FieldData::String(b)) => Some(a.cmp(b)),
            (FieldData::Bytes(a), FieldData::Bytes(b)) => Some(a.cmp(b)),
            (FieldData::DateTime(a), FieldData::DateTime(b)) => Some(a.cmp(b)),
            (FieldData::Array(a), FieldData::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Equality with numeric promotion (`1 = 1.0`).
    pub fn loose_eq(&self, other: &FieldData) -> bool {
        match self.compare(other) {
            Some(ord) => ord == Ordering::Equal,
            None => self == other,
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            FieldData::Map(_) => 0,
            FieldData::Array(_) => 1,
            FieldData::String(_) => 2,
            FieldData::Bool(_) => 3,
            FieldData::Int(_) | FieldData::Float(_) => 4,
            FieldData::DateTime(_) => 5,
            FieldData::Bytes(_) => 6,
            FieldData::Null => 7,
        }
    }

    /// Total order used by sorting: values of different families order by a
    /// fixed family rank and nulls sort last.
    pub fn total_cmp(&self, other: &FieldData) -> Ordering {
        let (ra, rb) = (self.sort_rank(), other.sort_rank());
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (FieldData::Float(_), _) | (_, FieldData::Float(_)) => {
                let a = self.as_float().unwrap_or(f64::NAN);
                let b = other.as_float().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
            (FieldData::Map(a), FieldData::Map(b)) => a.len().cmp(&b.len()),
            (FieldData::Array(a), FieldData::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.total_cmp(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Renders the value, writing `null_marker` for nulls at the top level.
    pub fn render(&self, null_marker: &str) -> String {
        match self {
            FieldData::Null => null_marker.to_string(),
            other => other.to_string(),
        }
    }

    /// Converts the value to plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            FieldData::Null => Json::Null,
            FieldData::Bool(b) => Json::Bool(*b),
            FieldData::Int(v) => Json::from(*v),
            FieldData::Float(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            FieldData::String(s) => Json::String(s.clone()),
            FieldData::Bytes(bytes) => {
                Json::Array(bytes.iter().map(|b| Json::from(*b)).collect())
            }
            FieldData::DateTime(_) => Json::String(self.to_string()),
            FieldData::Array(items) => Json::Array(items.iter().map(FieldData::to_json).collect()),
            FieldData::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

pub(crate) fn format_datetime(nanos: i64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .ok()
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_else(|| nanos.to_string())
}

impl fmt::Display for FieldData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldData::Null => write!(f, "NULL"),
            FieldData::Bool(b) => write!(f, "{b}"),
            FieldData::Int(v) => write!(f, "{v}"),
            FieldData::Float(v) => write!(f, "{}", format_float(*v)),
            FieldData::String(s) => write!(f, "{s}"),
            FieldData::Bytes(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            FieldData::DateTime(nanos) => write!(f, "{}", format_datetime(*nanos)),
            FieldData::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match item {
                        FieldData::String(s) => write!(f, "\"{s}\"")?,
                        other => write!(f, "{other}")?,
                    }
                }
                write!(f, "]")
            }
            FieldData::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match v {
                        FieldData::String(s) => write!(f, "{k}:\"{s}\"")?,
                        other => write!(f, "{k}:{other}")?,
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for FieldData {
    fn from(value: &str) -> Self {
        FieldData::String(value.to_owned())
    }
}

impl From<String> for FieldData {
    fn from(value: String) -> Self {
        FieldData::String(value)
    }
}

impl From<bool> for FieldData {
    fn from(value: bool) -> Self {
        FieldData::Bool(value)
    }
}

impl From<i64> for FieldData {
    fn from(value: i64) -> Self {
        FieldData::Int(value)
    }
}

impl From<f64> for FieldData {
    fn from(value: f64) -> Self {
        FieldData::Float(value)
    }
}

impl From<Vec<FieldData>> for FieldData {
    fn from(value: Vec<FieldData>) -> Self {
        FieldData::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_family_compares_across_int_and_float() {
        assert!(FieldData::Int(1).same_kind(&FieldData::Float(2.5)));
        assert_eq!(FieldData::Int(3).compare(&FieldData::Float(2.5)), Some(Ordering::Greater));
        assert!(FieldData::Int(1).loose_eq(&FieldData::Float(1.0)));
        assert_eq!(FieldData::Int(1).compare(&FieldData::from("1")), None);
    }

    #[test]
    fn total_order_puts_nulls_last() {
        let mut values = vec![
            FieldData::Null,
            FieldData::Int(5),
            FieldData::Float(1.5),
            FieldData::Int(-2),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                FieldData::Int(-2),
                FieldData::Float(1.5),
                FieldData::Int(5),
                FieldData::Null
            ]
        );
    }

    #[test]
    fn display_formats_composites() {
        let list = FieldData::Array(vec![FieldData::Int(1), FieldData::from("a")]);
        assert_eq!(list.to_string(), "[1,\"a\"]");
        assert_eq!(FieldData::Float(2.0).to_string(), "2.0");
        assert_eq!(FieldData::Null.render("__null__"), "__null__");
        assert_eq!(FieldData::DateTime(0).to_string(), "1970-01-01 00:00:00");
    }
}
