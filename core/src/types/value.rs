use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar or array value read from a candidate or carried by a constraint
///
/// Values compare loosely: numbers and numeric text are interchangeable,
/// booleans match their `"true"`/`"false"` spelling, and lists compare as
/// sets. This mirrors how DICOM attributes arrive in practice, where the
/// same field may be delivered as an IS string or as a parsed number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Coerces the value to a number
    ///
    /// Text is trimmed and parsed, booleans become 1 or 0, and a single-element
    /// list yields its element. Anything else has no numeric form.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse::<f64>().ok(),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::List(items) if items.len() == 1 => items[0].as_number(),
            AttributeValue::List(_) => None,
        }
    }

    /// Returns the text form of a scalar value
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttributeValue::List(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Returns true for lists
    pub fn is_list(&self) -> bool {
        matches!(self, AttributeValue::List(_))
    }

    /// Converts to JSON; integral numbers become JSON integers
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serde_json::Value::from(*n as i64)
            }
            AttributeValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::Text(s) => serde_json::Value::String(s.clone()),
            AttributeValue::List(items) => {
                serde_json::Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
        }
    }

    /// Loose equality used by the `equals` constraint
    ///
    /// Lists are compared as sets, so `["P", "L"]` equals `["L", "P"]`. A
    /// scalar equals a non-empty list whose every element equals the scalar.
    pub fn loosely_equals(&self, other: &AttributeValue) -> bool {
        use AttributeValue::*;

        match (self, other) {
            (List(a), List(b)) => {
                a.iter().all(|x| b.iter().any(|y| x.loosely_equals(y)))
                    && b.iter().all(|y| a.iter().any(|x| x.loosely_equals(y)))
            }
            (List(items), scalar) | (scalar, List(items)) => {
                !items.is_empty() && items.iter().all(|x| x.loosely_equals(scalar))
            }
            (Number(a), Number(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Number(n), Text(t)) | (Text(t), Number(n)) => {
                t.trim().parse::<f64>().map(|v| v == *n).unwrap_or(false)
            }
            (Bool(b), Text(t)) | (Text(t), Bool(b)) => {
                t.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" })
            }
            (Bool(_), Number(_)) | (Number(_), Bool(_)) => false,
        }
    }

    /// Containment used by the `contains` family of constraints
    ///
    /// - List values: membership test against each element
    /// - Scalar values: substring test on the text form
    /// - List needles: passes when any needle is contained
    pub fn contains(&self, needle: &AttributeValue, case_insensitive: bool) -> bool {
        if let AttributeValue::List(needles) = needle {
            return needles.iter().any(|n| self.contains(n, case_insensitive));
        }

        match self {
            AttributeValue::List(items) => items.iter().any(|item| {
                item.loosely_equals(needle)
                    || (case_insensitive && text_eq_ignore_case(item, needle))
            }),
            scalar => {
                let (Some(haystack), Some(needle)) = (scalar.as_text(), needle.as_text()) else {
                    return false;
                };
                if case_insensitive {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                } else {
                    haystack.contains(&needle)
                }
            }
        }
    }
}

fn text_eq_ignore_case(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a.as_text(), b.as_text()) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => false,
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => write!(f, "{}", s),
            AttributeValue::List(items) => {
                // DICOM multi-value separator
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        AttributeValue::Number(n as f64)
    }
}

impl From<u32> for AttributeValue {
    fn from(n: u32) -> Self {
        AttributeValue::Number(n as f64)
    }
}

impl From<usize> for AttributeValue {
    fn from(n: usize) -> Self {
        AttributeValue::Number(n as f64)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(items: Vec<T>) -> Self {
        AttributeValue::List(items.into_iter().map(Into::into).collect())
    }
}
