//! Typed key/value pairs handed to the metric renderer.
//!
//! A metric is a name plus an ordered list of [`NamedParam`]s. Keeping the
//! value type alongside the key lets each backend quote and format values
//! without guessing from text.

use std::fmt;

use serde_json::Value;

// ── FieldValue ────────────────────────────────────────────────────────────────

/// A single metric value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl FieldValue {
    /// Convert to a JSON value.
    ///
    /// JSON has no literal for NaN or infinities, so non-finite floats are
    /// carried as the strings produced by [`format_float`].
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(format_float(*f))),
        }
    }
}

/// Unquoted textual form of the value.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => f.write_str(&format_float(*v)),
        }
    }
}

// ── NamedParam ────────────────────────────────────────────────────────────────

/// One key of a metric record together with its typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedParam {
    pub key: String,
    pub value: FieldValue,
}

impl NamedParam {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Str(value.into()),
        }
    }

    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Int(value),
        }
    }

    pub fn float(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Float(value),
        }
    }
}

// ── Projection ────────────────────────────────────────────────────────────────

/// Project `items` onto the keys in `order`, preserving the order of `order`.
///
/// For every requested key, all items carrying that key are returned in their
/// original relative order. Requested keys with no matching item are skipped.
pub fn select_ordered<'a, T, K, F>(items: &'a [T], order: &[K], key_of: F) -> Vec<&'a T>
where
    K: AsRef<str>,
    F: Fn(&T) -> &str,
{
    let key_of = &key_of;
    order
        .iter()
        .flat_map(|wanted| {
            let wanted = wanted.as_ref();
            items.iter().filter(move |item| key_of(*item) == wanted)
        })
        .collect()
}

/// [`select_ordered`] specialised to metric parameters.
pub fn select_fields<'a, K: AsRef<str>>(
    params: &'a [NamedParam],
    order: &[K],
) -> Vec<&'a NamedParam> {
    select_ordered(params, order, |p| p.key.as_str())
}

// ── Formatting ────────────────────────────────────────────────────────────────

/// Format a float with six decimal places.
///
/// Non-finite values become `NaN`, `+Inf` or `-Inf`.
///
/// # Examples
///
/// ```
/// use txnstat_core::fields::format_float;
///
/// assert_eq!(format_float(10.0), "10.000000");
/// assert_eq!(format_float(f64::INFINITY), "+Inf");
/// assert_eq!(format_float(f64::NAN), "NaN");
/// ```
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else {
        format!("{:.6}", value)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
