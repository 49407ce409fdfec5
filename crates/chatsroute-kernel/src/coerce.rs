//! Best-effort type coercion for extracted parameter values.
//!
//! [`coerce`] never fails: a value that cannot be converted to the requested
//! [`DataType`] degrades to the caller-supplied default.  This keeps a single
//! malformed entity from failing an otherwise successful match.
//!
//! | Target | Rule |
//! |--------|------|
//! | `Int` | longest run of ASCII digits (last run on a tie), parse as `i64` |
//! | `Float` | keep ASCII digits and `.`, parse as `f64` |
//! | `String` | text form of the value, always succeeds |
//! | `Bool` | `true` iff the text form is one of `true`, `1`, `yes`, `y` |
//! | `Json` | parse the text form as JSON |
//!
//! `Int` and `Float` work on the text form, so a JSON number and the same
//! number as a string coerce alike.  A `-` directly before the digits is a
//! sign when it opens the text or follows whitespace.
//!
//! # Example
//!
//! ```rust
//! # use chatsroute_kernel::coerce::{coerce, DataType, TypedValue};
//! # use serde_json::json;
//! let v = coerce(&json!("12-digit-card-999999999999"), DataType::Int, &TypedValue::Null);
//! assert_eq!(v, TypedValue::Int(999_999_999_999));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RouterError, Result};

/// Text forms accepted as `true` by the `Bool` rule (compared lowercased).
const TRUTHY: [&str; 4] = ["true", "1", "yes", "y"];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The semantic type a parameter is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[serde(alias = "integer")]
    Int,
    Float,
    #[serde(alias = "str")]
    String,
    #[serde(alias = "boolean")]
    Bool,
    /// Structural conversion: the text form is parsed as JSON.
    Json,
}

impl FromStr for DataType {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "string" | "str" => Ok(Self::String),
            "bool" | "boolean" => Ok(Self::Bool),
            "json" => Ok(Self::Json),
            other => Err(RouterError::config(format!("unknown data type `{other}`"))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// A parameter value after coercion.
///
/// `Null` stands for "no value" and is an acceptable default for every
/// [`DataType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Json(Value),
}

impl TypedValue {
    /// Whether this value may serve as the default of a field declared with
    /// `data_type`.
    pub fn is_representable_as(&self, data_type: DataType) -> bool {
        match (self, data_type) {
            (Self::Null, _) | (_, DataType::Json) => true,
            (Self::Int(_), DataType::Int | DataType::Float) => true,
            (Self::Float(_), DataType::Float) => true,
            (Self::Bool(_), DataType::Bool) => true,
            (Self::Str(_), DataType::String) => true,
            _ => false,
        }
    }

    /// The JSON rendering of this value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Str(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for TypedValue {
    /// Canonical text form.  `Null` renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::Json(v) => f.write_str(&text_form(v)),
        }
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Convert `value` to `target`, falling back to `default` when the value
/// cannot be represented.
///
/// The only rule that never consults `default` is `Bool`: unrecognised text
/// is simply `false`.
pub fn coerce(value: &Value, target: DataType, default: &TypedValue) -> TypedValue {
    let coerced = match target {
        DataType::Int => coerce_int(value),
        DataType::Float => coerce_float(value),
        DataType::String => Some(TypedValue::Str(text_form(value))),
        DataType::Bool => Some(TypedValue::Bool(coerce_bool(value))),
        DataType::Json => coerce_json(value),
    };

    match coerced {
        Some(v) => v,
        None => {
            tracing::trace!(target_type = %target, value = %value, "coercion fell back to default");
            default.clone()
        }
    }
}

/// The text form of a raw value.  `null` is the empty string; JSON strings
/// are taken without quotes; numbers never use exponent notation.
pub fn text_form(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(x) if !n.is_i64() && !n.is_u64() => format!("{x}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn coerce_int(value: &Value) -> Option<TypedValue> {
    let text = text_form(value);
    let (start, run) = longest_digit_run(&text)?;
    let signed = if is_negated(&text, start) {
        format!("-{run}")
    } else {
        run.to_string()
    };
    signed.parse::<i64>().ok().map(TypedValue::Int)
}

fn coerce_float(value: &Value) -> Option<TypedValue> {
    let text = text_form(value);
    let start = text.find(|c: char| c.is_ascii_digit() || c == '.')?;
    // Multiple decimal points are not special-cased: "1.2.3" fails to parse.
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let x = kept.parse::<f64>().ok()?;
    Some(TypedValue::Float(if is_negated(&text, start) { -x } else { x }))
}

/// Byte offset and text of the longest run of ASCII digits.  The last run
/// wins a tie.
fn longest_digit_run(text: &str) -> Option<(usize, &str)> {
    let mut best: Option<(usize, &str)> = None;
    let mut start = None;
    for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        if c.is_ascii_digit() {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            let run = &text[s..i];
            if best.is_none_or(|(_, b)| run.len() >= b.len()) {
                best = Some((s, run));
            }
        }
    }
    best
}

/// Whether the number starting at byte `start` carries a minus sign: a `-`
/// right before it that opens the text or follows whitespace.  The hyphen in
/// `card-42` is not a sign.
fn is_negated(text: &str, start: usize) -> bool {
    match text[..start].strip_suffix('-') {
        Some(rest) => rest.chars().next_back().is_none_or(char::is_whitespace),
        None => false,
    }
}

fn coerce_bool(value: &Value) -> bool {
    if let Some(b) = value.as_bool() {
        return b;
    }
    let text = text_form(value).to_lowercase();
    TRUTHY.contains(&text.as_str())
}

fn coerce_json(value: &Value) -> Option<TypedValue> {
    match value {
        Value::String(s) => serde_json::from_str(s).ok().map(TypedValue::Json),
        Value::Null => None,
        other => Some(TypedValue::Json(other.clone())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
