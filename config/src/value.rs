//! Tagged configuration values. Backends hand the validator loosely
//! typed values; the validator narrows them against the schema and may
//! substitute normalized forms.

use std::fmt;
use std::fmt::Display;

use sip::message::Uri;

/// Source tag of the defaults backend. `Unset` values from it mark
/// parameters that were never actually set and bypass type checking.
pub const DEFAULT_SOURCE: &str = "default";

#[derive(Clone, Debug)]
pub enum Value {
    /// Not actually set. Only meaningful from the defaults backend.
    Unset,
    Symbol(String),
    Int(i64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    /// Two-element rule, used by the regex rewrite and match types.
    Pair(Box<Value>, Box<Value>),
    /// A parsed SIP/SIPS URL, keeping the text it was parsed from.
    Url { raw: String, parsed: Uri },
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unset, Value::Unset) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Pair(a_lhs, a_rhs), Value::Pair(b_lhs, b_rhs)) => {
                a_lhs == b_lhs && a_rhs == b_rhs
            }
            // The text a URL was parsed from is not part of its
            // identity; the parsed form is canonical.
            (Value::Url { parsed: a, .. }, Value::Url { parsed: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }
}

impl Value {
    pub fn symbol(s: &str) -> Value {
        Value::Symbol(s.to_string())
    }

    pub fn str(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    pub fn pair(lhs: Value, rhs: Value) -> Value {
        Value::Pair(Box::new(lhs), Box::new(rhs))
    }

    /// Empty in the sense of the required-parameter check.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Value::Unset => true,
            Value::Str(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Unset => write!(f, "undefined"),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Pair(lhs, rhs) => write!(f, "{{{},{}}}", lhs, rhs),
            Value::Url { parsed, .. } => write!(f, "{}", parsed),
        }
    }
}

/// One runtime configuration value with the backend that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: Value,
    pub source: String,
}

impl Entry {
    pub fn new(key: &str, value: Value, source: &str) -> Entry {
        Entry {
            key: key.to_string(),
            value,
            source: source.to_string(),
        }
    }
}

/// An ordered configuration snapshot. Keys are not necessarily unique
/// across sources; merging is the backend's concern.
pub type Snapshot = Vec<Entry>;
