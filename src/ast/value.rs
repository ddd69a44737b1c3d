//! The value model expressions evaluate to and rows are made of.
//!
//! Kept deliberately small relative to the teacher's `sql::value::Value`
//! (which also carries documents, geometry, durations, record links...):
//! spec.md's data model is a closed set of scalar SQL types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
	Blob(Vec<u8>),
}

impl Value {
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Null => "NULL",
			Value::Bool(_) => "BOOL",
			Value::Int(_) => "INT",
			Value::Float(_) => "FLOAT",
			Value::Text(_) => "TEXT",
			Value::Blob(_) => "BLOB",
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	/// SQL truthiness used by `WHERE`/`Filter`: `NULL` and `0`/`0.0`/`false`
	/// are not truthy, everything else (including non-empty/empty text) is.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Null => false,
			Value::Bool(b) => *b,
			Value::Int(n) => *n != 0,
			Value::Float(n) => *n != 0.0,
			Value::Text(_) | Value::Blob(_) => true,
		}
	}

	/// Coerces to an `i64`, used by `Skip`/`Take`/`LIMIT`/`OFFSET` operands,
	/// which spec.md requires be non-negative integers.
	pub fn as_non_negative_int(&self) -> Option<i64> {
		let n = match self {
			Value::Int(n) => *n,
			Value::Float(f) if f.fract() == 0.0 => *f as i64,
			_ => return None,
		};
		(n >= 0).then_some(n)
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int(n) => Some(*n as f64),
			Value::Float(n) => Some(*n),
			_ => None,
		}
	}

	/// Total order used by `TempTreeSort`: `NULL` sorts first, then by type
	/// group, then by value. Ties are broken by the caller (insertion order)
	/// to keep the sort stable, matching spec.md's "ties break by insertion
	/// order" requirement.
	pub fn cmp_for_order(&self, other: &Value) -> Ordering {
		fn rank(v: &Value) -> u8 {
			match v {
				Value::Null => 0,
				Value::Bool(_) => 1,
				Value::Int(_) | Value::Float(_) => 2,
				Value::Text(_) => 3,
				Value::Blob(_) => 4,
			}
		}
		match (self, other) {
			(Value::Null, Value::Null) => Ordering::Equal,
			(Value::Bool(a), Value::Bool(b)) => a.cmp(b),
			(Value::Int(a), Value::Int(b)) => a.cmp(b),
			(Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
			(Value::Int(a), Value::Float(b)) => {
				(*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
			}
			(Value::Float(a), Value::Int(b)) => {
				a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
			}
			(Value::Text(a), Value::Text(b)) => a.cmp(b),
			(Value::Blob(a), Value::Blob(b)) => a.cmp(b),
			_ => rank(self).cmp(&rank(other)),
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => write!(f, "NULL"),
			Value::Bool(b) => write!(f, "{b}"),
			Value::Int(n) => write!(f, "{n}"),
			Value::Float(n) => write!(f, "{n}"),
			Value::Text(s) => write!(f, "{s:?}"),
			Value::Blob(b) => {
				write!(f, "x'")?;
				for byte in b {
					write!(f, "{byte:02x}")?;
				}
				write!(f, "'")
			}
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => a == b,
			(Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
				(*a as f64) == *b
			}
			(Value::Text(a), Value::Text(b)) => a == b,
			(Value::Blob(a), Value::Blob(b)) => a == b,
			_ => false,
		}
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}
impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Float(v)
	}
}
impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}
impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Text(v)
	}
}
impl From<Vec<u8>> for Value {
	fn from(v: Vec<u8>) -> Self {
		Value::Blob(v)
	}
}
