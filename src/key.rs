//! Order-preserving key encoding used by [`crate::kvs`]'s table and index
//! trees.
//!
//! Grounded on the teacher's `key` module, which turns typed identifiers
//! into byte keys that sort the way the corresponding SQL values do;
//! scoped down to this crate's closed [`crate::ast::Value`] set and backed
//! by `storekey` (an order-preserving `serde` serializer) instead of the
//! teacher's bespoke `revision`-versioned format.

use crate::ast::Value;
use crate::err::{Error, Result};

pub type Bytes = Vec<u8>;

/// Encodes a tuple of values (a primary key, or the leading columns of an
/// index key) into bytes whose unsigned lexicographic order matches
/// [`Value::cmp_for_order`] over the tuple. Used both to build the row key
/// under `table.Insert`/`Replace`/`Delete` and the key prefix under
/// `index.Insert`/`Delete`/`Scan`.
pub fn encode(values: &[Value]) -> Result<Bytes> {
	storekey::serialize(values).map_err(|e| Error::in_operator("key encode", e))
}

/// The inverse of [`encode`], used when an index scan needs to recover the
/// indexed column values for a row it already found (debugging/EXPLAIN
/// only — ordinary scans look the row up by the primary key that rides
/// alongside the index entry, not by decoding the index key itself).
pub fn decode(bytes: &[u8]) -> Result<Vec<Value>> {
	storekey::deserialize(bytes).map_err(|e| Error::in_operator("key decode", e))
}

/// Encodes a row's values for storage as a table's value payload. Unlike
/// [`encode`], this has no ordering requirement, so it uses plain `bincode`
/// rather than `storekey`'s order-preserving format — the executor (spec
/// component C8) is the only caller, for `table.Insert`/`Replace`/`Scan`.
pub fn encode_row(values: &[Value]) -> Result<Bytes> {
	bincode::serialize(values).map_err(|e| Error::in_operator("row encode", e))
}

/// The inverse of [`encode_row`].
pub fn decode_row(bytes: &[u8]) -> Result<Vec<Value>> {
	bincode::deserialize(bytes).map_err(|e| Error::in_operator("row decode", e))
}

/// One bound test used in an [`crate::plan::stream::IndexRange`]: matches
/// an encoded tuple by the subset of values known at plan time, in column
/// order.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexPredicate {
	Eq(Value),
	Range {
		min: Option<(Value, bool)>,
		max: Option<(Value, bool)>,
	},
}

impl std::fmt::Display for IndexPredicate {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			IndexPredicate::Eq(v) => write!(f, "{{\"eq\": ({v})}}"),
			IndexPredicate::Range { min, max } => {
				write!(f, "{{")?;
				let mut wrote = false;
				if let Some((v, excl)) = min {
					write!(f, "\"min\": ({v})")?;
					if *excl {
						write!(f, ", \"exclusive\": true")?;
					}
					wrote = true;
				}
				if let Some((v, excl)) = max {
					if wrote {
						write!(f, ", ")?;
					}
					write!(f, "\"max\": ({v})")?;
					if *excl {
						write!(f, ", \"exclusive\": true")?;
					}
				}
				write!(f, "}}")
			}
		}
	}
}

impl IndexPredicate {
	/// Whether `value` (the value found at this predicate's column in a
	/// candidate row) satisfies the predicate.
	pub fn matches(&self, value: &Value) -> bool {
		match self {
			IndexPredicate::Eq(v) => value == v,
			IndexPredicate::Range { min, max } => {
				if let Some((v, excl)) = min {
					let ord = value.cmp_for_order(v);
					if ord == std::cmp::Ordering::Less || (*excl && ord == std::cmp::Ordering::Equal) {
						return false;
					}
				}
				if let Some((v, excl)) = max {
					let ord = value.cmp_for_order(v);
					if ord == std::cmp::Ordering::Greater || (*excl && ord == std::cmp::Ordering::Equal) {
						return false;
					}
				}
				true
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encode_preserves_integer_order() {
		let a = encode(&[Value::Int(1)]).unwrap();
		let b = encode(&[Value::Int(2)]).unwrap();
		assert!(a < b);
	}

	#[test]
	fn encode_preserves_text_order() {
		let a = encode(&[Value::Text("apple".into())]).unwrap();
		let b = encode(&[Value::Text("banana".into())]).unwrap();
		assert!(a < b);
	}

	#[test]
	fn range_predicate_respects_exclusivity() {
		let p = IndexPredicate::Range {
			min: Some((Value::Int(10), true)),
			max: None,
		};
		assert!(!p.matches(&Value::Int(10)));
		assert!(p.matches(&Value::Int(11)));
	}
}
