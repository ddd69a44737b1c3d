//! The `Stream`/`Op` vocabulary: an ordered, linear plan lowered from a
//! bound statement (spec.md §4.4).
//!
//! Grounded on the teacher's `sql::statements` lowering into a small,
//! closed operator vocabulary; collapsed here to the flat pipe-chain
//! spec.md §3 describes ("an ordered list of operators") rather than the
//! teacher's tree-shaped iterator graph, since this dialect has no joins.

use std::fmt;

use crate::ast::{ConflictAction, Expr};
use crate::err::{Error, Result};
use crate::key::IndexPredicate;

/// One column's worth of bound/range testing within a (possibly composite)
/// index scan. A `Vec<IndexRange>` in [`Op::IndexScan`] is the conjunction
/// of per-column predicates that together select one contiguous slice of
/// the index tree.
pub type IndexRange = Vec<IndexPredicate>;

fn render_ranges(ranges: &[IndexRange]) -> String {
	let parts: Vec<String> = ranges
		.iter()
		.map(|r| r.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", "))
		.collect();
	format!("[{}]", parts.join(", "))
}

/// An aggregator bound to its output column name, the form `Op::GroupAggregate`
/// carries (spec.md §4.3's "two life-stages": this is still the builder
/// stage — the accumulator lives in [`crate::exec::aggregate`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregator {
	pub call: crate::ast::AggregateCall,
	pub alias: String,
}

impl fmt::Display for Aggregator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} AS {}", self.call, self.alias)
	}
}

/// One stage of a [`Stream`]. Every variant's `Display` is its canonical
/// rendering (spec.md §4.4); stream equality is just `Vec<Op>` equality.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Op {
	// ---- source ------------------------------------------------------
	TableScan(String),
	IndexScan(String, Vec<IndexRange>),
	IndexScanReverse(String, Vec<IndexRange>),
	/// A virtual single-row source for `SELECT <expr>` with no `FROM`.
	RowsEmit(Vec<Expr>),
	Concat(Vec<Stream>),
	Union(Vec<Stream>),

	// ---- transform -----------------------------------------------------
	Filter(Expr),
	/// `(expression, output column name)` pairs, in projection order.
	Project(Vec<(Expr, String)>),
	TempTreeSort(Expr),
	TempTreeSortReverse(Expr),
	Skip(Expr),
	Take(Expr),
	GroupAggregate(Option<Expr>, Vec<Aggregator>),
	PathsSet(String, Expr),

	// ---- mutation --------------------------------------------------------
	TableValidate(String),
	TableInsert(String),
	TableReplace(String),
	TableDelete(String),
	TableGenerateKey(String),
	IndexDelete(String),
	IndexInsert(String),
	IndexValidate(String),
	OnConflict(ConflictAction),

	// ---- terminal --------------------------------------------------------
	Discard,
}

impl Op {
	/// Whether this op may legally appear at position 0 of a stream.
	pub fn is_source(&self) -> bool {
		matches!(
			self,
			Op::TableScan(_) | Op::IndexScan(..) | Op::IndexScanReverse(..) | Op::RowsEmit(_) | Op::Concat(_) | Op::Union(_)
		)
	}
}

impl fmt::Display for Op {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Op::TableScan(t) => write!(f, "table.Scan({t:?})"),
			Op::IndexScan(i, ranges) => write!(f, "index.Scan({i:?}, {})", render_ranges(ranges)),
			Op::IndexScanReverse(i, ranges) => write!(f, "index.ScanReverse({i:?}, {})", render_ranges(ranges)),
			Op::RowsEmit(exprs) => {
				write!(f, "rows.Emit(")?;
				write_exprs(f, exprs)?;
				write!(f, ")")
			}
			Op::Concat(streams) => write!(f, "Concat({})", join_streams(streams)),
			Op::Union(streams) => write!(f, "Union({})", join_streams(streams)),
			Op::Filter(e) => write!(f, "rows.Filter({e})"),
			Op::Project(items) => {
				write!(f, "rows.Project(")?;
				for (i, (e, alias)) in items.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					if e.to_string() == *alias {
						write!(f, "{e}")?;
					} else {
						write!(f, "{e} AS {alias}")?;
					}
				}
				write!(f, ")")
			}
			Op::TempTreeSort(e) => write!(f, "rows.TempTreeSort({e})"),
			Op::TempTreeSortReverse(e) => write!(f, "rows.TempTreeSortReverse({e})"),
			Op::Skip(e) => write!(f, "rows.Skip({e})"),
			Op::Take(e) => write!(f, "rows.Take({e})"),
			Op::GroupAggregate(group, aggs) => {
				write!(f, "rows.GroupAggregate(")?;
				let mut wrote = false;
				if let Some(g) = group {
					write!(f, "{g}")?;
					wrote = true;
				}
				for a in aggs {
					if wrote {
						write!(f, ", ")?;
					}
					write!(f, "{a}")?;
					wrote = true;
				}
				write!(f, ")")
			}
			Op::PathsSet(col, e) => write!(f, "paths.Set({col}, {e})"),
			Op::TableValidate(t) => write!(f, "table.Validate({t:?})"),
			Op::TableInsert(t) => write!(f, "table.Insert({t:?})"),
			Op::TableReplace(t) => write!(f, "table.Replace({t:?})"),
			Op::TableDelete(t) => write!(f, "table.Delete({t:?})"),
			Op::TableGenerateKey(t) => write!(f, "table.GenerateKey({t:?})"),
			Op::IndexDelete(i) => write!(f, "index.Delete({i:?})"),
			Op::IndexInsert(i) => write!(f, "index.Insert({i:?})"),
			Op::IndexValidate(i) => write!(f, "index.Validate({i:?})"),
			Op::OnConflict(action) => write!(f, "OnConflict({action:?})"),
			Op::Discard => write!(f, "discard()"),
		}
	}
}

fn write_exprs(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
	for (i, e) in exprs.iter().enumerate() {
		if i > 0 {
			write!(f, ", ")?;
		}
		write!(f, "{e}")?;
	}
	Ok(())
}

fn join_streams(streams: &[Stream]) -> String {
	streams.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
}

/// An ordered plan lowered from a bound statement. Read streams end at
/// their last transform; write streams end in [`Op::Discard`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stream {
	pub ops: Vec<Op>,
}

impl Stream {
	pub fn new() -> Self {
		Stream { ops: Vec::new() }
	}

	/// Starts a stream at a source operator.
	pub fn source(op: Op) -> Self {
		debug_assert!(op.is_source(), "{op} is not a valid source operator");
		Stream { ops: vec![op] }
	}

	/// Appends `op` at the tail, consuming and returning `self` for chaining.
	pub fn pipe(mut self, op: Op) -> Self {
		self.ops.push(op);
		self
	}

	pub fn push(&mut self, op: Op) {
		self.ops.push(op);
	}

	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}

	/// Whether this stream contains any op that mutates the store or
	/// advances a sequence (spec.md §3: "Read-only Streams never contain
	/// mutation or sequence-advancing ops").
	pub fn is_read_only(&self) -> bool {
		!self.ops.iter().any(|op| {
			matches!(
				op,
				Op::TableValidate(_)
					| Op::TableInsert(_)
					| Op::TableReplace(_)
					| Op::TableDelete(_)
					| Op::TableGenerateKey(_)
					| Op::IndexDelete(_)
					| Op::IndexInsert(_)
					| Op::IndexValidate(_)
					| Op::OnConflict(_)
					| Op::PathsSet(_, _)
			) || op_advances_sequence(op)
		})
	}

	/// Validates the structural invariants spec.md §3 states for a Stream:
	/// a source at position 0 (or none, for an empty stream under
	/// construction), `table.Validate` before any `table.Insert`/`Replace`,
	/// and `index.Delete` for an index before `index.Insert` for that same
	/// index.
	pub fn validate(&self) -> Result<()> {
		if let Some(first) = self.ops.first() {
			if !first.is_source() {
				return Err(Error::in_operator("stream validate", format!("{first} is not a valid source op")));
			}
		}
		let mut validated: std::collections::HashSet<&str> = std::collections::HashSet::new();
		let mut index_deleted: std::collections::HashSet<&str> = std::collections::HashSet::new();
		for (i, op) in self.ops.iter().enumerate() {
			if i > 0 && op.is_source() {
				return Err(Error::in_operator("stream validate", format!("{op} may only appear at position 0")));
			}
			match op {
				Op::TableValidate(t) => {
					validated.insert(t.as_str());
				}
				Op::TableInsert(t) | Op::TableReplace(t) => {
					if !validated.contains(t.as_str()) {
						return Err(Error::in_operator(
							"stream validate",
							format!("{op} with no preceding table.Validate(\"{t}\")"),
						));
					}
				}
				Op::IndexDelete(i) => {
					index_deleted.insert(i.as_str());
				}
				Op::IndexInsert(i) => {
					if !index_deleted.contains(i.as_str()) {
						return Err(Error::in_operator(
							"stream validate",
							format!("{op} with no preceding index.Delete(\"{i}\") for the same row"),
						));
					}
				}
				_ => {}
			}
		}
		Ok(())
	}
}

fn op_advances_sequence(op: &Op) -> bool {
	match op {
		Op::Filter(e) | Op::TempTreeSort(e) | Op::TempTreeSortReverse(e) | Op::Skip(e) | Op::Take(e) => e.advances_sequence(),
		Op::Project(items) => items.iter().any(|(e, _)| e.advances_sequence()),
		Op::RowsEmit(exprs) => exprs.iter().any(Expr::advances_sequence),
		_ => false,
	}
}

impl fmt::Display for Stream {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, op) in self.ops.iter().enumerate() {
			if i > 0 {
				write!(f, " | ")?;
			}
			write!(f, "{op}")?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ast::Value;

	#[test]
	fn canonical_rendering_joins_ops_with_pipes() {
		let s = Stream::source(Op::TableScan("t".into())).pipe(Op::Filter(Expr::Literal(Value::Bool(true))));
		assert_eq!(s.to_string(), "table.Scan(\"t\") | rows.Filter(true)");
	}

	#[test]
	fn index_scan_renders_the_scenario_5_predicate_shape() {
		let op = Op::IndexScan(
			"idx_a".into(),
			vec![vec![IndexPredicate::Range {
				min: Some((Value::Int(10), true)),
				max: None,
			}]],
		);
		assert_eq!(op.to_string(), "index.Scan(\"idx_a\", [{\"min\": (10), \"exclusive\": true}])");
	}

	#[test]
	fn paths_set_renders_bare_column_and_expression() {
		let op = Op::PathsSet("a".into(), Expr::Literal(Value::Int(10)));
		assert_eq!(op.to_string(), "paths.Set(a, 10)");
	}

	#[test]
	fn stream_rejects_a_source_op_mid_chain() {
		let s = Stream {
			ops: vec![Op::TableScan("t".into()), Op::TableScan("u".into())],
		};
		assert!(s.validate().is_err());
	}

	#[test]
	fn stream_rejects_insert_without_a_preceding_validate() {
		let s = Stream {
			ops: vec![Op::TableScan("t".into()), Op::TableInsert("t".into())],
		};
		assert!(s.validate().is_err());
	}

	#[test]
	fn stream_accepts_validate_before_insert() {
		let s = Stream {
			ops: vec![Op::TableScan("t".into()), Op::TableValidate("t".into()), Op::TableInsert("t".into())],
		};
		assert!(s.validate().is_ok());
	}

	#[test]
	fn read_only_stream_has_no_mutation_ops() {
		let s = Stream::source(Op::TableScan("t".into())).pipe(Op::Filter(Expr::Literal(Value::Bool(true))));
		assert!(s.is_read_only());
		let w = s.pipe(Op::TableValidate("t".into()));
		assert!(!w.is_read_only());
	}
}
