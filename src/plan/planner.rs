//! The rule-based optimizer (spec component C7): a pure `Stream -> Stream`
//! function applied to fix-point.
//!
//! Grounded on the teacher's `idx::planner::QueryPlanner`/`PlanBuilder`
//! (build a tree of candidate indexes, pick one per table by a fixed
//! tie-break, rewrite the iterator accordingly), collapsed from the
//! teacher's cost-free-but-statistics-aware index/range/KNN selection down
//! to spec.md §4.7's closed rule list: no statistics, no KNN, no full-text.

use std::cmp::Ordering;

use crate::ast::{BinaryOp, ColumnRef, Environment, Expr, Value};
use crate::catalog::{Catalog, IndexInfo};
use crate::err::Result;
use crate::key::IndexPredicate;

use super::stream::{IndexRange, Op, Stream};

/// Rewrites `stream` to a fix-point by repeatedly applying every rule in
/// spec.md §4.7 order. Deterministic: the same stream and catalog always
/// produce the same output (spec.md §4.7, "the planner must be
/// deterministic").
#[instrument(skip_all)]
pub fn optimize(stream: &Stream, catalog: &dyn Catalog) -> Stream {
	let mut current = optimize_nested(stream, catalog);
	loop {
		let mut next = current.clone();
		fold_constants(&mut next);
		split_conjunctions(&mut next);
		select_index(&mut next, catalog);
		select_index_for_sort(&mut next, catalog);
		elide_sort(&mut next, catalog);
		eliminate_dead_ops(&mut next);
		if next == current {
			trace!(ops = next.ops.len(), "planner reached a fix point");
			return next;
		}
		current = next;
	}
}

/// Recurses into `Concat`/`Union` sub-streams first, since each is its own
/// independent plan with its own source and candidate indexes.
fn optimize_nested(stream: &Stream, catalog: &dyn Catalog) -> Stream {
	let mut out = stream.clone();
	for op in &mut out.ops {
		match op {
			Op::Concat(streams) | Op::Union(streams) => {
				for s in streams.iter_mut() {
					*s = optimize(s, catalog);
				}
			}
			_ => {}
		}
	}
	out
}

// ---- rule 1: constant folding -------------------------------------------

/// Evaluates any sub-expression whose leaves are all literals (no column,
/// parameter, aggregate or sequence advance) down to a single literal.
/// Divide-by-zero and overflow are left as runtime failures, not folded
/// away (spec.md §4.7 rule 1).
fn fold_constants(stream: &mut Stream) {
	for op in &mut stream.ops {
		match op {
			Op::Filter(e) | Op::TempTreeSort(e) | Op::TempTreeSortReverse(e) | Op::Skip(e) | Op::Take(e) => {
				fold_expr(e);
			}
			Op::Project(items) => {
				for (e, _) in items {
					fold_expr(e);
				}
			}
			Op::RowsEmit(exprs) => {
				for e in exprs {
					fold_expr(e);
				}
			}
			Op::PathsSet(_, e) => fold_expr(e),
			_ => {}
		}
	}
}

struct ConstEnv;
impl Environment for ConstEnv {
	fn current_row(&self) -> Option<&crate::ast::Row> {
		None
	}
	fn positional_param(&self, _: u32) -> Result<Value> {
		Err(crate::err::Error::in_operator("constant fold", "not a constant"))
	}
	fn named_param(&self, _: &str) -> Result<Value> {
		Err(crate::err::Error::in_operator("constant fold", "not a constant"))
	}
	fn next_sequence_value(&self, _: &str) -> Result<Value> {
		Err(crate::err::Error::in_operator("constant fold", "not a constant"))
	}
}

/// Whether `expr` is eligible for folding at all: no column reference, no
/// aggregate, no sequence advance (those can only ever evaluate at
/// execution time, against a real row/transaction).
fn is_foldable(expr: &Expr) -> bool {
	let mut foldable = true;
	expr.walk(&mut |e| {
		if matches!(e, Expr::Column(_) | Expr::Aggregate(_) | Expr::NextValueFor(_)) {
			foldable = false;
			crate::ast::Walk::Stop
		} else {
			crate::ast::Walk::Continue
		}
	});
	foldable
}

fn fold_expr(expr: &mut Expr) {
	match expr {
		Expr::Literal(_) | Expr::Column(_) | Expr::PositionalParam(_) | Expr::NamedParam(_) | Expr::Wildcard | Expr::NextValueFor(_) => {}
		Expr::Not(e) | Expr::Neg(e) | Expr::Cast(e, _) | Expr::Paren(e) => fold_expr(e),
		Expr::Binary(_, l, r) => {
			fold_expr(l);
			fold_expr(r);
		}
		Expr::Between { expr, low, high, .. } => {
			fold_expr(expr);
			fold_expr(low);
			fold_expr(high);
		}
		Expr::In { expr, list, .. } => {
			fold_expr(expr);
			for e in list {
				fold_expr(e);
			}
		}
		Expr::Is { expr, value, .. } => {
			fold_expr(expr);
			fold_expr(value);
		}
		Expr::Function { args, .. } => {
			for a in args.iter_mut() {
				fold_expr(a);
			}
		}
		Expr::Aggregate(call) => {
			if let Some(e) = &mut call.arg {
				fold_expr(e);
			}
		}
	}
	if is_foldable(expr) {
		if let Ok(v) = expr.evaluate(&ConstEnv) {
			*expr = Expr::Literal(v);
		}
	}
}

// ---- rule 2: predicate splitting -----------------------------------------

/// Rewrites `Filter(a AND b)` to `Filter(a) | Filter(b)`, recursively, so
/// index selection can consider each conjunct independently.
fn split_conjunctions(stream: &mut Stream) {
	let mut out = Vec::with_capacity(stream.ops.len());
	for op in stream.ops.drain(..) {
		if let Op::Filter(e) = op {
			let mut conjuncts = Vec::new();
			flatten_and(e, &mut conjuncts);
			out.extend(conjuncts.into_iter().map(Op::Filter));
		} else {
			out.push(op);
		}
	}
	stream.ops = out;
}

fn flatten_and(expr: Expr, out: &mut Vec<Expr>) {
	match expr {
		Expr::Binary(BinaryOp::And, l, r) => {
			flatten_and(*l, out);
			flatten_and(*r, out);
		}
		Expr::Paren(inner) => flatten_and(*inner, out),
		other => out.push(other),
	}
}

// ---- rules 3 & 4: index selection (unique pkey index included) ----------

enum ColumnMatch {
	Eq(Value),
	Range(Option<(Value, bool)>, Option<(Value, bool)>),
	InList(Vec<Value>),
}

/// Matches `expr` as a comparison between `column` and a literal, in either
/// operand order, folding the comparison direction when the column is on
/// the right.
fn match_column_predicate(expr: &Expr, column: &str) -> Option<ColumnMatch> {
	match expr {
		Expr::Binary(op, l, r) => {
			let (col, lit, flipped) = match (l.as_ref(), r.as_ref()) {
				(Expr::Column(c), Expr::Literal(v)) if c.name.eq_ignore_ascii_case(column) => (c, v, false),
				(Expr::Literal(v), Expr::Column(c)) if c.name.eq_ignore_ascii_case(column) => (c, v, true),
				_ => return None,
			};
			let _ = col;
			let op = if flipped { flip(*op) } else { *op };
			match op {
				BinaryOp::Eq => Some(ColumnMatch::Eq(lit.clone())),
				BinaryOp::Lt => Some(ColumnMatch::Range(None, Some((lit.clone(), true)))),
				BinaryOp::Lte => Some(ColumnMatch::Range(None, Some((lit.clone(), false)))),
				BinaryOp::Gt => Some(ColumnMatch::Range(Some((lit.clone(), true)), None)),
				BinaryOp::Gte => Some(ColumnMatch::Range(Some((lit.clone(), false)), None)),
				_ => None,
			}
		}
		Expr::In { expr, list, negated: false } => {
			if let Expr::Column(c) = expr.as_ref() {
				if c.name.eq_ignore_ascii_case(column) {
					let values: Option<Vec<Value>> = list
						.iter()
						.map(|e| match e {
							Expr::Literal(v) => Some(v.clone()),
							_ => None,
						})
						.collect();
					return values.map(ColumnMatch::InList);
				}
			}
			None
		}
		_ => None,
	}
}

fn flip(op: BinaryOp) -> BinaryOp {
	match op {
		BinaryOp::Lt => BinaryOp::Gt,
		BinaryOp::Lte => BinaryOp::Gte,
		BinaryOp::Gt => BinaryOp::Lt,
		BinaryOp::Gte => BinaryOp::Lte,
		other => other,
	}
}

/// Tries to match every column of `index`, in order, against an unused
/// filter in `filters`. Equality may appear at any matched column; a range
/// or `IN`-list may only appear at the last column matched, since a
/// composite index only stays ordered by trailing columns once every
/// leading column is pinned to a single value (spec.md §4.7 rule 3,
/// "composite indexes match when an equality on the first column is
/// paired with equality or range on the next columns, in order").
fn try_match_index(index: &IndexInfo, filters: &[Expr]) -> Option<(Vec<usize>, Vec<IndexRange>)> {
	let mut consumed = Vec::new();
	let mut conjunction = Vec::new();
	let mut in_list: Option<Vec<Value>> = None;
	for (i, column) in index.columns.iter().enumerate() {
		let is_last = i + 1 == index.columns.len();
		let found = filters
			.iter()
			.enumerate()
			.filter(|(idx, _)| !consumed.contains(idx))
			.find_map(|(idx, e)| match_column_predicate(e, column).map(|m| (idx, m)));
		let Some((idx, m)) = found else { break };
		match m {
			ColumnMatch::Eq(v) => {
				consumed.push(idx);
				conjunction.push(IndexPredicate::Eq(v));
			}
			ColumnMatch::Range(min, max) => {
				consumed.push(idx);
				conjunction.push(IndexPredicate::Range { min, max });
				break;
			}
			ColumnMatch::InList(values) => {
				if !is_last || !conjunction.is_empty() {
					break;
				}
				consumed.push(idx);
				in_list = Some(values);
				break;
			}
		}
	}
	if conjunction.is_empty() && in_list.is_none() {
		return None;
	}
	let ranges = match in_list {
		Some(values) => values.into_iter().map(|v| vec![IndexPredicate::Eq(v)]).collect(),
		None => vec![conjunction],
	};
	Some((consumed, ranges))
}

/// Rank used to break ties between two candidate indexes that both match:
/// prefer unique, then fewer columns, then lexicographic name (spec.md
/// §4.7 rule 3). Lower ranks win.
fn index_rank(index: &IndexInfo) -> (u8, usize, &str) {
	(if index.unique { 0 } else { 1 }, index.columns.len(), index.name.as_str())
}

fn select_index(stream: &mut Stream, catalog: &dyn Catalog) {
	let Some(Op::TableScan(table)) = stream.ops.first().cloned() else { return };
	let filter_end = stream.ops[1..].iter().take_while(|op| matches!(op, Op::Filter(_))).count() + 1;
	if filter_end == 1 {
		return;
	}
	let filters: Vec<Expr> = stream.ops[1..filter_end]
		.iter()
		.map(|op| match op {
			Op::Filter(e) => e.clone(),
			_ => unreachable!(),
		})
		.collect();

	let mut best: Option<(&IndexInfo, Vec<usize>, Vec<IndexRange>)> = None;
	for index in catalog.list_indexes(&table) {
		if let Some((consumed, ranges)) = try_match_index(index, &filters) {
			let better = match &best {
				None => true,
				Some((b, ..)) => index_rank(index).cmp(&index_rank(b)) == Ordering::Less,
			};
			if better {
				best = Some((index, consumed, ranges));
			}
		}
	}

	if let Some((index, consumed, ranges)) = best {
		debug!(table = %table, index = %index.name, "selected index scan over table scan");
		let mut new_ops = Vec::with_capacity(stream.ops.len());
		new_ops.push(Op::IndexScan(index.name.clone(), ranges));
		for (i, op) in stream.ops[1..filter_end].iter().enumerate() {
			if !consumed.contains(&i) {
				new_ops.push(op.clone());
			}
		}
		new_ops.extend(stream.ops[filter_end..].iter().cloned());
		stream.ops = new_ops;
	}
}

// ---- rule 5: sort elision -------------------------------------------------

/// When no predicate gave rule 3 an index to select (the source is still a
/// plain table scan) but the stream carries an `ORDER BY` over a column
/// that leads some index on the table, scans that index directly in the
/// matching direction instead of leaving a temp-tree sort to run after a
/// full table scan. Spec.md §4.7 rule 5's elision holds regardless of
/// whether a `WHERE` clause happened to pick the index first; this is the
/// other way an index ends up chosen for the same rule. `elide_sort`,
/// running right after this in the same fix-point pass, then drops the
/// now-redundant `TempTreeSort`/`TempTreeSortReverse` op.
fn select_index_for_sort(stream: &mut Stream, catalog: &dyn Catalog) {
	let Some(Op::TableScan(table)) = stream.ops.first().cloned() else { return };
	let Some(sort_op) = stream.ops[1..]
		.iter()
		.find(|op| matches!(op, Op::TempTreeSort(Expr::Column(_)) | Op::TempTreeSortReverse(Expr::Column(_))))
	else {
		return;
	};
	let (sort_col, reverse) = match sort_op {
		Op::TempTreeSort(Expr::Column(ColumnRef { name, .. })) => (name.as_str(), false),
		Op::TempTreeSortReverse(Expr::Column(ColumnRef { name, .. })) => (name.as_str(), true),
		_ => unreachable!(),
	};

	let mut best: Option<&IndexInfo> = None;
	for index in catalog.list_indexes(&table) {
		let Some(leading) = index.columns.first() else { continue };
		if !leading.eq_ignore_ascii_case(sort_col) {
			continue;
		}
		let better = match best {
			None => true,
			Some(b) => index_rank(index).cmp(&index_rank(b)) == Ordering::Less,
		};
		if better {
			best = Some(index);
		}
	}

	if let Some(index) = best {
		debug!(table = %table, index = %index.name, "selected index scan to satisfy an order by with no matching filter");
		stream.ops[0] = if reverse {
			Op::IndexScanReverse(index.name.clone(), Vec::new())
		} else {
			Op::IndexScan(index.name.clone(), Vec::new())
		};
	}
}

fn flip_scan(op: Op) -> Op {
	match op {
		Op::IndexScan(name, ranges) => Op::IndexScanReverse(name, ranges),
		Op::IndexScanReverse(name, ranges) => Op::IndexScan(name, ranges),
		other => other,
	}
}

/// Elides `ORDER BY col [DESC]` when an index already chosen for the scan
/// is already ordered by `col` (possibly in reverse), flipping the scan
/// direction instead of buffering through a temp-tree sort (spec.md §4.7
/// rule 5).
fn elide_sort(stream: &mut Stream, catalog: &dyn Catalog) {
	let (index_name, currently_reversed) = match stream.ops.first() {
		Some(Op::IndexScan(name, _)) => (name.clone(), false),
		Some(Op::IndexScanReverse(name, _)) => (name.clone(), true),
		_ => return,
	};
	let Some(index) = catalog.get_index(&index_name) else { return };
	let Some(leading) = index.columns.first() else { return };

	for i in 1..stream.ops.len() {
		match &stream.ops[i] {
			Op::Filter(_) | Op::Project(_) => continue,
			Op::TempTreeSort(Expr::Column(ColumnRef { name, .. })) if name.eq_ignore_ascii_case(leading) => {
				if !currently_reversed {
					stream.ops.remove(i);
				} else {
					stream.ops.remove(i);
					stream.ops[0] = flip_scan(stream.ops[0].clone());
				}
				return;
			}
			Op::TempTreeSortReverse(Expr::Column(ColumnRef { name, .. })) if name.eq_ignore_ascii_case(leading) => {
				if currently_reversed {
					stream.ops.remove(i);
				} else {
					stream.ops.remove(i);
					stream.ops[0] = flip_scan(stream.ops[0].clone());
				}
				return;
			}
			_ => return,
		}
	}
}

// ---- rule 7: dead-op elimination -------------------------------------------

/// Removes `Skip(0)` and `Filter(TRUE)`; `Take(∞)` never materializes in
/// this crate's lowering (an absent `LIMIT` simply omits the `Take` op
/// entirely), so there is nothing to eliminate for it here.
fn eliminate_dead_ops(stream: &mut Stream) {
	stream.ops.retain(|op| {
		!matches!(
			op,
			Op::Filter(Expr::Literal(Value::Bool(true))) | Op::Skip(Expr::Literal(Value::Int(0)))
		)
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ast::{ColumnDef, ColumnOption, ColumnType, TableConstraint};
	use crate::catalog::{CatalogWriter, IndexInfo, TableInfo};
	use crate::kvs::Datastore;

	fn col(name: &str) -> Expr {
		Expr::Column(ColumnRef { name: name.into(), table: Some("test".into()) })
	}

	fn lit(v: i64) -> Expr {
		Expr::Literal(Value::Int(v))
	}

	fn with_indexed_table(f: impl FnOnce(&dyn Catalog)) {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(TableInfo {
			name: "test".into(),
			columns: vec![
				ColumnDef { name: "pk".into(), ty: ColumnType::Int, options: vec![ColumnOption::PrimaryKey] },
				ColumnDef { name: "a".into(), ty: ColumnType::Int, options: vec![] },
			],
			constraints: vec![],
		})
		.unwrap();
		tx.create_index(IndexInfo {
			name: "idx_a".into(),
			table: "test".into(),
			columns: vec!["a".into()],
			unique: false,
			is_primary_key: false,
		})
		.unwrap();
		f(&tx);
	}

	#[test]
	fn index_selection_replaces_scan_and_removes_the_matched_filter() {
		with_indexed_table(|cat| {
			let stream = Stream::source(Op::TableScan("test".into()))
				.pipe(Op::Filter(Expr::Binary(BinaryOp::Gt, Box::new(col("a")), Box::new(lit(10)))));
			let optimized = optimize(&stream, cat);
			assert_eq!(
				optimized.to_string(),
				"index.Scan(\"idx_a\", [{\"min\": (10), \"exclusive\": true}])"
			);
		});
	}

	#[test]
	fn unmatched_filter_is_left_in_place_after_an_unrelated_index_scan() {
		with_indexed_table(|cat| {
			let stream = Stream::source(Op::TableScan("test".into())).pipe(Op::Filter(Expr::Binary(
				BinaryOp::Eq,
				Box::new(col("pk")),
				Box::new(lit(1)),
			)));
			let optimized = optimize(&stream, cat);
			assert!(optimized.to_string().starts_with("index.Scan(\"test_pkey\""));
		});
	}

	#[test]
	fn predicate_splitting_separates_a_top_level_and() {
		let mut stream = Stream::source(Op::TableScan("test".into())).pipe(Op::Filter(Expr::Binary(
			BinaryOp::And,
			Box::new(Expr::Binary(BinaryOp::Gt, Box::new(col("a")), Box::new(lit(1)))),
			Box::new(Expr::Binary(BinaryOp::Lt, Box::new(col("a")), Box::new(lit(9)))),
		)));
		split_conjunctions(&mut stream);
		assert_eq!(stream.ops.len(), 3);
	}

	#[test]
	fn constant_folding_reduces_a_pure_literal_expression() {
		let mut e = Expr::Binary(BinaryOp::Add, Box::new(lit(2)), Box::new(lit(3)));
		fold_expr(&mut e);
		assert_eq!(e, Expr::Literal(Value::Int(5)));
	}

	#[test]
	fn dead_filter_true_is_eliminated() {
		let mut stream = Stream::source(Op::TableScan("test".into())).pipe(Op::Filter(Expr::Literal(Value::Bool(true))));
		eliminate_dead_ops(&mut stream);
		assert_eq!(stream.ops.len(), 1);
	}

	#[test]
	fn optimize_is_idempotent() {
		with_indexed_table(|cat| {
			let stream = Stream::source(Op::TableScan("test".into()))
				.pipe(Op::Filter(Expr::Binary(BinaryOp::Eq, Box::new(col("a")), Box::new(lit(5)))));
			let once = optimize(&stream, cat);
			let twice = optimize(&once, cat);
			assert_eq!(once, twice);
		});
	}

	#[test]
	fn sort_elision_flips_ascending_scan_to_reverse_for_order_by_desc() {
		with_indexed_table(|cat| {
			let stream = Stream::source(Op::IndexScan("idx_a".into(), vec![vec![]]))
				.pipe(Op::TempTreeSortReverse(col("a")));
			let optimized = optimize(&stream, cat);
			assert_eq!(optimized.ops.len(), 1);
			assert!(matches!(optimized.ops[0], Op::IndexScanReverse(..)));
		});
	}

	#[test]
	fn order_by_with_no_filter_still_elides_to_an_index_scan() {
		with_indexed_table(|cat| {
			let stream = Stream::source(Op::TableScan("test".into())).pipe(Op::TempTreeSortReverse(col("a")));
			let optimized = optimize(&stream, cat);
			assert_eq!(optimized.ops.len(), 1);
			assert!(matches!(optimized.ops[0], Op::IndexScanReverse(ref name, ref ranges) if name == "idx_a" && ranges.is_empty()));
		});
	}
}
