//! Classifies `SELECT` projections against a `GROUP BY` list.
//!
//! spec.md's grouping rule matches a projection expression against the
//! `GROUP BY` list by its canonical string form (`Display`), not by
//! structural `Expr` equality — so `GROUP BY a + 1` matches a projection of
//! `a + 1` even though the two were parsed as separate trees. Anything
//! left over that isn't wrapped in an aggregate is an ungrouped-column
//! error, which the binder raises.

use super::expr::{AggregateCall, Expr, Walk};
use super::query::SelectCore;

#[derive(Clone, Debug, PartialEq)]
pub enum Classification<'e> {
	/// Matches one of the `GROUP BY` expressions verbatim.
	GroupKey,
	/// Contains no aggregate and doesn't match any `GROUP BY` key —
	/// invalid whenever grouping is in effect.
	Ungrouped(&'e Expr),
	/// Every aggregate call found inside the projection, in the order
	/// they need accumulators allocated.
	Aggregated(Vec<&'e AggregateCall>),
}

/// The shape a `SELECT ... GROUP BY` statement binds to: the list of key
/// expressions (by canonical string) and, per projection, whether it's a
/// key, an aggregate, or invalid.
pub fn classify(core: &SelectCore) -> Vec<Classification<'_>> {
	let keys: Vec<String> = core.group_by.iter().map(Expr::to_string).collect();
	core.projections
		.iter()
		.map(|(expr, _)| classify_one(expr, &keys))
		.collect()
}

fn classify_one<'e>(expr: &'e Expr, keys: &[String]) -> Classification<'e> {
	if keys.iter().any(|k| *k == expr.to_string()) {
		return Classification::GroupKey;
	}
	let mut aggregates = Vec::new();
	expr.walk(&mut |e| {
		if let Expr::Aggregate(call) = e {
			aggregates.push(call);
		}
		Walk::Continue
	});
	if aggregates.is_empty() {
		Classification::Ungrouped(expr)
	} else {
		Classification::Aggregated(aggregates)
	}
}

/// Whether grouping applies at all: an explicit `GROUP BY`, or an implicit
/// single group because the projection list contains an aggregate with no
/// `GROUP BY` clause (spec.md section 4.3: a lone `SELECT COUNT(*) FROM t`
/// is one group covering the whole table).
pub fn is_grouped(core: &SelectCore) -> bool {
	!core.group_by.is_empty() || core.has_aggregates()
}

#[cfg(test)]
mod tests {
	use super::*;
	use super::super::expr::{AggregateFunc, BinaryOp, ColumnRef};
	use super::super::query::TableRef;

	fn col(name: &str) -> Expr {
		Expr::Column(ColumnRef { name: name.into(), table: None })
	}

	#[test]
	fn group_by_expression_matches_projection_by_display_string() {
		let core = SelectCore {
			distinct: false,
			projections: vec![
				(Expr::Binary(BinaryOp::Add, Box::new(col("a")), Box::new(Expr::Literal(super::super::value::Value::Int(1)))), None),
				(
					Expr::Aggregate(AggregateCall { func: AggregateFunc::Count, arg: None }),
					None,
				),
			],
			from: Some(TableRef { name: "t".into(), alias: None }),
			filter: None,
			group_by: vec![Expr::Binary(BinaryOp::Add, Box::new(col("a")), Box::new(Expr::Literal(super::super::value::Value::Int(1))))],
		};
		let classified = classify(&core);
		assert_eq!(classified[0], Classification::GroupKey);
		assert!(matches!(classified[1], Classification::Aggregated(_)));
	}

	#[test]
	fn bare_column_outside_group_by_is_ungrouped() {
		let core = SelectCore {
			distinct: false,
			projections: vec![(col("b"), None)],
			from: Some(TableRef { name: "t".into(), alias: None }),
			filter: None,
			group_by: vec![col("a")],
		};
		let classified = classify(&core);
		assert!(matches!(classified[0], Classification::Ungrouped(_)));
	}

	#[test]
	fn lone_aggregate_implies_a_single_group() {
		let core = SelectCore {
			distinct: false,
			projections: vec![(
				Expr::Aggregate(AggregateCall { func: AggregateFunc::Count, arg: None }),
				None,
			)],
			from: Some(TableRef { name: "t".into(), alias: None }),
			filter: None,
			group_by: vec![],
		};
		assert!(is_grouped(&core));
	}
}
