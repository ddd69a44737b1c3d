//! Lowers a bound [`Statement`] to a [`Stream`] (spec.md §4.9's
//! `prepare`), the DML/SELECT half of the statement layer. DDL, `ALTER
//! TABLE ... ADD COLUMN` and `REINDEX` build their own streams directly in
//! `src/dbs/mod.rs` instead, since they either bypass the planner
//! (ALTER/REINDEX) or have no stream at all (plain DDL).
//!
//! The full-schema-column-order convention: every `Op::Project` that feeds
//! a `table.Insert` lists every column of the target table, in schema
//! order, using `Value::Null` for a column the statement didn't supply —
//! never a partial row. [`crate::ast::Row::set`] silently does nothing for
//! a column not already present, so `table.Validate`'s default-filling and
//! `key::encode_row`/`decode_row`'s positional round-trip both depend on
//! every row carrying the table's full column set from the moment it's
//! built.

use crate::ast::{
	AggregateCall, ColumnRef, DeleteStmt, Expr, InsertSource, InsertStmt, OrderItem, Query, SelectCore, SelectSetOp,
	SelectStmt, Statement, UpdateStmt, Value,
};
use crate::ast::aggregate::{self, Classification};
use crate::catalog::Catalog;
use crate::err::{Error, Result};
use crate::plan::{Aggregator, Op, Stream};

/// `lower` and its helpers return the stream together with the column
/// names its final row shape carries, so the statement layer can report
/// `Response::columns()` without re-deriving them from the stream.
pub(crate) fn lower(stmt: &Statement, catalog: &dyn Catalog) -> Result<(Stream, Vec<String>)> {
	match stmt {
		Statement::Select(s) => lower_select(s, catalog),
		Statement::Insert(s) => lower_insert(s, catalog),
		Statement::Update(s) => lower_update(s, catalog),
		Statement::Delete(s) => lower_delete(s, catalog),
		_ => unreachable!("lower only handles SELECT/INSERT/UPDATE/DELETE"),
	}
}

pub(crate) fn lower_select(stmt: &SelectStmt, catalog: &dyn Catalog) -> Result<(Stream, Vec<String>)> {
	let (mut stream, columns) = lower_select_core(&stmt.core, catalog)?;
	for (op, core) in &stmt.combined {
		let (arm, _) = lower_select_core(core, catalog)?;
		stream = match op {
			SelectSetOp::Union => Stream::source(Op::Union(vec![stream, arm])),
			SelectSetOp::UnionAll => Stream::source(Op::Concat(vec![stream, arm])),
		};
	}
	stream = apply_order_limit_offset(stream, &stmt.order_by, stmt.limit.as_ref(), stmt.offset.as_ref());
	Ok((stream, columns))
}

fn apply_order_limit_offset(mut stream: Stream, order_by: &[OrderItem], limit: Option<&Expr>, offset: Option<&Expr>) -> Stream {
	// Multiple ORDER BY keys realized with the stream's single-key sort
	// ops by piping them in reverse priority order, relying on the sort
	// being stable: the last-piped (highest-priority) key's sort runs
	// last, and a stable sort never disturbs the relative order a prior
	// pass already established among equal keys.
	for item in order_by.iter().rev() {
		stream = stream.pipe(if item.desc { Op::TempTreeSortReverse(item.expr.clone()) } else { Op::TempTreeSort(item.expr.clone()) });
	}
	if let Some(offset) = offset {
		stream = stream.pipe(Op::Skip(offset.clone()));
	}
	if let Some(limit) = limit {
		stream = stream.pipe(Op::Take(limit.clone()));
	}
	stream
}

fn lower_select_core(core: &SelectCore, catalog: &dyn Catalog) -> Result<(Stream, Vec<String>)> {
	let (mut stream, rows_emit_names) = match &core.from {
		Some(t) => (Stream::source(Op::TableScan(t.name.clone())), None),
		None => {
			let exprs: Vec<Expr> = core.projections.iter().map(|(e, _)| e.clone()).collect();
			let names: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
			(Stream::source(Op::RowsEmit(exprs)), Some(names))
		}
	};
	let _ = catalog; // table existence is already confirmed by the binder

	if let Some(filter) = &core.filter {
		stream = stream.pipe(Op::Filter(filter.clone()));
	}

	let (mut stream, columns) = if aggregate::is_grouped(core) {
		lower_group_by(stream, core)?
	} else {
		let items = final_projection_items(&core.projections, rows_emit_names.as_deref());
		let columns = items.iter().map(|(_, a)| a.clone()).collect();
		(stream.pipe(Op::Project(items)), columns)
	};

	if core.distinct {
		stream = Stream::source(Op::Union(vec![stream]));
	}

	Ok((stream, columns))
}

/// Builds the final `Op::Project` items for a plain (non-aggregated)
/// projection list. When the source was a no-`FROM` `Op::RowsEmit`, the
/// expression has already been evaluated once by that op; re-evaluating
/// it here (rather than referencing the column it produced by name) would
/// silently re-run side effects like `NEXT VALUE FOR`, so in that case
/// each item becomes a bare column reference to the `RowsEmit`-assigned
/// name instead of the original expression.
fn final_projection_items(projections: &[(Expr, Option<String>)], rows_emit_names: Option<&[String]>) -> Vec<(Expr, String)> {
	projections
		.iter()
		.enumerate()
		.map(|(i, (expr, alias))| {
			let out_alias = alias.clone().unwrap_or_else(|| expr.to_string());
			let item_expr = match rows_emit_names {
				Some(names) => Expr::Column(ColumnRef { name: names[i].clone(), table: None }),
				None => expr.clone(),
			};
			(item_expr, out_alias)
		})
		.collect()
}

/// Builds `Op::GroupAggregate` plus the `Op::Project` that re-shapes its
/// output into the statement's actual projection order. Supports only a
/// single `GROUP BY` key and a bare `AggregateCall` per aggregated
/// projection (not an arithmetic expression combining more than one
/// aggregate) — see `DESIGN.md` for the scoped-limitation note matching
/// `Op::GroupAggregate`'s `Option<Expr>` singular group-key shape.
fn lower_group_by(stream: Stream, core: &SelectCore) -> Result<(Stream, Vec<String>)> {
	if core.group_by.len() > 1 {
		return Err(Error::in_operator("GROUP BY", "multiple GROUP BY expressions are not supported"));
	}
	let group_expr = core.group_by.first().cloned();
	let classified = aggregate::classify(core);

	let mut aggregators: Vec<Aggregator> = Vec::new();
	let mut items: Vec<(Expr, String)> = Vec::with_capacity(core.projections.len());
	for ((expr, alias), classification) in core.projections.iter().zip(&classified) {
		let out_alias = alias.clone().unwrap_or_else(|| expr.to_string());
		match classification {
			Classification::GroupKey => {
				let key_name = group_expr.as_ref().map(|g| g.to_string()).unwrap_or_else(|| "group".to_string());
				items.push((Expr::Column(ColumnRef { name: key_name, table: None }), out_alias));
			}
			Classification::Aggregated(calls) => {
				let call = aggregate_call_of(expr, calls)?;
				let agg_alias = format!("__agg_{}", aggregators.len());
				aggregators.push(Aggregator { call, alias: agg_alias.clone() });
				items.push((Expr::Column(ColumnRef { name: agg_alias, table: None }), out_alias));
			}
			Classification::Ungrouped(e) => return Err(Error::UngroupedColumn(e.to_string())),
		}
	}

	let columns = items.iter().map(|(_, a)| a.clone()).collect();
	let stream = stream
		.pipe(Op::GroupAggregate(group_expr, aggregators))
		.pipe(Op::Project(items));
	Ok((stream, columns))
}

fn aggregate_call_of(expr: &Expr, calls: &[&AggregateCall]) -> Result<AggregateCall> {
	if let Expr::Aggregate(call) = expr {
		return Ok(call.clone());
	}
	match calls {
		[call] => Ok((*call).clone()),
		_ => Err(Error::in_operator("GROUP BY", "composite aggregate expressions are not supported")),
	}
}

/// For every column of the target table, either a reference to the value
/// the statement supplied (by position in `given_cols`) or `NULL` — the
/// full-schema-column-order convention every `INSERT` row must follow.
fn full_schema_project_items(schema_cols: &[String], given_cols: &[String], row_col_names: &[String]) -> Vec<(Expr, String)> {
	schema_cols
		.iter()
		.map(|sc| {
			let item_expr = given_cols
				.iter()
				.position(|g| g.eq_ignore_ascii_case(sc))
				.map(|pos| Expr::Column(ColumnRef { name: row_col_names[pos].clone(), table: None }))
				.unwrap_or(Expr::Literal(Value::Null));
			(item_expr, sc.clone())
		})
		.collect()
}

fn lower_insert(stmt: &InsertStmt, catalog: &dyn Catalog) -> Result<(Stream, Vec<String>)> {
	let table = catalog.get_table(&stmt.table).ok_or_else(|| Error::TableNotFound(stmt.table.clone()))?;
	let schema_cols = table.column_names();
	let given_cols: Vec<String> = if stmt.columns.is_empty() { schema_cols.clone() } else { stmt.columns.clone() };

	let source_stream = match &stmt.source {
		InsertSource::Values(rows) => {
			let mut per_row = Vec::with_capacity(rows.len());
			for row_exprs in rows {
				if row_exprs.len() != given_cols.len() {
					return Err(Error::ValueCountMismatch(given_cols.len(), row_exprs.len()));
				}
				let raw_names: Vec<String> = row_exprs.iter().map(|e| e.to_string()).collect();
				let items = full_schema_project_items(&schema_cols, &given_cols, &raw_names);
				let one = Stream::source(Op::RowsEmit(row_exprs.clone())).pipe(Op::Project(items));
				per_row.push(one);
			}
			Stream::source(Op::Concat(per_row))
		}
		InsertSource::Select(select) => {
			let (inner, inner_columns) = lower_select(select, catalog)?;
			if inner_columns.len() != given_cols.len() {
				return Err(Error::ValueCountMismatch(given_cols.len(), inner_columns.len()));
			}
			let items = full_schema_project_items(&schema_cols, &given_cols, &inner_columns);
			inner.pipe(Op::Project(items))
		}
	};

	let indexes: Vec<String> = catalog.list_indexes(&stmt.table).iter().map(|i| i.name.clone()).collect();

	let mut stream = source_stream.pipe(Op::TableGenerateKey(stmt.table.clone())).pipe(Op::TableValidate(stmt.table.clone()));

	if let Some(clause) = &stmt.on_conflict {
		stream = stream.pipe(Op::OnConflict(clause.action.clone()));
	}
	for idx in &indexes {
		stream = stream.pipe(Op::IndexValidate(idx.clone()));
	}
	stream = stream.pipe(Op::TableInsert(stmt.table.clone()));
	for idx in &indexes {
		stream = stream.pipe(Op::IndexDelete(idx.clone()));
	}
	for idx in &indexes {
		stream = stream.pipe(Op::IndexInsert(idx.clone()));
	}

	finish_mutation(stream, &stmt.returning)
}

fn lower_update(stmt: &UpdateStmt, catalog: &dyn Catalog) -> Result<(Stream, Vec<String>)> {
	let _ = catalog.get_table(&stmt.table).ok_or_else(|| Error::TableNotFound(stmt.table.clone()))?;
	let indexes: Vec<String> = catalog.list_indexes(&stmt.table).iter().map(|i| i.name.clone()).collect();

	let mut stream = Stream::source(Op::TableScan(stmt.table.clone()));
	if let Some(filter) = &stmt.filter {
		stream = stream.pipe(Op::Filter(filter.clone()));
	}
	stream = apply_order_limit_offset(stream, &stmt.order_by, stmt.limit.as_ref(), stmt.offset.as_ref());

	for a in &stmt.assignments {
		stream = stream.pipe(Op::PathsSet(a.column.clone(), a.value.clone()));
	}
	stream = stream.pipe(Op::TableValidate(stmt.table.clone()));
	for idx in &indexes {
		stream = stream.pipe(Op::IndexDelete(idx.clone()));
	}
	stream = stream.pipe(Op::TableReplace(stmt.table.clone()));
	for idx in &indexes {
		stream = stream.pipe(Op::IndexInsert(idx.clone()));
	}

	finish_mutation(stream, &stmt.returning)
}

fn lower_delete(stmt: &DeleteStmt, catalog: &dyn Catalog) -> Result<(Stream, Vec<String>)> {
	let _ = catalog.get_table(&stmt.table).ok_or_else(|| Error::TableNotFound(stmt.table.clone()))?;
	let indexes: Vec<String> = catalog.list_indexes(&stmt.table).iter().map(|i| i.name.clone()).collect();

	let mut stream = Stream::source(Op::TableScan(stmt.table.clone()));
	if let Some(filter) = &stmt.filter {
		stream = stream.pipe(Op::Filter(filter.clone()));
	}
	stream = apply_order_limit_offset(stream, &stmt.order_by, stmt.limit.as_ref(), stmt.offset.as_ref());

	for idx in &indexes {
		stream = stream.pipe(Op::IndexDelete(idx.clone()));
	}
	stream = stream.pipe(Op::TableDelete(stmt.table.clone()));

	finish_mutation(stream, &stmt.returning)
}

fn finish_mutation(stream: Stream, returning: &[(Expr, Option<String>)]) -> Result<(Stream, Vec<String>)> {
	if returning.is_empty() {
		Ok((stream.pipe(Op::Discard), Vec::new()))
	} else {
		let items: Vec<(Expr, String)> = returning
			.iter()
			.map(|(e, alias)| (e.clone(), alias.clone().unwrap_or_else(|| e.to_string())))
			.collect();
		let columns = items.iter().map(|(_, a)| a.clone()).collect();
		Ok((stream.pipe(Op::Project(items)), columns))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ast::{ColumnDef, ColumnOption, ColumnType, TableRef};
	use crate::catalog::CatalogWriter;
	use crate::kvs::Datastore;

	fn t() -> crate::catalog::TableInfo {
		crate::catalog::TableInfo {
			name: "t".into(),
			columns: vec![
				ColumnDef { name: "pk".into(), ty: ColumnType::Int, options: vec![ColumnOption::PrimaryKey] },
				ColumnDef { name: "a".into(), ty: ColumnType::Int, options: vec![] },
			],
			constraints: vec![],
		}
	}

	#[test]
	fn insert_values_builds_a_full_schema_project() {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(t()).unwrap();
		let stmt = InsertStmt {
			table: "t".into(),
			columns: vec!["a".into()],
			source: InsertSource::Values(vec![vec![Expr::Literal(Value::Int(5))]]),
			on_conflict: None,
			returning: vec![],
		};
		let (stream, columns) = lower_insert(&stmt, &tx).unwrap();
		assert!(columns.is_empty());
		assert!(stream.to_string().contains("table.GenerateKey(\"t\")"));
		assert!(stream.to_string().contains("table.Insert(\"t\")"));
		assert!(stream.to_string().ends_with("discard()"));
	}

	#[test]
	fn select_with_no_from_renders_rows_emit_then_project() {
		let core = SelectCore {
			distinct: false,
			projections: vec![(Expr::Literal(Value::Int(1)), Some("one".into()))],
			from: None,
			filter: None,
			group_by: vec![],
		};
		let ds = Datastore::new();
		let tx = ds.transaction(false).unwrap();
		let (stream, columns) = lower_select_core(&core, &tx).unwrap();
		assert_eq!(columns, vec!["one".to_string()]);
		assert!(stream.to_string().starts_with("rows.Emit"));
	}

	#[test]
	fn select_star_uses_a_table_scan_source() {
		let core = SelectCore {
			distinct: false,
			projections: vec![(Expr::Wildcard, None)],
			from: Some(TableRef { name: "t".into(), alias: None }),
			filter: None,
			group_by: vec![],
		};
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(t()).unwrap();
		let (stream, _) = lower_select_core(&core, &tx).unwrap();
		assert!(stream.to_string().starts_with("table.Scan(\"t\")"));
	}
}
