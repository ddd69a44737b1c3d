//! Row validation (spec component within C8's `table.Validate`): apply
//! column defaults, then enforce `NOT NULL`, type, and `CHECK` constraints.
//!
//! Grounded on the teacher's `doc::field` (per-column default/value
//! resolution) and `doc::check` (an `ASSERT`/`CHECK`-like expression
//! evaluated against the in-progress document), collapsed onto a flat
//! [`Row`] instead of a nested document.

use crate::ast::{ColumnDef, ColumnType, Environment, Row, TableConstraint, Value};
use crate::catalog::TableInfo;
use crate::err::{Error, Result};
use crate::exec::env::Env;

/// Runs `table.Validate` against `row` in place: columns left `NULL` get
/// their `DEFAULT` expression evaluated (in schema order, so a later
/// default may reference an earlier column's resolved value), then every
/// column's `NOT NULL`/type/`CHECK` constraints are enforced, then every
/// table-level `CHECK` constraint.
pub fn validate(table: &TableInfo, row: &mut Row, env: &mut Env) -> Result<()> {
	apply_defaults(table, row, env)?;
	check_columns(table, row, env)?;
	check_table_constraints(table, row, env)
}

fn apply_defaults(table: &TableInfo, row: &mut Row, env: &mut Env) -> Result<()> {
	for column in &table.columns {
		let is_null = matches!(row.get(&column.name), Some(Value::Null) | None);
		if !is_null {
			continue;
		}
		if let Some(default) = column.default_expr() {
			env.set_row(row.clone());
			let value = default.evaluate(env).map_err(|e| Error::in_operator("table.Validate", e))?;
			row.set(&column.name, value);
		}
	}
	Ok(())
}

fn check_columns(table: &TableInfo, row: &mut Row, env: &mut Env) -> Result<()> {
	for column in &table.columns {
		let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
		if column.is_not_null() && value.is_null() {
			return Err(Error::NotNullViolation(column.name.clone()));
		}
		if !value.is_null() && !type_matches(column.ty, &value) {
			return Err(Error::TypeViolation(column.name.clone(), value.type_name().to_string()));
		}
		env.set_row(row.clone());
		for check in column.check_exprs() {
			let result = check.evaluate(env).map_err(|e| Error::in_operator("table.Validate", e))?;
			if !result.is_truthy() {
				return Err(Error::CheckViolation(check.to_string()));
			}
		}
	}
	Ok(())
}

fn check_table_constraints(table: &TableInfo, row: &mut Row, env: &mut Env) -> Result<()> {
	env.set_row(row.clone());
	for constraint in &table.constraints {
		if let TableConstraint::Check(expr) = constraint {
			let result = expr.evaluate(env).map_err(|e| Error::in_operator("table.Validate", e))?;
			if !result.is_truthy() {
				return Err(Error::CheckViolation(expr.to_string()));
			}
		}
	}
	Ok(())
}

fn type_matches(ty: ColumnType, value: &Value) -> bool {
	match (ty, value) {
		(ColumnType::Int, Value::Int(_)) => true,
		(ColumnType::Float, Value::Int(_) | Value::Float(_)) => true,
		(ColumnType::Text, Value::Text(_)) => true,
		(ColumnType::Bool, Value::Bool(_)) => true,
		(ColumnType::Blob, Value::Blob(_)) => true,
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ast::{BinaryOp, ColumnOption, ColumnRef, Expr};
	use crate::exec::params::Params;
	use crate::kvs::{Datastore, Transaction};
	use std::cell::RefCell;
	use std::sync::Arc;

	fn env_over(tx: &RefCell<Transaction>, params: &Params) -> Env<'_> {
		Env::new(tx, params)
	}

	fn row(columns: &[&str], values: Vec<Value>) -> Row {
		let cols: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect::<Vec<_>>().into();
		Row::new(cols, values)
	}

	#[test]
	fn default_expression_fills_an_absent_column() {
		let table = TableInfo {
			name: "t".into(),
			columns: vec![
				ColumnDef { name: "pk".into(), ty: ColumnType::Int, options: vec![ColumnOption::PrimaryKey] },
				ColumnDef {
					name: "flag".into(),
					ty: ColumnType::Bool,
					options: vec![ColumnOption::Default(Expr::Literal(Value::Bool(true)))],
				},
			],
			constraints: vec![],
		};
		let ds = Datastore::new();
		let tx = RefCell::new(ds.transaction(true).unwrap());
		let params = Params::new();
		let mut env = env_over(&tx, &params);
		let mut r = row(&["pk", "flag"], vec![Value::Int(1), Value::Null]);
		validate(&table, &mut r, &mut env).unwrap();
		assert_eq!(r.get("flag"), Some(&Value::Bool(true)));
	}

	#[test]
	fn not_null_violation_is_reported_by_column_name() {
		let table = TableInfo {
			name: "t".into(),
			columns: vec![ColumnDef { name: "pk".into(), ty: ColumnType::Int, options: vec![ColumnOption::PrimaryKey] }],
			constraints: vec![],
		};
		let ds = Datastore::new();
		let tx = RefCell::new(ds.transaction(true).unwrap());
		let params = Params::new();
		let mut env = env_over(&tx, &params);
		let mut r = row(&["pk"], vec![Value::Null]);
		assert!(matches!(validate(&table, &mut r, &mut env), Err(Error::NotNullViolation(ref c)) if c == "pk"));
	}

	#[test]
	fn check_constraint_violation_carries_the_expression_text() {
		let table = TableInfo {
			name: "t".into(),
			columns: vec![ColumnDef {
				name: "a".into(),
				ty: ColumnType::Int,
				options: vec![ColumnOption::Check(Expr::Binary(
					BinaryOp::Gt,
					Box::new(Expr::Column(ColumnRef { name: "a".into(), table: Some("t".into()) })),
					Box::new(Expr::Literal(Value::Int(0))),
				))],
			}],
			constraints: vec![],
		};
		let ds = Datastore::new();
		let tx = RefCell::new(ds.transaction(true).unwrap());
		let params = Params::new();
		let mut env = env_over(&tx, &params);
		let mut r = row(&["a"], vec![Value::Int(-1)]);
		assert!(matches!(validate(&table, &mut r, &mut env), Err(Error::CheckViolation(_))));
	}

	#[test]
	fn float_column_accepts_an_integer_value() {
		let table = TableInfo {
			name: "t".into(),
			columns: vec![ColumnDef { name: "a".into(), ty: ColumnType::Float, options: vec![] }],
			constraints: vec![],
		};
		let ds = Datastore::new();
		let tx = RefCell::new(ds.transaction(true).unwrap());
		let params = Params::new();
		let mut env = env_over(&tx, &params);
		let mut r = row(&["a"], vec![Value::Int(3)]);
		assert!(validate(&table, &mut r, &mut env).is_ok());
	}
}
