//! The binder (spec component C6): resolves every column reference in a
//! parsed statement to the table it belongs to, and type-checks the
//! column's mere presence (this dialect has no further type inference).
//!
//! Grounded on the teacher's `doc::field`/`doc::check` column-presence
//! validation, adapted to run over parsed expressions instead of stored
//! documents, and on the "explicit visitor, no hidden control flow" note
//! in spec.md §9: [`bind_expr`] is a hand-written mutable walk rather than
//! reusing [`crate::ast::Expr::walk`], since it needs to *rewrite*
//! `Column` nodes in place, not just visit them.

use crate::ast::{
	ColumnDef, CreateTableStmt, DeleteStmt, Expr, InsertSource, InsertStmt, SelectCore, SelectStmt,
	Statement, TableConstraint, TableRef, UpdateStmt,
};
use crate::catalog::{Catalog, TableInfo};
use crate::cnf::SYSTEM_TABLES;
use crate::err::{Error, Result};

pub struct Binder<'c> {
	catalog: &'c dyn Catalog,
}

impl<'c> Binder<'c> {
	pub fn new(catalog: &'c dyn Catalog) -> Self {
		Binder { catalog }
	}

	pub fn bind(&self, stmt: &mut Statement) -> Result<()> {
		match stmt {
			Statement::Select(s) => self.bind_select(s),
			Statement::Insert(s) => self.bind_insert(s),
			Statement::Update(s) => self.bind_update(s),
			Statement::Delete(s) => self.bind_delete(s),
			Statement::CreateTable(s) => bind_create_table(s),
			Statement::AlterTableAddColumn { table, column } => self.bind_add_column(table, column),
			Statement::Explain(inner) => self.bind(inner),
			// DDL/transaction-control statements carry no expressions that
			// need binding: CreateIndex/CreateSequence/Drop*/AlterRename/
			// Reindex/Begin/Commit/Rollback.
			_ => Ok(()),
		}
	}

	fn lookup(&self, name: &str) -> Result<&'c TableInfo> {
		self.catalog.get_table(name).ok_or_else(|| Error::TableNotFound(name.to_string()))
	}

	/// Like [`Self::lookup`], but for the write paths (`INSERT`/`UPDATE`/
	/// `DELETE`/`ALTER TABLE ADD COLUMN`): the system tables resolve fine
	/// through an ordinary `lookup` (they're real catalog entries, so
	/// `SELECT` reads them like any other table per spec.md §6), but must
	/// still reject mutation regardless of catalog presence.
	fn lookup_mutable(&self, name: &str) -> Result<&'c TableInfo> {
		if SYSTEM_TABLES.iter().any(|t| t.eq_ignore_ascii_case(name)) {
			return Err(Error::ReservedTable(name.to_string()));
		}
		self.lookup(name)
	}

	fn bind_select(&self, stmt: &mut SelectStmt) -> Result<()> {
		let mut scope = self.bind_core(&mut stmt.core)?;
		for (_, core) in &mut stmt.combined {
			scope = self.bind_core(core)?;
		}
		// order_by/limit/offset only ever follow the final core/combined arm
		// (spec.md §4.1), so they bind against whichever table that arm saw.
		for item in &mut stmt.order_by {
			self.bind_expr(&mut item.expr, scope.as_ref())?;
		}
		if let Some(e) = &mut stmt.limit {
			self.bind_expr(e, None)?;
		}
		if let Some(e) = &mut stmt.offset {
			self.bind_expr(e, None)?;
		}
		Ok(())
	}

	fn bind_core(&self, core: &mut SelectCore) -> Result<Option<BoundTable<'c>>> {
		let table = match &core.from {
			Some(t) => Some(self.resolve_table_ref(t)?),
			None => None,
		};
		for (expr, _) in &mut core.projections {
			self.bind_expr(expr, table.as_ref())?;
		}
		if let Some(filter) = &mut core.filter {
			self.bind_expr(filter, table.as_ref())?;
		}
		for e in &mut core.group_by {
			self.bind_expr(e, table.as_ref())?;
		}
		Ok(table)
	}

	fn resolve_table_ref(&self, t: &TableRef) -> Result<BoundTable<'c>> {
		Ok(BoundTable {
			info: self.lookup(&t.name)?,
			binding_name: t.binding_name().to_string(),
		})
	}

	fn bind_insert(&self, stmt: &mut InsertStmt) -> Result<()> {
		let table = self.lookup_mutable(&stmt.table)?;
		for col in &stmt.columns {
			if table.column(col).is_none() {
				return Err(Error::ColumnNotFound(col.clone()));
			}
		}
		match &mut stmt.source {
			InsertSource::Values(rows) => {
				for row in rows {
					for e in row {
						// VALUES rows have no row context to bind columns
						// against (spec.md §4.6: "statements without a
						// table... forbid any column or wildcard reference").
						self.bind_expr(e, None)?;
					}
				}
			}
			InsertSource::Select(select) => self.bind_select(select)?,
		}
		let bound = BoundTable { info: table, binding_name: stmt.table.clone() };
		for (e, _) in &mut stmt.returning {
			self.bind_expr(e, Some(&bound))?;
		}
		Ok(())
	}

	fn bind_update(&self, stmt: &mut UpdateStmt) -> Result<()> {
		let table = self.lookup_mutable(&stmt.table)?;
		let bound = BoundTable { info: table, binding_name: stmt.table.clone() };
		for a in &mut stmt.assignments {
			if table.column(&a.column).is_none() {
				return Err(Error::ColumnNotFound(a.column.clone()));
			}
			self.bind_expr(&mut a.value, Some(&bound))?;
		}
		if let Some(filter) = &mut stmt.filter {
			self.bind_expr(filter, Some(&bound))?;
		}
		for item in &mut stmt.order_by {
			self.bind_expr(&mut item.expr, Some(&bound))?;
		}
		if let Some(e) = &mut stmt.limit {
			self.bind_expr(e, None)?;
		}
		if let Some(e) = &mut stmt.offset {
			self.bind_expr(e, None)?;
		}
		for (e, _) in &mut stmt.returning {
			self.bind_expr(e, Some(&bound))?;
		}
		Ok(())
	}

	fn bind_delete(&self, stmt: &mut DeleteStmt) -> Result<()> {
		let table = self.lookup_mutable(&stmt.table)?;
		let bound = BoundTable { info: table, binding_name: stmt.table.clone() };
		if let Some(filter) = &mut stmt.filter {
			self.bind_expr(filter, Some(&bound))?;
		}
		for item in &mut stmt.order_by {
			self.bind_expr(&mut item.expr, Some(&bound))?;
		}
		if let Some(e) = &mut stmt.limit {
			self.bind_expr(e, None)?;
		}
		if let Some(e) = &mut stmt.offset {
			self.bind_expr(e, None)?;
		}
		for (e, _) in &mut stmt.returning {
			self.bind_expr(e, Some(&bound))?;
		}
		Ok(())
	}

	fn bind_add_column(&self, table: &str, column: &mut ColumnDef) -> Result<()> {
		let existing = self.lookup_mutable(table)?;
		let mut names: Vec<String> = existing.column_names();
		names.push(column.name.clone());
		for opt_expr in column_option_exprs(column) {
			bind_expr_against_names(opt_expr, table, &names)?;
		}
		Ok(())
	}

	/// Resolves every `Column`/`Wildcard` node in `expr` against `table`
	/// (`None` means the statement has no `FROM`, so any reference is an
	/// error), recursing into every sub-expression.
	fn bind_expr(&self, expr: &mut Expr, table: Option<&BoundTable<'c>>) -> Result<()> {
		match expr {
			Expr::Column(col) => {
				let t = table.ok_or(Error::NoTableSpecified)?;
				if t.info.column(&col.name).is_none() {
					return Err(Error::ColumnNotFound(col.name.clone()));
				}
				col.table = Some(t.binding_name.clone());
				Ok(())
			}
			Expr::Wildcard => {
				if table.is_none() {
					return Err(Error::NoTableSpecified);
				}
				Ok(())
			}
			Expr::Literal(_) | Expr::PositionalParam(_) | Expr::NamedParam(_) | Expr::NextValueFor(_) => Ok(()),
			Expr::Not(e) | Expr::Neg(e) | Expr::Cast(e, _) | Expr::Paren(e) => self.bind_expr(e, table),
			Expr::Binary(_, l, r) => {
				self.bind_expr(l, table)?;
				self.bind_expr(r, table)
			}
			Expr::Between { expr, low, high, .. } => {
				self.bind_expr(expr, table)?;
				self.bind_expr(low, table)?;
				self.bind_expr(high, table)
			}
			Expr::In { expr, list, .. } => {
				self.bind_expr(expr, table)?;
				for e in list {
					self.bind_expr(e, table)?;
				}
				Ok(())
			}
			Expr::Is { expr, value, .. } => {
				self.bind_expr(expr, table)?;
				self.bind_expr(value, table)
			}
			Expr::Function { args, .. } => {
				for e in args {
					self.bind_expr(e, table)?;
				}
				Ok(())
			}
			Expr::Aggregate(call) => {
				if let Some(e) = &mut call.arg {
					self.bind_expr(e, table)?;
				}
				Ok(())
			}
		}
	}
}

/// A table resolved for the duration of binding one statement/core: the
/// schema plus the name column references should be stamped with (the
/// alias, if one was given).
struct BoundTable<'c> {
	info: &'c TableInfo,
	binding_name: String,
}

/// `CREATE TABLE` binds differently from every other statement: the table
/// doesn't exist in the catalog yet, so `CHECK`/`DEFAULT` expressions are
/// validated against the column list being declared, not a catalog
/// lookup (spec.md §4.2's `CHECK(expr)` column/table constraints).
fn bind_create_table(stmt: &mut CreateTableStmt) -> Result<()> {
	let has_pk = stmt.columns.iter().any(|c| c.is_primary_key())
		|| stmt.constraints.iter().any(|c| matches!(c, TableConstraint::PrimaryKey(_)));
	if !has_pk {
		return Err(Error::MissingPrimaryKey(stmt.name.clone()));
	}
	let names: Vec<String> = stmt.columns.iter().map(|c| c.name.clone()).collect();
	let table = stmt.name.clone();
	for col in &mut stmt.columns {
		for expr in column_option_exprs(col) {
			bind_expr_against_names(expr, &table, &names)?;
		}
	}
	for constraint in &mut stmt.constraints {
		match constraint {
			TableConstraint::PrimaryKey(cols) | TableConstraint::Unique(cols) => {
				for c in cols.iter() {
					if !names.iter().any(|n| n.eq_ignore_ascii_case(c)) {
						return Err(Error::ColumnNotFound(c.clone()));
					}
				}
			}
			TableConstraint::Check(expr) => bind_expr_against_names(expr, &table, &names)?,
		}
	}
	Ok(())
}

fn column_option_exprs(col: &mut ColumnDef) -> impl Iterator<Item = &mut Expr> {
	col.options.iter_mut().filter_map(|o| match o {
		crate::ast::ColumnOption::Check(e) | crate::ast::ColumnOption::Default(e) => Some(e),
		_ => None,
	})
}

fn bind_expr_against_names(expr: &mut Expr, table: &str, names: &[String]) -> Result<()> {
	match expr {
		Expr::Column(col) => {
			if !names.iter().any(|n| n.eq_ignore_ascii_case(&col.name)) {
				return Err(Error::ColumnNotFound(col.name.clone()));
			}
			col.table = Some(table.to_string());
			Ok(())
		}
		Expr::Wildcard => Err(Error::NoTableSpecified),
		Expr::Literal(_) | Expr::PositionalParam(_) | Expr::NamedParam(_) | Expr::NextValueFor(_) => Ok(()),
		Expr::Not(e) | Expr::Neg(e) | Expr::Cast(e, _) | Expr::Paren(e) => bind_expr_against_names(e, table, names),
		Expr::Binary(_, l, r) => {
			bind_expr_against_names(l, table, names)?;
			bind_expr_against_names(r, table, names)
		}
		Expr::Between { expr, low, high, .. } => {
			bind_expr_against_names(expr, table, names)?;
			bind_expr_against_names(low, table, names)?;
			bind_expr_against_names(high, table, names)
		}
		Expr::In { expr, list, .. } => {
			bind_expr_against_names(expr, table, names)?;
			for e in list {
				bind_expr_against_names(e, table, names)?;
			}
			Ok(())
		}
		Expr::Is { expr, value, .. } => {
			bind_expr_against_names(expr, table, names)?;
			bind_expr_against_names(value, table, names)
		}
		Expr::Function { args, .. } => {
			for e in args {
				bind_expr_against_names(e, table, names)?;
			}
			Ok(())
		}
		Expr::Aggregate(call) => {
			if let Some(e) = &mut call.arg {
				bind_expr_against_names(e, table, names)?;
			}
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ast::{ColumnOption, ColumnType, Value};
	use crate::kvs::Datastore;

	fn test_table() -> TableInfo {
		TableInfo {
			name: "t".into(),
			columns: vec![
				ColumnDef { name: "a".into(), ty: ColumnType::Int, options: vec![ColumnOption::PrimaryKey] },
				ColumnDef { name: "b".into(), ty: ColumnType::Text, options: vec![] },
			],
			constraints: vec![],
		}
	}

	fn with_table(f: impl FnOnce(&dyn Catalog)) {
		use crate::catalog::CatalogWriter;
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(test_table()).unwrap();
		f(&tx);
	}

	#[test]
	fn resolves_column_to_its_table() {
		with_table(|cat| {
			let mut stmt = Statement::Select(crate::ast::SelectStmt {
				core: SelectCore {
					distinct: false,
					projections: vec![(Expr::Column(crate::ast::ColumnRef { name: "a".into(), table: None }), None)],
					from: Some(TableRef { name: "t".into(), alias: None }),
					filter: None,
					group_by: vec![],
				},
				combined: vec![],
				order_by: vec![],
				limit: None,
				offset: None,
			});
			Binder::new(cat).bind(&mut stmt).unwrap();
			if let Statement::Select(s) = &stmt {
				if let (Expr::Column(c), _) = &s.core.projections[0] {
					assert_eq!(c.table.as_deref(), Some("t"));
				} else {
					panic!("expected column");
				}
			}
		});
	}

	#[test]
	fn unknown_column_is_an_error() {
		with_table(|cat| {
			let mut stmt = Statement::Select(crate::ast::SelectStmt {
				core: SelectCore {
					distinct: false,
					projections: vec![(Expr::Column(crate::ast::ColumnRef { name: "nope".into(), table: None }), None)],
					from: Some(TableRef { name: "t".into(), alias: None }),
					filter: None,
					group_by: vec![],
				},
				combined: vec![],
				order_by: vec![],
				limit: None,
				offset: None,
			});
			assert!(matches!(Binder::new(cat).bind(&mut stmt), Err(Error::ColumnNotFound(_))));
		});
	}

	#[test]
	fn wildcard_without_a_table_is_an_error() {
		let mut stmt = Statement::Select(crate::ast::SelectStmt {
			core: SelectCore {
				distinct: false,
				projections: vec![(Expr::Wildcard, None)],
				from: None,
				filter: None,
				group_by: vec![],
			},
			combined: vec![],
			order_by: vec![],
			limit: None,
			offset: None,
		});
		let ds = Datastore::new();
		let tx = ds.transaction(false).unwrap();
		assert!(matches!(Binder::new(&tx).bind(&mut stmt), Err(Error::NoTableSpecified)));
	}

	#[test]
	fn constant_select_binds_a_literal_expression() {
		let mut stmt = Statement::Select(crate::ast::SelectStmt {
			core: SelectCore {
				distinct: false,
				projections: vec![(Expr::Literal(Value::Int(1)), None)],
				from: None,
				filter: None,
				group_by: vec![],
			},
			combined: vec![],
			order_by: vec![],
			limit: None,
			offset: None,
		});
		let ds = Datastore::new();
		let tx = ds.transaction(false).unwrap();
		assert!(Binder::new(&tx).bind(&mut stmt).is_ok());
	}
}
