//! Statement and query shapes produced by the parser and consumed by the
//! binder. A [`Query`] is an ordered sequence of [`Statement`]s — spec.md's
//! data model treats a multi-statement script as nothing more than that.

use super::ddl::{ColumnDef, SequenceOptions, TableConstraint};
use super::expr::Expr;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
	pub statements: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
	pub name: String,
	pub alias: Option<String>,
}

impl TableRef {
	/// The name a column reference binds against: the alias if one was
	/// given, otherwise the table name itself.
	pub fn binding_name(&self) -> &str {
		self.alias.as_deref().unwrap_or(&self.name)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectSetOp {
	Union,
	UnionAll,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectCore {
	pub distinct: bool,
	/// `(expression, optional alias)`. An empty vec with `from: None` never
	/// occurs; a bare `Expr::Wildcard` with no alias is `SELECT *`.
	pub projections: Vec<(Expr, Option<String>)>,
	pub from: Option<TableRef>,
	pub filter: Option<Expr>,
	pub group_by: Vec<Expr>,
}

impl SelectCore {
	pub fn has_aggregates(&self) -> bool {
		self.projections.iter().any(|(e, _)| e.contains_aggregate())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderItem {
	pub expr: Expr,
	pub desc: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectStmt {
	pub core: SelectCore,
	/// Additional arms of a `UNION`/`UNION ALL` chain, applied left to
	/// right against the running result of everything before them.
	pub combined: Vec<(SelectSetOp, SelectCore)>,
	/// Only legal after the final core/combined arm (spec.md section 4.1).
	pub order_by: Vec<OrderItem>,
	pub limit: Option<Expr>,
	pub offset: Option<Expr>,
}

impl SelectStmt {
	pub fn is_compound(&self) -> bool {
		!self.combined.is_empty()
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum InsertSource {
	Values(Vec<Vec<Expr>>),
	Select(Box<SelectStmt>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConflictTarget {
	Column(String),
	/// Bare `ON CONFLICT DO ...` with no target column; applies to any
	/// unique-constraint violation on the table.
	Unspecified,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConflictAction {
	DoNothing,
	/// `DO REPLACE`: the conflicting row is deleted and the new row takes
	/// its place, re-running constraint and index maintenance from
	/// scratch (spec.md section 8, the `ON CONFLICT DO REPLACE` scenario).
	DoReplace,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConflictClause {
	pub target: ConflictTarget,
	pub action: ConflictAction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
	pub column: String,
	pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertStmt {
	pub table: String,
	pub columns: Vec<String>,
	pub source: InsertSource,
	pub on_conflict: Option<ConflictClause>,
	pub returning: Vec<(Expr, Option<String>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateStmt {
	pub table: String,
	pub assignments: Vec<Assignment>,
	pub filter: Option<Expr>,
	pub order_by: Vec<OrderItem>,
	pub limit: Option<Expr>,
	pub offset: Option<Expr>,
	pub returning: Vec<(Expr, Option<String>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteStmt {
	pub table: String,
	pub filter: Option<Expr>,
	pub order_by: Vec<OrderItem>,
	pub limit: Option<Expr>,
	pub offset: Option<Expr>,
	pub returning: Vec<(Expr, Option<String>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateTableStmt {
	pub name: String,
	pub if_not_exists: bool,
	pub columns: Vec<ColumnDef>,
	pub constraints: Vec<TableConstraint>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateIndexStmt {
	pub name: String,
	pub if_not_exists: bool,
	pub table: String,
	pub columns: Vec<String>,
	pub unique: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateSequenceStmt {
	pub name: String,
	pub if_not_exists: bool,
	pub options: SequenceOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
	Select(SelectStmt),
	Insert(InsertStmt),
	Update(UpdateStmt),
	Delete(DeleteStmt),

	CreateTable(CreateTableStmt),
	CreateIndex(CreateIndexStmt),
	CreateSequence(CreateSequenceStmt),
	DropTable { name: String, if_exists: bool },
	DropIndex { name: String, if_exists: bool },
	DropSequence { name: String, if_exists: bool },
	AlterTableRename { table: String, new_name: String },
	AlterTableAddColumn { table: String, column: ColumnDef },
	/// `REINDEX [name]`; `None` rebuilds every index (spec.md §4.9).
	Reindex { index: Option<String> },

	Explain(Box<Statement>),
	Begin { read_only: bool },
	Commit,
	Rollback,
}

impl Statement {
	/// Whether this statement can run against a read-only transaction.
	/// `SELECT`/`EXPLAIN` are read-only unless they advance a sequence
	/// (`NEXT VALUE FOR`); everything else that mutates the catalog or
	/// table data is not.
	pub fn is_read_only(&self) -> bool {
		match self {
			Statement::Select(s) => !select_advances_sequence(s),
			Statement::Explain(inner) => inner.is_read_only(),
			Statement::Begin { .. } | Statement::Commit | Statement::Rollback => true,
			_ => false,
		}
	}
}

fn select_advances_sequence(s: &SelectStmt) -> bool {
	let core_hits = |core: &SelectCore| {
		core.projections.iter().any(|(e, _)| e.advances_sequence())
			|| core.filter.as_ref().is_some_and(Expr::advances_sequence)
	};
	if core_hits(&s.core) {
		return true;
	}
	s.combined.iter().any(|(_, c)| core_hits(c))
}

#[cfg(test)]
mod tests {
	use super::*;
	use super::super::value::Value;

	#[test]
	fn plain_select_is_read_only() {
		let stmt = Statement::Select(SelectStmt {
			core: SelectCore {
				distinct: false,
				projections: vec![(Expr::Wildcard, None)],
				from: Some(TableRef { name: "t".into(), alias: None }),
				filter: None,
				group_by: vec![],
			},
			combined: vec![],
			order_by: vec![],
			limit: None,
			offset: None,
		});
		assert!(stmt.is_read_only());
	}

	#[test]
	fn select_with_next_value_for_is_not_read_only() {
		let stmt = Statement::Select(SelectStmt {
			core: SelectCore {
				distinct: false,
				projections: vec![(Expr::NextValueFor("s".into()), None)],
				from: None,
				filter: None,
				group_by: vec![],
			},
			combined: vec![],
			order_by: vec![],
			limit: None,
			offset: None,
		});
		assert!(!stmt.is_read_only());
	}

	#[test]
	fn insert_is_never_read_only() {
		let stmt = Statement::Insert(InsertStmt {
			table: "t".into(),
			columns: vec!["a".into()],
			source: InsertSource::Values(vec![vec![Expr::Literal(Value::Int(1))]]),
			on_conflict: None,
			returning: vec![],
		});
		assert!(!stmt.is_read_only());
	}
}
