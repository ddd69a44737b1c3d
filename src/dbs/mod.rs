//! The statement layer (spec component C9): per-statement preparation —
//! DDL, DML, `EXPLAIN`, `REINDEX`, transaction control — composing every
//! earlier component (C2–C8) into a single `Connection`/`Session` surface.
//!
//! Grounded on `src/dbs/executor.rs` (a statement run against one
//! transaction, producing a `Response` the caller must close) and
//! `src/kvs/tx.rs`'s single-writer-transaction-per-connection model,
//! scoped down from SurrealDB's async multi-namespace `Session` to this
//! spec's synchronous, single-table-catalog connection.

mod lower;
mod response;

pub use response::Response;

use std::cell::RefCell;
use std::sync::Arc;

use crate::ast::{ColumnDef, ResolvedSequence, SequenceInfo, Statement};
use crate::bind::Binder;
use crate::catalog::{Catalog, CatalogWriter, IndexInfo, TableInfo};
use crate::cnf::DEFAULT_SEQUENCE_CACHE;
use crate::ctx::Context;
use crate::err::{Error, Result};
use crate::exec::{self, params::Params};
use crate::kvs::{Datastore, Transaction};
use crate::parser::Parser;
use crate::plan;

/// A handle to one in-memory database. Cheaply cloneable: every clone and
/// every `Session` opened from it share the same underlying
/// [`Datastore`], the way the teacher's `kvs::Datastore` is `Arc`-shared
/// across connections so commits on one are visible to the others.
#[derive(Clone)]
pub struct Connection {
	ds: Arc<Datastore>,
}

impl Connection {
	pub fn new() -> Self {
		Connection { ds: Datastore::new() }
	}

	/// Opens a session: a serialized sequence of statements against this
	/// connection's database, with its own (optional) explicit
	/// transaction.
	pub fn session(&self) -> Session {
		Session { ds: Arc::clone(&self.ds), explicit: None }
	}
}

impl Default for Connection {
	fn default() -> Self {
		Self::new()
	}
}

/// An explicit `BEGIN ... COMMIT`/`ROLLBACK` transaction held open across
/// statements on a [`Session`]. `errored` is spec.md §7's "current
/// transaction is errored": once set, every statement but `ROLLBACK`
/// fails immediately with [`Error::TransactionErrored`] until the
/// transaction is rolled back.
struct ExplicitTxn {
	tx: Transaction,
	errored: bool,
}

/// Spec.md §5: "the core runs single-threaded per connection... a
/// connection holds at most one active transaction. Statements on the
/// same connection are serialized by the connection itself." `Session`
/// is that serialization point: every statement runs to completion
/// (including, for SELECT, materializing its rows into the returned
/// [`Response`]) before the next one starts.
pub struct Session {
	ds: Arc<Datastore>,
	explicit: Option<ExplicitTxn>,
}

impl Session {
	/// Parses `sql` (which may hold more than one `;`-separated
	/// statement) and runs every statement in order, each against its own
	/// freshly bound and prepared stream or catalog mutation, returning
	/// one [`Response`] per statement.
	///
	/// `params` is shared by every statement in `sql` — a single
	/// positional/named parameter set applies across the whole batch, the
	/// way a single prepared-statement call site would supply one.
	pub fn execute(&mut self, sql: &str, params: &Params) -> Result<Vec<Response>> {
		let query = Parser::parse_query(sql)?;
		let mut out = Vec::with_capacity(query.statements.len());
		for stmt in query.statements {
			out.push(self.execute_one(stmt, params)?);
		}
		Ok(out)
	}

	fn execute_one(&mut self, stmt: Statement, params: &Params) -> Result<Response> {
		if let Some(explicit) = &self.explicit {
			if explicit.errored && !matches!(stmt, Statement::Rollback) {
				return Err(Error::TransactionErrored);
			}
		}

		match stmt {
			Statement::Begin { read_only } => return self.begin(read_only),
			Statement::Commit => return self.commit(),
			Statement::Rollback => return self.rollback(),
			_ => {}
		}

		if let Some(ExplicitTxn { tx, .. }) = self.explicit.take() {
			if !stmt.is_read_only() && !tx.is_writable() {
				self.explicit = Some(ExplicitTxn { tx, errored: true });
				return Err(Error::ReadOnlyTransaction);
			}
			let mut stmt = stmt;
			let cell = RefCell::new(tx);
			let outcome = run_statement(&cell, &mut stmt, params);
			let tx = cell.into_inner();
			let errored = outcome.is_err();
			self.explicit = Some(ExplicitTxn { tx, errored });
			let (columns, rows, applied) = outcome?;
			Ok(Response::shared(columns, rows, applied))
		} else {
			let write = !stmt.is_read_only();
			let tx = self.ds.transaction(write)?;
			let mut stmt = stmt;
			let cell = RefCell::new(tx);
			match run_statement(&cell, &mut stmt, params) {
				Ok((columns, rows, applied)) => {
					// Closed eagerly, right here, rather than left for the
					// caller's `Response::close()`/`Drop`: `execute` may run
					// several statements from one `;`-batch before it ever
					// returns to the caller, and each one-shot statement
					// takes the datastore's single writer slot for the
					// lifetime of its transaction (spec.md §5). Leaving it
					// open until the caller closes the `Response` would
					// make every multi-write batch deadlock against its own
					// later statements before the caller ever gets a chance
					// to close anything.
					let mut tx = cell.into_inner();
					if tx.is_writable() {
						tx.commit()?;
					} else {
						tx.rollback()?;
					}
					Ok(Response::shared(columns, rows, applied))
				}
				Err(e) => {
					let mut tx = cell.into_inner();
					let _ = tx.rollback();
					Err(e)
				}
			}
		}
	}

	fn begin(&mut self, read_only: bool) -> Result<Response> {
		if self.explicit.is_some() {
			return Err(Error::in_operator("BEGIN", "a transaction is already open on this connection"));
		}
		let tx = self.ds.transaction(!read_only)?;
		self.explicit = Some(ExplicitTxn { tx, errored: false });
		Ok(Response::control())
	}

	fn commit(&mut self) -> Result<Response> {
		let ExplicitTxn { mut tx, errored } =
			self.explicit.take().ok_or_else(|| Error::in_operator("COMMIT", "no transaction is open"))?;
		if errored {
			let _ = tx.rollback();
			return Err(Error::TransactionErrored);
		}
		tx.commit()?;
		Ok(Response::control())
	}

	fn rollback(&mut self) -> Result<Response> {
		let ExplicitTxn { mut tx, .. } =
			self.explicit.take().ok_or_else(|| Error::in_operator("ROLLBACK", "no transaction is open"))?;
		tx.rollback()?;
		Ok(Response::control())
	}
}

/// Binds, prepares and runs one statement against `tx`, returning its
/// output columns, materialized rows, and whether a conditional
/// `IF EXISTS`/`IF NOT EXISTS` DDL statement applied. Never called for
/// `BEGIN`/`COMMIT`/`ROLLBACK`, which `Session` handles directly.
fn run_statement(tx: &RefCell<Transaction>, stmt: &mut Statement, params: &Params) -> Result<(Vec<String>, Vec<crate::ast::Row>, bool)> {
	{
		let borrowed = tx.borrow();
		Binder::new(&*borrowed).bind(stmt)?;
	}

	match stmt {
		Statement::Select(_) | Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_) => run_dml(tx, stmt, params),
		Statement::CreateTable(s) => {
			let info = TableInfo { name: s.name.clone(), columns: s.columns.clone(), constraints: s.constraints.clone() };
			let if_not_exists = s.if_not_exists;
			run_conditional(if_not_exists, |tx| create_table(tx, info))(&mut *tx.borrow_mut())
		}
		Statement::CreateIndex(s) => {
			let info = IndexInfo { name: s.name.clone(), table: s.table.clone(), columns: s.columns.clone(), unique: s.unique, is_primary_key: false };
			let if_not_exists = s.if_not_exists;
			run_conditional(if_not_exists, |tx| CatalogWriter::create_index(tx, info))(&mut *tx.borrow_mut())
		}
		Statement::CreateSequence(s) => {
			let resolved: ResolvedSequence = s.options.resolve(DEFAULT_SEQUENCE_CACHE);
			let info = SequenceInfo { name: s.name.clone(), resolved };
			let if_not_exists = s.if_not_exists;
			run_conditional(if_not_exists, |tx| CatalogWriter::create_sequence(tx, info))(&mut *tx.borrow_mut())
		}
		Statement::DropTable { name, if_exists } => run_conditional(*if_exists, |tx| CatalogWriter::drop_table(tx, name))(&mut *tx.borrow_mut()),
		Statement::DropIndex { name, if_exists } => run_conditional(*if_exists, |tx| CatalogWriter::drop_index(tx, name))(&mut *tx.borrow_mut()),
		Statement::DropSequence { name, if_exists } => run_conditional(*if_exists, |tx| CatalogWriter::drop_sequence(tx, name))(&mut *tx.borrow_mut()),
		Statement::AlterTableRename { table, new_name } => {
			let mut tx = tx.borrow_mut();
			CatalogWriter::rename_table(&mut *tx, table, new_name)?;
			Ok((Vec::new(), Vec::new(), true))
		}
		Statement::AlterTableAddColumn { table, column } => run_alter_add_column(tx, table, column, params),
		Statement::Reindex { index } => run_reindex(tx, index.as_deref(), params),
		Statement::Explain(inner) => run_explain(tx, inner, params),
		Statement::Begin { .. } | Statement::Commit | Statement::Rollback => {
			unreachable!("BEGIN/COMMIT/ROLLBACK are handled by Session before run_statement")
		}
	}
}

/// Wraps a catalog mutation so `IF EXISTS`/`IF NOT EXISTS` convert the
/// matching `AlreadyExists`/`NotFound` failure into a successful, inert
/// `Response` instead — spec.md §7's "`IF EXISTS`/`IF NOT EXISTS` convert
/// matching not-found/already-exists failures into success at the
/// statement layer", reported as `applied: false` rather than silently
/// swallowed.
fn run_conditional<'a>(
	conditional: bool,
	f: impl FnOnce(&mut Transaction) -> Result<()> + 'a,
) -> impl FnOnce(&mut Transaction) -> Result<(Vec<String>, Vec<crate::ast::Row>, bool)> + 'a {
	move |tx| match f(tx) {
		Ok(()) => Ok((Vec::new(), Vec::new(), true)),
		Err(Error::AlreadyExists(_) | Error::NotFound(_)) if conditional => Ok((Vec::new(), Vec::new(), false)),
		Err(e) => Err(e),
	}
}

fn create_table(tx: &mut Transaction, info: TableInfo) -> Result<()> {
	let table_level_unique: Vec<Vec<String>> = info
		.constraints
		.iter()
		.filter_map(|c| match c {
			crate::ast::TableConstraint::Unique(cols) => Some(cols.clone()),
			_ => None,
		})
		.collect();
	let name = info.name.clone();
	CatalogWriter::create_table(tx, info)?;
	// `create_table` only auto-creates an index for a column-level
	// `UNIQUE`; a table-level `UNIQUE (...)` constraint has no matching
	// column to hang an automatic index off, so the statement layer
	// installs it explicitly right after the table itself exists.
	for cols in table_level_unique {
		let idx_name = format!("{name}_{}_idx", cols.join("_"));
		CatalogWriter::create_index(
			tx,
			IndexInfo { name: idx_name, table: name.clone(), columns: cols, unique: true, is_primary_key: false },
		)?;
	}
	Ok(())
}

fn run_dml(tx: &RefCell<Transaction>, stmt: &Statement, params: &Params) -> Result<(Vec<String>, Vec<crate::ast::Row>, bool)> {
	let (stream, columns) = {
		let borrowed = tx.borrow();
		lower::lower(stmt, &*borrowed)?
	};
	stream.validate()?;
	let optimized = plan::optimize(&stream, &*tx.borrow());
	let ctx = Context::new();
	let mut step = exec::build(&optimized, tx, params)?;
	let mut rows = Vec::new();
	while let Some(row) = step.next(&ctx)? {
		rows.push(row);
	}
	Ok((columns, rows, true))
}

/// `ALTER TABLE ... ADD COLUMN` (spec.md §4.9): reads the old schema and
/// index list, installs the new column in the catalog, then runs — never
/// through the planner — either a full rewrite (the new column joins the
/// primary key) or an in-place pass (it doesn't).
fn run_alter_add_column(
	tx: &RefCell<Transaction>,
	table: &str,
	column: &ColumnDef,
	params: &Params,
) -> Result<(Vec<String>, Vec<crate::ast::Row>, bool)> {
	let (old_indexes, joins_pk) = {
		let borrowed = tx.borrow();
		let indexes: Vec<String> = Catalog::list_indexes(&*borrowed, table).iter().map(|i| i.name.clone()).collect();
		(indexes, column.is_primary_key())
	};

	{
		let mut borrowed = tx.borrow_mut();
		CatalogWriter::add_column(&mut *borrowed, table, column.clone())?;
	}

	let new_indexes: Vec<String> = {
		let borrowed = tx.borrow();
		Catalog::list_indexes(&*borrowed, table).iter().map(|i| i.name.clone()).collect()
	};
	let freshly_added_indexes: Vec<String> = new_indexes.into_iter().filter(|i| !old_indexes.contains(i)).collect();

	let stream = if joins_pk {
		// the new column widened the primary key: every stored row's key
		// must be rebuilt, so every owned index is torn down and rebuilt
		// too rather than patched in place.
		let mut s = crate::plan::Stream::source(crate::plan::Op::TableScan(table.to_string()));
		for idx in &old_indexes {
			s = s.pipe(crate::plan::Op::IndexDelete(idx.clone()));
		}
		s = s
			.pipe(crate::plan::Op::TableDelete(table.to_string()))
			.pipe(crate::plan::Op::TableValidate(table.to_string()))
			.pipe(crate::plan::Op::TableGenerateKey(table.to_string()))
			.pipe(crate::plan::Op::TableInsert(table.to_string()));
		for idx in old_indexes.iter().chain(freshly_added_indexes.iter()) {
			s = s.pipe(crate::plan::Op::IndexInsert(idx.clone()));
		}
		s
	} else {
		let mut s = crate::plan::Stream::source(crate::plan::Op::TableScan(table.to_string()))
			.pipe(crate::plan::Op::TableValidate(table.to_string()))
			.pipe(crate::plan::Op::TableReplace(table.to_string()));
		for idx in &freshly_added_indexes {
			s = s.pipe(crate::plan::Op::IndexInsert(idx.clone()));
		}
		s
	};
	let stream = stream.pipe(crate::plan::Op::Discard);

	let ctx = Context::new();
	exec::run(&stream, tx, params, &ctx)?;
	Ok((Vec::new(), Vec::new(), true))
}

/// `REINDEX name?` (spec.md §4.9): truncates the named index (or every
/// index if no name given), then rebuilds each from a full table scan.
/// Bypasses the planner, the way `ALTER TABLE ... ADD COLUMN` does.
fn run_reindex(tx: &RefCell<Transaction>, index: Option<&str>, params: &Params) -> Result<(Vec<String>, Vec<crate::ast::Row>, bool)> {
	let targets: Vec<IndexInfo> = {
		let borrowed = tx.borrow();
		match index {
			Some(name) => {
				let info = Catalog::get_index(&*borrowed, name).ok_or_else(|| Error::NotFound(name.to_string()))?;
				vec![info.clone()]
			}
			None => Catalog::list_tables(&*borrowed)
				.into_iter()
				.flat_map(|t| Catalog::list_indexes(&*borrowed, &t.name))
				.cloned()
				.collect(),
		}
	};

	let ctx = Context::new();
	for idx in &targets {
		tx.borrow_mut().truncate_index(&idx.name)?;
		let stream = crate::plan::Stream::source(crate::plan::Op::TableScan(idx.table.clone()))
			.pipe(crate::plan::Op::IndexInsert(idx.name.clone()))
			.pipe(crate::plan::Op::Discard);
		exec::run(&stream, tx, params, &ctx)?;
	}
	Ok((Vec::new(), Vec::new(), true))
}

/// `EXPLAIN stmt`: prepares and optimizes `inner` without running it,
/// returning its canonical rendering as a single `"plan"` column, single
/// row result (spec.md §4.9, §6). Restricted to wrapping a SELECT,
/// INSERT, UPDATE or DELETE — the grammar's own intent, even though
/// neither the parser nor the binder enforce it on `Explain`'s inner
/// statement.
fn run_explain(tx: &RefCell<Transaction>, inner: &mut Statement, params: &Params) -> Result<(Vec<String>, Vec<crate::ast::Row>, bool)> {
	if !matches!(inner, Statement::Select(_) | Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_)) {
		return Err(Error::in_operator("EXPLAIN", "only SELECT, INSERT, UPDATE and DELETE may be explained"));
	}
	// already bound: `run_statement`'s top-level `Binder::bind` call
	// recurses into `Explain`'s inner statement before dispatching here.
	let stream = {
		let borrowed = tx.borrow();
		lower::lower(inner, &*borrowed)?.0
	};
	let optimized = plan::optimize(&stream, &*tx.borrow());
	let plan_text = optimized.to_string();
	let columns = vec!["plan".to_string()];
	let row = crate::ast::Row::new(std::sync::Arc::from(columns.clone()), vec![crate::ast::Value::Text(plan_text)]);
	let _ = params;
	Ok((columns, vec![row], true))
}
