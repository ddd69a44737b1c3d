//! Shared end-to-end test harness, analogous to the teacher's
//! `dbs::test::mock()`: a fresh in-memory [`Connection`] with a default
//! session, plus small helpers for running SQL and reading back rows
//! without every scenario test re-deriving the same boilerplate.

use caskql::ast::{Row, Value};
use caskql::err::Result;
use caskql::exec::params::Params;
use caskql::{Connection, Session};

/// A brand new, empty database with one open session.
pub fn mock() -> Session {
	Connection::new().session()
}

/// Runs `sql` (which may hold several `;`-separated statements) with no
/// bound parameters and returns every statement's materialized rows,
/// flattened in statement order. Panics on the first error, since every
/// scenario test below is asserting the happy path up to a single
/// expected failure, which callers check with [`run_err`] instead.
pub fn run(session: &mut Session, sql: &str) -> Vec<Row> {
	let responses = session.execute(sql, &Params::new()).expect("statement batch failed");
	let mut rows = Vec::new();
	for mut r in responses {
		rows.extend(r.by_ref());
		r.close().expect("closing a response failed");
	}
	rows
}

/// Runs a single statement and returns its `Result` instead of panicking,
/// for scenarios that assert a specific failure.
pub fn try_run(session: &mut Session, sql: &str) -> Result<Vec<Row>> {
	let responses = session.execute(sql, &Params::new())?;
	let mut rows = Vec::new();
	for mut r in responses {
		rows.extend(r.by_ref());
		r.close()?;
	}
	Ok(rows)
}

/// Convenience accessor: the value of `column` in `row`, panicking if
/// absent (every scenario below knows its own schema).
pub fn col<'a>(row: &'a Row, column: &str) -> &'a Value {
	row.get(column).unwrap_or_else(|| panic!("row {row} has no column `{column}`"))
}
