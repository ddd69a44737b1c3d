//! The per-statement result (spec.md §4.9's `Result`, renamed to avoid
//! colliding with [`crate::err::Result`]): the columns and rows a
//! statement produced, plus the transaction it ran against.
//!
//! Rows are materialized eagerly at `prepare`/`run` time rather than kept
//! as a live borrow over the transaction, so `Response` can be a plain
//! owned value instead of a self-referential one (spec.md §9's "cyclic
//! references between statement and stream" note, applied here too: the
//! stream borrows the statement's expressions only while it runs, and is
//! gone by the time a `Response` exists).

use crate::kvs::Transaction;
use std::vec::IntoIter;

use crate::err::{Error, Result};

/// How a `Response` holds (or doesn't hold) the transaction it ran
/// against. `Owned` lets a `Response` carry a still-open transaction all
/// the way to the caller, who commits or rolls it back by calling
/// `close`/letting it `Drop`. `Shared` is for every case where the
/// transaction is already finished business by the time the `Response`
/// exists, so `close` here is a no-op: the explicit `BEGIN ... COMMIT`/
/// `ROLLBACK` case (the transaction lives on the `Session` across
/// multiple statements and only the matching `COMMIT`/`ROLLBACK`
/// statement actually closes it), and `Session::execute_one`'s implicit
/// one-shot case (closed eagerly, right after the statement runs, so a
/// later statement in the same `;`-batch can take the writer slot back
/// before `execute` ever returns to the caller — see its doc comment).
pub(crate) enum Backing {
	Owned(Option<Transaction>),
	Shared,
}

/// The result of running one statement: its output columns (empty for a
/// statement with no rows), the rows themselves, whether a conditional
/// `IF EXISTS`/`IF NOT EXISTS` DDL statement actually did anything, and
/// the backing transaction.
pub struct Response {
	columns: Vec<String>,
	rows: IntoIter<Row>,
	applied: bool,
	backing: Backing,
}

use crate::ast::Row;

impl Response {
	pub(crate) fn owned(columns: Vec<String>, rows: Vec<Row>, applied: bool, tx: Transaction) -> Self {
		Response { columns, rows: rows.into_iter(), applied, backing: Backing::Owned(Some(tx)) }
	}

	pub(crate) fn shared(columns: Vec<String>, rows: Vec<Row>, applied: bool) -> Self {
		Response { columns, rows: rows.into_iter(), applied, backing: Backing::Shared }
	}

	/// A response with no columns, no rows, used for `BEGIN`/`COMMIT`/
	/// `ROLLBACK`, which never have output of their own.
	pub(crate) fn control() -> Self {
		Response { columns: Vec::new(), rows: Vec::new().into_iter(), applied: true, backing: Backing::Shared }
	}

	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	/// Whether a conditional DDL statement (`IF EXISTS`/`IF NOT EXISTS`)
	/// actually performed its mutation, rather than finding the matching
	/// failure already true and silently succeeding instead.
	pub fn applied(&self) -> bool {
		self.applied
	}

	/// Commits the backing transaction if it was writable, otherwise rolls
	/// it back. A no-op for a `Response` sharing an explicit transaction
	/// still open on the `Session` — only `COMMIT`/`ROLLBACK` close those.
	/// Calling this a second time is [`Error::ResultAlreadyClosed`].
	pub fn close(&mut self) -> Result<()> {
		match &mut self.backing {
			Backing::Owned(slot) => {
				let mut tx = slot.take().ok_or(Error::ResultAlreadyClosed)?;
				if tx.is_writable() {
					tx.commit()
				} else {
					tx.rollback()
				}
			}
			Backing::Shared => Ok(()),
		}
	}
}

impl Iterator for Response {
	type Item = Row;

	fn next(&mut self) -> Option<Row> {
		self.rows.next()
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.rows.size_hint()
	}
}

impl Drop for Response {
	fn drop(&mut self) {
		if let Backing::Owned(Some(mut tx)) = std::mem::replace(&mut self.backing, Backing::Shared) {
			let result = if tx.is_writable() { tx.commit() } else { tx.rollback() };
			if let Err(e) = result {
				warn!(error = %e, "response dropped without an explicit close, and the implicit close failed");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::kvs::Datastore;

	#[test]
	fn closing_an_owned_response_twice_is_an_error() {
		let ds = Datastore::new();
		let tx = ds.transaction(false).unwrap();
		let mut r = Response::owned(vec!["a".into()], vec![], true, tx);
		r.close().unwrap();
		assert!(matches!(r.close(), Err(Error::ResultAlreadyClosed)));
	}

	#[test]
	fn closing_a_shared_response_is_always_a_no_op() {
		let mut r = Response::shared(vec![], vec![], true);
		r.close().unwrap();
		r.close().unwrap();
	}

	#[test]
	fn dropping_an_unclosed_owned_response_commits_it() {
		let ds = Datastore::new();
		let tx = ds.transaction(true).unwrap();
		{
			let _r = Response::owned(vec![], vec![], true, tx);
		}
		// the write lock released on drop proves the transaction was closed
		let tx2 = ds.transaction(true).unwrap();
		drop(tx2);
	}
}
