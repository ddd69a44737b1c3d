//! The executor's [`Environment`] implementation: resolves column
//! references against the row currently flowing through the stream,
//! parameters against the statement's bound [`Params`], and `NEXT VALUE
//! FOR` against the transaction's sequence state.
//!
//! Grounded on the teacher's `dbs::Options`/`doc::Document` split between
//! "what a statement was called with" and "the row being processed",
//! collapsed into one struct since this dialect has no document, only a
//! row.
//!
//! `next_sequence_value` takes `&self` on [`crate::ast::Environment`] even
//! though advancing a sequence mutates transaction state, so `tx` is a
//! shared `RefCell` rather than `&mut Transaction`: interior mutability at
//! this one seam, nowhere else.

use std::cell::RefCell;

use crate::ast::{Environment, Row, Value};
use crate::err::Result;
use crate::kvs::Transaction;

use super::params::Params;

pub struct Env<'a> {
	tx: &'a RefCell<Transaction>,
	params: &'a Params,
	row: Option<Row>,
}

impl<'a> Env<'a> {
	pub fn new(tx: &'a RefCell<Transaction>, params: &'a Params) -> Self {
		Env { tx, params, row: None }
	}

	pub fn with_row(tx: &'a RefCell<Transaction>, params: &'a Params, row: Row) -> Self {
		Env { tx, params, row: Some(row) }
	}

	pub fn set_row(&mut self, row: Row) {
		self.row = Some(row);
	}

	pub fn row(&self) -> Option<&Row> {
		self.row.as_ref()
	}
}

impl<'a> Environment for Env<'a> {
	fn current_row(&self) -> Option<&Row> {
		self.row.as_ref()
	}

	fn positional_param(&self, index: u32) -> Result<Value> {
		self.params.positional(index)
	}

	fn named_param(&self, name: &str) -> Result<Value> {
		self.params.named(name)
	}

	fn next_sequence_value(&self, name: &str) -> Result<Value> {
		self.tx.borrow_mut().next_sequence_value(name).map(Value::Int)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ast::{ColumnDef, ColumnOption, ColumnType};
	use crate::catalog::CatalogWriter;
	use crate::kvs::Datastore;

	#[test]
	fn next_sequence_value_advances_through_a_shared_ref_cell() {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(crate::catalog::TableInfo {
			name: "t".into(),
			columns: vec![ColumnDef { name: "pk".into(), ty: ColumnType::Int, options: vec![ColumnOption::PrimaryKey] }],
			constraints: vec![],
		})
		.unwrap();
		let cell = RefCell::new(tx);
		let params = Params::new();
		let env = Env::new(&cell, &params);
		assert_eq!(env.next_sequence_value("t_seq").unwrap(), Value::Int(1));
		assert_eq!(env.next_sequence_value("t_seq").unwrap(), Value::Int(2));
	}
}
