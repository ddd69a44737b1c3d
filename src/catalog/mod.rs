//! The catalog interface (spec component C5): schema metadata the binder,
//! planner and executor all consult, factored out behind a trait so the
//! query core never hard-codes a single storage format for it.
//!
//! Split into a read-only [`Catalog`] and a [`CatalogWriter`] that extends
//! it, mirroring the teacher's `kvs::tx::Transaction` metadata accessors
//! being available on every transaction while only a writable one may
//! mutate them.

pub mod memory;

use crate::ast::{ColumnDef, ResolvedSequence, TableConstraint};
use crate::err::Result;

#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
	pub name: String,
	pub columns: Vec<ColumnDef>,
	pub constraints: Vec<TableConstraint>,
}

impl TableInfo {
	pub fn column(&self, name: &str) -> Option<&ColumnDef> {
		self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
	}

	/// The primary key column list: either a single `PRIMARY KEY` column
	/// option or a table-level `PRIMARY KEY (...)` constraint. spec.md
	/// requires exactly one to be present on every table.
	pub fn primary_key(&self) -> Vec<String> {
		if let Some(c) = self.columns.iter().find(|c| c.is_primary_key()) {
			return vec![c.name.clone()];
		}
		self.constraints
			.iter()
			.find_map(|c| match c {
				TableConstraint::PrimaryKey(cols) => Some(cols.clone()),
				_ => None,
			})
			.unwrap_or_default()
	}

	pub fn column_names(&self) -> Vec<String> {
		self.columns.iter().map(|c| c.name.clone()).collect()
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexInfo {
	pub name: String,
	pub table: String,
	pub columns: Vec<String>,
	pub unique: bool,
	/// `true` for the index backing a table's primary key, created
	/// implicitly by `CREATE TABLE` and never droppable directly.
	pub is_primary_key: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SequenceInfo {
	pub name: String,
	pub resolved: ResolvedSequence,
}

/// Read-only catalog access. Every lookup is by name and case-sensitive —
/// spec.md leaves case-folding of identifiers to the scanner
/// (`scan_ident` upper-cases keywords, not user identifiers).
pub trait Catalog {
	fn get_table(&self, name: &str) -> Option<&TableInfo>;
	fn list_tables(&self) -> Vec<&TableInfo>;

	fn get_index(&self, name: &str) -> Option<&IndexInfo>;
	fn list_indexes(&self, table: &str) -> Vec<&IndexInfo>;

	fn get_sequence(&self, name: &str) -> Option<&SequenceInfo>;
}

/// Catalog mutation, available only on a writable transaction. Every
/// method validates name uniqueness/existence and reserved-table rules
/// itself so callers (the statement layer) don't have to duplicate the
/// checks spec.md section 7 requires consistent error messages for.
pub trait CatalogWriter: Catalog {
	fn create_table(&mut self, info: TableInfo) -> Result<()>;
	fn drop_table(&mut self, name: &str) -> Result<()>;
	fn rename_table(&mut self, name: &str, new_name: &str) -> Result<()>;
	fn add_column(&mut self, table: &str, column: ColumnDef) -> Result<()>;

	fn create_index(&mut self, info: IndexInfo) -> Result<()>;
	fn drop_index(&mut self, name: &str) -> Result<()>;

	fn create_sequence(&mut self, info: SequenceInfo) -> Result<()>;
	fn drop_sequence(&mut self, name: &str) -> Result<()>;
}
