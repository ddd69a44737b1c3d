//! The shipped in-memory [`Catalog`]/[`CatalogWriter`] implementation,
//! layered directly on [`crate::kvs::Transaction`] rather than introducing
//! a second metadata store alongside the reference storage engine.
//!
//! Grounded on the teacher's `kvs::tx::Transaction`'s metadata accessors
//! (`get_tb`, `all_tb`, `get_ix`, ...), scoped down from SurrealDB's
//! namespace/database/table hierarchy to this spec's flat table/index/
//! sequence catalog, and on `cnf::SYSTEM_TABLES` for the two reserved
//! system table names.

use super::{Catalog, CatalogWriter, IndexInfo, SequenceInfo, TableInfo};
use crate::ast::{ColumnDef, ColumnOption, ResolvedSequence, TableConstraint};
use crate::cnf::{DEFAULT_SEQUENCE_CACHE, SYSTEM_TABLES};
use crate::err::{Error, Result};
use crate::kvs::{IndexState, SequenceState, TableState, Transaction};

/// Name of the implicit primary-key index `CREATE TABLE` installs for every
/// table, used by `index.Scan`/`index.ScanReverse` over the primary key
/// (spec.md §4.7 rule 4, "primary-key scan") and by `table.GenerateKey`.
pub fn pkey_index_name(table: &str) -> String {
	format!("{table}_pkey")
}

/// Name of the sequence `CREATE TABLE` installs for key generation
/// (spec.md §8 scenario 2 expects `t1_seq` to disappear when `t1` is
/// dropped, even though the scenario never issues `CREATE SEQUENCE`).
pub fn key_sequence_name(table: &str) -> String {
	format!("{table}_seq")
}

fn check_reserved(name: &str) -> Result<()> {
	if SYSTEM_TABLES.iter().any(|t| t.eq_ignore_ascii_case(name)) {
		return Err(Error::ReservedTable(name.to_string()));
	}
	Ok(())
}

impl Catalog for Transaction {
	fn get_table(&self, name: &str) -> Option<&TableInfo> {
		self.state.tables.get(name).map(|t| &t.info)
	}

	fn list_tables(&self) -> Vec<&TableInfo> {
		self.state.tables.values().map(|t| &t.info).collect()
	}

	fn get_index(&self, name: &str) -> Option<&IndexInfo> {
		self.state.indexes.get(name).map(|i| &i.info)
	}

	fn list_indexes(&self, table: &str) -> Vec<&IndexInfo> {
		let mut out: Vec<&IndexInfo> = self
			.state
			.indexes
			.values()
			.map(|i| &i.info)
			.filter(|i| table.is_empty() || i.table == table)
			.collect();
		out.sort_by(|a, b| a.name.cmp(&b.name));
		out
	}

	fn get_sequence(&self, name: &str) -> Option<&SequenceInfo> {
		self.state.sequences.get(name).map(|s| &s.info)
	}
}

impl CatalogWriter for Transaction {
	fn create_table(&mut self, info: TableInfo) -> Result<()> {
		check_reserved(&info.name)?;
		if self.state.tables.contains_key(&info.name) {
			return Err(Error::AlreadyExists(info.name));
		}
		let name = info.name.clone();
		let pk_cols = info.primary_key();
		let unique_cols: Vec<String> = info
			.columns
			.iter()
			.filter(|c| c.is_unique() && !c.is_primary_key())
			.map(|c| c.name.clone())
			.collect();
		self.state.tables.insert(
			name.clone(),
			TableState {
				info,
				rows: Default::default(),
			},
		);
		if !pk_cols.is_empty() {
			let idx_name = pkey_index_name(&name);
			self.state.indexes.insert(
				idx_name.clone(),
				IndexState {
					info: IndexInfo {
						name: idx_name,
						table: name.clone(),
						columns: pk_cols,
						unique: true,
						is_primary_key: true,
					},
					entries: Default::default(),
				},
			);
		}
		for col in unique_cols {
			let idx_name = format!("{name}_{col}_idx");
			self.state.indexes.insert(
				idx_name.clone(),
				IndexState {
					info: IndexInfo {
						name: idx_name,
						table: name.clone(),
						columns: vec![col],
						unique: true,
						is_primary_key: false,
					},
					entries: Default::default(),
				},
			);
		}
		let seq_name = key_sequence_name(&name);
		let resolved = ResolvedSequence {
			increment_by: 1,
			min_value: 1,
			max_value: i64::MAX,
			start_with: 1,
			cache: DEFAULT_SEQUENCE_CACHE,
			cycle: false,
		};
		self.state.sequences.insert(
			seq_name.clone(),
			SequenceState {
				info: SequenceInfo { name: seq_name, resolved },
				next: 1,
			},
		);
		self.sync_system_tables()
	}

	fn drop_table(&mut self, name: &str) -> Result<()> {
		check_reserved(name)?;
		if self.state.tables.remove(name).is_none() {
			return Err(Error::NotFound(name.to_string()));
		}
		let owned: Vec<String> = self
			.state
			.indexes
			.values()
			.filter(|i| i.info.table == name)
			.map(|i| i.info.name.clone())
			.collect();
		for idx in owned {
			self.state.indexes.remove(&idx);
		}
		self.state.sequences.remove(&key_sequence_name(name));
		self.sync_system_tables()
	}

	fn rename_table(&mut self, name: &str, new_name: &str) -> Result<()> {
		check_reserved(name)?;
		check_reserved(new_name)?;
		if self.state.tables.contains_key(new_name) {
			return Err(Error::AlreadyExists(new_name.to_string()));
		}
		let mut t = self
			.state
			.tables
			.remove(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;
		t.info.name = new_name.to_string();
		self.state.tables.insert(new_name.to_string(), t);
		for idx in self.state.indexes.values_mut() {
			if idx.info.table == name {
				idx.info.table = new_name.to_string();
			}
		}
		self.sync_system_tables()
	}

	fn add_column(&mut self, table: &str, mut column: ColumnDef) -> Result<()> {
		check_reserved(table)?;
		let t = self
			.state
			.tables
			.get_mut(table)
			.ok_or_else(|| Error::NotFound(table.to_string()))?;
		if t.info.column(&column.name).is_some() {
			return Err(Error::AlreadyExists(column.name));
		}
		// A new column that carries its own `PRIMARY KEY` option joins an
		// existing single-column key to form a composite one; normalize both
		// into one table-level constraint so `TableInfo::primary_key` (which
		// only recognizes one column-level `PrimaryKey` flag) keeps seeing a
		// single, unambiguous primary key.
		if column.is_primary_key() {
			let mut pk_cols = t.info.primary_key();
			pk_cols.push(column.name.clone());
			for c in t.info.columns.iter_mut() {
				c.options.retain(|o| !matches!(o, ColumnOption::PrimaryKey));
			}
			column.options.retain(|o| !matches!(o, ColumnOption::PrimaryKey));
			t.info.constraints.retain(|c| !matches!(c, TableConstraint::PrimaryKey(_)));
			t.info.constraints.push(TableConstraint::PrimaryKey(pk_cols));
		}
		t.info.columns.push(column);
		Ok(())
	}

	fn create_index(&mut self, info: IndexInfo) -> Result<()> {
		check_reserved(&info.table)?;
		if self.state.indexes.contains_key(&info.name) {
			return Err(Error::AlreadyExists(info.name));
		}
		if !self.state.tables.contains_key(&info.table) {
			return Err(Error::NotFound(info.table));
		}
		self.state.indexes.insert(
			info.name.clone(),
			IndexState {
				info,
				entries: Default::default(),
			},
		);
		self.sync_system_tables()
	}

	fn drop_index(&mut self, name: &str) -> Result<()> {
		let info = self
			.state
			.indexes
			.get(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;
		if info.info.is_primary_key {
			return Err(Error::InUse(name.to_string(), info.info.table.clone()));
		}
		self.state.indexes.remove(name);
		self.sync_system_tables()
	}

	fn create_sequence(&mut self, info: SequenceInfo) -> Result<()> {
		if self.state.sequences.contains_key(&info.name) {
			return Err(Error::AlreadyExists(info.name));
		}
		let next = info.resolved.start_with;
		self.state.sequences.insert(info.name.clone(), SequenceState { info, next });
		self.sync_system_tables()
	}

	fn drop_sequence(&mut self, name: &str) -> Result<()> {
		use crate::ast::Expr;
		let owner = self.state.tables.values().find(|t| {
			t.info
				.columns
				.iter()
				.any(|c| matches!(c.default_expr(), Some(Expr::NextValueFor(seq)) if seq == name))
		});
		if let Some(t) = owner {
			return Err(Error::InUse(name.to_string(), t.info.name.clone()));
		}
		if self.state.sequences.remove(name).is_none() {
			return Err(Error::NotFound(name.to_string()));
		}
		self.sync_system_tables()
	}
}

/// Builds the [`TableInfo`]/[`IndexInfo`] pair for the two reserved system
/// tables (spec.md §6), so they show up in `list_tables`/`list_indexes`
/// without needing real backing rows.
pub fn system_table_info(name: &str) -> TableInfo {
	use crate::ast::{ColumnDef, ColumnOption, ColumnType};
	match name {
		"__catalog" => TableInfo {
			name: "__catalog".into(),
			columns: vec![
				ColumnDef {
					name: "name".into(),
					ty: ColumnType::Text,
					options: vec![ColumnOption::PrimaryKey],
				},
				ColumnDef {
					name: "kind".into(),
					ty: ColumnType::Text,
					options: vec![ColumnOption::NotNull],
				},
			],
			constraints: vec![],
		},
		"__sequence" => TableInfo {
			name: "__sequence".into(),
			columns: vec![
				ColumnDef {
					name: "name".into(),
					ty: ColumnType::Text,
					options: vec![ColumnOption::PrimaryKey],
				},
				ColumnDef {
					name: "current".into(),
					ty: ColumnType::Int,
					options: vec![ColumnOption::NotNull],
				},
			],
			constraints: vec![],
		},
		other => unreachable!("not a system table: {other}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ast::{ColumnOption, ColumnType};
	use crate::kvs::Datastore;

	fn t1() -> TableInfo {
		TableInfo {
			name: "t1".into(),
			columns: vec![
				ColumnDef { name: "pk".into(), ty: ColumnType::Int, options: vec![ColumnOption::PrimaryKey] },
				ColumnDef { name: "a".into(), ty: ColumnType::Int, options: vec![ColumnOption::Unique] },
			],
			constraints: vec![],
		}
	}

	#[test]
	fn create_table_installs_pkey_index_and_sequence() {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(t1()).unwrap();
		assert!(tx.get_index("t1_pkey").is_some());
		assert!(tx.get_index("t1_a_idx").is_some());
		assert!(tx.get_sequence("t1_seq").is_some());
	}

	#[test]
	fn drop_table_cascades_owned_index_and_sequence() {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(t1()).unwrap();
		tx.create_table(TableInfo {
			name: "t2".into(),
			columns: vec![
				ColumnDef { name: "pk".into(), ty: ColumnType::Int, options: vec![ColumnOption::PrimaryKey] },
				ColumnDef { name: "a".into(), ty: ColumnType::Int, options: vec![] },
			],
			constraints: vec![],
		})
		.unwrap();
		tx.drop_table("t1").unwrap();

		let mut names: Vec<&str> = tx.list_tables().iter().map(|t| t.name.as_str()).collect();
		names.sort();
		assert_eq!(names, vec!["t2"]);
		assert!(tx.get_index("t1_pkey").is_none());
		assert!(tx.get_index("t1_a_idx").is_none());
		assert!(tx.get_sequence("t1_seq").is_none());
	}

	#[test]
	fn dropping_a_table_is_reported_as_not_found_a_second_time() {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		assert!(matches!(tx.drop_table("missing"), Err(Error::NotFound(_))));
	}

	#[test]
	fn reserved_system_tables_reject_mutation() {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		assert!(matches!(tx.create_table(system_table_info("__catalog")), Err(Error::ReservedTable(_))));
	}
}
