//! The storage engine (spec.md §1 names this an external collaborator):
//! an ordered key/value tree per table and per index, snapshot-isolated
//! transactions, and sequence state.
//!
//! spec.md is explicit that the storage engine and the catalog are both
//! consumed, not owned, by the query core — but the core has to run
//! against *something*, so this module ships the one in-memory reference
//! backend the crate tests and examples use. [`catalog::memory`] implements
//! [`crate::catalog::Catalog`]/[`crate::catalog::CatalogWriter`] directly on
//! top of [`Transaction`] rather than introducing a second metadata store,
//! since a production deployment would point the core at its own storage
//! engine and catalog instead of this one.
//!
//! Grounded on the teacher's `kvs::tx::Transaction` (done/write/check
//! bookkeeping, a `Drop` guard that warns about an unclosed write
//! transaction) and `kvs::mem` (a whole-database in-memory backend), with
//! the teacher's async, multi-backend, clustered design collapsed to a
//! single synchronous in-memory implementation — spec.md §5 is explicit
//! that the core itself is single-threaded-per-connection and performs no
//! async scheduling.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::ast::{ResolvedSequence, Value};
use crate::catalog::{IndexInfo, SequenceInfo, TableInfo};
use crate::err::{Error, Result};
use crate::key::{self, Bytes};

/// A fully-decoded row, keyed by its primary key bytes.
pub type RowMap = BTreeMap<Bytes, Vec<u8>>;
/// An index tree: encoded index-column key -> every primary key bytes
/// sharing that key (a non-unique index may have more than one; uniqueness
/// is enforced by `index.Validate` before insert, not by this map's shape).
pub type IndexMap = BTreeMap<Bytes, Vec<Bytes>>;

#[derive(Clone)]
pub(crate) struct TableState {
	pub(crate) info: TableInfo,
	pub(crate) rows: RowMap,
}

#[derive(Clone)]
pub(crate) struct IndexState {
	pub(crate) info: IndexInfo,
	pub(crate) entries: IndexMap,
}

#[derive(Clone)]
pub(crate) struct SequenceState {
	pub(crate) info: SequenceInfo,
	/// Next value this sequence will hand out; advanced by
	/// [`Transaction::next_sequence_value`] and persisted at commit.
	pub(crate) next: i64,
}

/// The whole database: every table's rows, every index's entries, every
/// sequence's counter. Cloned wholesale on every transaction begin — fine
/// at this crate's reference scale, and exactly the copy-on-write
/// granularity spec.md §5 describes ("a statement observes a single
/// catalog snapshot taken at bind time").
#[derive(Clone, Default)]
pub(crate) struct State {
	pub(crate) tables: BTreeMap<String, TableState>,
	pub(crate) indexes: BTreeMap<String, IndexState>,
	pub(crate) sequences: BTreeMap<String, SequenceState>,
}

struct Shared {
	state: State,
	/// Set while a write transaction is open; a second concurrent writer
	/// is rejected rather than queued (spec.md §5: "single-writer
	/// semantics for write transactions").
	writer_held: bool,
}

/// The storage engine handle. `Arc`-shared so every [`crate::dbs::Connection`]
/// opened against the same in-memory database sees the other's commits.
pub struct Datastore {
	shared: Mutex<Shared>,
}

impl Datastore {
	pub fn new() -> Arc<Datastore> {
		let mut state = State::default();
		for name in crate::cnf::SYSTEM_TABLES {
			state.tables.insert(
				name.to_string(),
				TableState {
					info: crate::catalog::memory::system_table_info(name),
					rows: Default::default(),
				},
			);
		}
		Arc::new(Datastore {
			shared: Mutex::new(Shared { state, writer_held: false }),
		})
	}

	/// Begins a transaction. A write transaction takes the single writer
	/// slot for its lifetime (released on commit, rollback, or drop); a
	/// read transaction only ever takes a snapshot and never blocks.
	pub fn transaction(self: &Arc<Self>, write: bool) -> Result<Transaction> {
		let mut shared = self.shared.lock().expect("datastore mutex poisoned");
		if write {
			if shared.writer_held {
				return Err(Error::in_operator("begin", "a write transaction is already open"));
			}
			shared.writer_held = true;
		}
		Ok(Transaction {
			ds: Arc::clone(self),
			write,
			state: shared.state.clone(),
			done: false,
		})
	}
}

/// A snapshot-isolated transaction (spec.md §5). Reads always see the
/// state as of [`Datastore::transaction`]; writes accumulate in `state`
/// and only become visible to new transactions at [`Transaction::commit`].
pub struct Transaction {
	ds: Arc<Datastore>,
	write: bool,
	pub(crate) state: State,
	done: bool,
}

impl Transaction {
	pub fn is_writable(&self) -> bool {
		self.write
	}

	pub fn is_done(&self) -> bool {
		self.done
	}

	pub fn commit(&mut self) -> Result<()> {
		if self.done {
			return Err(Error::ResultAlreadyClosed);
		}
		self.done = true;
		if self.write {
			let mut shared = self.ds.shared.lock().expect("datastore mutex poisoned");
			shared.state = self.state.clone();
			shared.writer_held = false;
		}
		Ok(())
	}

	pub fn rollback(&mut self) -> Result<()> {
		if self.done {
			return Err(Error::ResultAlreadyClosed);
		}
		self.done = true;
		if self.write {
			let mut shared = self.ds.shared.lock().expect("datastore mutex poisoned");
			shared.writer_held = false;
		}
		Ok(())
	}

	// ---- row storage, consumed by the executor (spec component C8) ------

	pub(crate) fn scan_table(&self, table: &str) -> impl Iterator<Item = (&Bytes, &Vec<u8>)> {
		self.state.tables.get(table).into_iter().flat_map(|t| t.rows.iter())
	}

	pub(crate) fn get_row(&self, table: &str, pk: &[u8]) -> Option<&Vec<u8>> {
		self.state.tables.get(table)?.rows.get(pk)
	}

	pub(crate) fn put_row(&mut self, table: &str, pk: Bytes, val: Vec<u8>) -> Result<()> {
		let t = self
			.state
			.tables
			.get_mut(table)
			.ok_or_else(|| Error::NotFound(table.to_string()))?;
		t.rows.insert(pk, val);
		Ok(())
	}

	pub(crate) fn delete_row(&mut self, table: &str, pk: &[u8]) -> Result<()> {
		let t = self
			.state
			.tables
			.get_mut(table)
			.ok_or_else(|| Error::NotFound(table.to_string()))?;
		t.rows.remove(pk);
		Ok(())
	}

	pub(crate) fn row_count(&self, table: &str) -> usize {
		self.state.tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
	}

	// ---- index storage ---------------------------------------------------

	pub(crate) fn scan_index(&self, index: &str) -> impl DoubleEndedIterator<Item = (&Bytes, &Vec<Bytes>)> {
		self.state.indexes.get(index).into_iter().flat_map(|i| i.entries.iter())
	}

	pub(crate) fn index_contains_key(&self, index: &str, key: &[u8]) -> bool {
		self.state
			.indexes
			.get(index)
			.map(|i| i.entries.contains_key(key))
			.unwrap_or(false)
	}

	pub(crate) fn put_index_entry(&mut self, index: &str, key: Bytes, pk: Bytes) -> Result<()> {
		let i = self
			.state
			.indexes
			.get_mut(index)
			.ok_or_else(|| Error::NotFound(index.to_string()))?;
		let pks = i.entries.entry(key).or_default();
		if !pks.contains(&pk) {
			pks.push(pk);
		}
		Ok(())
	}

	pub(crate) fn delete_index_entry(&mut self, index: &str, key: &[u8], pk: &[u8]) -> Result<()> {
		let i = self
			.state
			.indexes
			.get_mut(index)
			.ok_or_else(|| Error::NotFound(index.to_string()))?;
		if let Some(pks) = i.entries.get_mut(key) {
			pks.retain(|p| p != pk);
			if pks.is_empty() {
				i.entries.remove(key);
			}
		}
		Ok(())
	}

	pub(crate) fn truncate_index(&mut self, index: &str) -> Result<()> {
		let i = self
			.state
			.indexes
			.get_mut(index)
			.ok_or_else(|| Error::NotFound(index.to_string()))?;
		i.entries.clear();
		Ok(())
	}

	// ---- sequences ---------------------------------------------------------

	/// Advances `name` by its configured increment and returns the value
	/// handed out. `NO CYCLE` exhaustion is [`Error::SequenceExhausted`];
	/// cached-but-unused values lost on rollback are an accepted gap
	/// (spec.md §5, §9) since this reference backend hands out one value
	/// at a time rather than pre-reserving a cache block.
	pub(crate) fn next_sequence_value(&mut self, name: &str) -> Result<i64> {
		let seq = self
			.state
			.sequences
			.get_mut(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;
		if !in_bounds(&seq.info.resolved, seq.next) {
			if seq.info.resolved.cycle {
				seq.next = if seq.info.resolved.increment_by >= 0 {
					seq.info.resolved.min_value
				} else {
					seq.info.resolved.max_value
				};
			} else {
				return Err(Error::SequenceExhausted(name.to_string()));
			}
		}
		let value = seq.next;
		seq.next = value.saturating_add(seq.info.resolved.increment_by);
		self.sync_system_tables()?;
		Ok(value)
	}

	// ---- system tables (spec.md §6/§8) -------------------------------------

	/// Rebuilds `__catalog`'s and `__sequence`'s backing rows from the
	/// current catalog state, so an ordinary `table.Scan("__catalog")` sees
	/// an up-to-date listing with no special-casing in the executor. Called
	/// at the end of every [`crate::catalog::CatalogWriter`] method that
	/// adds, removes, or renames a table/index/sequence, and from
	/// [`Transaction::next_sequence_value`] so `__sequence.current` tracks
	/// live counters.
	pub(crate) fn sync_system_tables(&mut self) -> Result<()> {
		let mut catalog_rows: RowMap = BTreeMap::new();
		for t in self.state.tables.values() {
			let values = vec![Value::Text(t.info.name.clone()), Value::Text("table".into())];
			catalog_rows.insert(key::encode(&values[..1])?, key::encode_row(&values)?);
		}
		for i in self.state.indexes.values() {
			let values = vec![Value::Text(i.info.name.clone()), Value::Text("index".into())];
			catalog_rows.insert(key::encode(&values[..1])?, key::encode_row(&values)?);
		}
		for s in self.state.sequences.values() {
			let values = vec![Value::Text(s.info.name.clone()), Value::Text("sequence".into())];
			catalog_rows.insert(key::encode(&values[..1])?, key::encode_row(&values)?);
		}

		let mut sequence_rows: RowMap = BTreeMap::new();
		for s in self.state.sequences.values() {
			let values = vec![Value::Text(s.info.name.clone()), Value::Int(s.next)];
			sequence_rows.insert(key::encode(&values[..1])?, key::encode_row(&values)?);
		}

		if let Some(t) = self.state.tables.get_mut("__catalog") {
			t.rows = catalog_rows;
		}
		if let Some(t) = self.state.tables.get_mut("__sequence") {
			t.rows = sequence_rows;
		}
		Ok(())
	}
}

fn in_bounds(r: &ResolvedSequence, v: i64) -> bool {
	v >= r.min_value && v <= r.max_value
}

impl Drop for Transaction {
	fn drop(&mut self) {
		if !self.done && self.write {
			if std::thread::panicking() {
				return;
			}
			warn!("a write transaction was dropped without being committed or rolled back");
			let mut shared = self.ds.shared.lock().expect("datastore mutex poisoned");
			shared.writer_held = false;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ast::ColumnDef;
	use crate::catalog::CatalogWriter;

	#[test]
	fn write_transaction_is_exclusive() {
		let ds = Datastore::new();
		let _tx1 = ds.transaction(true).unwrap();
		assert!(ds.transaction(true).is_err());
	}

	#[test]
	fn commit_makes_rows_visible_to_later_transactions() {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(TableInfo {
			name: "t".into(),
			columns: vec![ColumnDef {
				name: "a".into(),
				ty: crate::ast::ColumnType::Int,
				options: vec![crate::ast::ColumnOption::PrimaryKey],
			}],
			constraints: vec![],
		})
		.unwrap();
		tx.put_row("t", vec![1], vec![2]).unwrap();
		tx.commit().unwrap();

		let tx2 = ds.transaction(false).unwrap();
		assert_eq!(tx2.get_row("t", &[1]), Some(&vec![2]));
	}

	#[test]
	fn rollback_discards_writes() {
		let ds = Datastore::new();
		let mut tx = ds.transaction(true).unwrap();
		tx.create_table(TableInfo {
			name: "t".into(),
			columns: vec![],
			constraints: vec![],
		})
		.unwrap();
		tx.rollback().unwrap();

		let tx2 = ds.transaction(false).unwrap();
		assert!(tx2.get_table("t").is_none());
	}
}
