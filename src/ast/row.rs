//! A single row: an ordered mapping from column name to value.
//!
//! Column order is always the owning table's schema order (spec.md's data
//! model); `Row` keeps names and values as parallel vectors rather than a
//! hash map so iteration order is never accidental.

use super::value::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
	columns: Arc<[String]>,
	values: Vec<Value>,
}

impl Row {
	pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
		debug_assert_eq!(columns.len(), values.len());
		Row { columns, values }
	}

	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}

	pub fn into_values(self) -> Vec<Value> {
		self.values
	}

	pub fn get(&self, column: &str) -> Option<&Value> {
		self.columns
			.iter()
			.position(|c| c.eq_ignore_ascii_case(column))
			.map(|i| &self.values[i])
	}

	pub fn set(&mut self, column: &str, value: Value) -> bool {
		if let Some(i) = self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)) {
			self.values[i] = value;
			true
		} else {
			false
		}
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.columns.iter().map(String::as_str).zip(self.values.iter())
	}
}

impl fmt::Display for Row {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{{")?;
		for (i, (name, value)) in self.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{name}: {value}")?;
		}
		write!(f, "}}")
	}
}
