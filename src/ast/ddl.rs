//! Column, table and sequence definitions used by the `CREATE`/`ALTER`
//! statements in [`super::query`].

use super::expr::Expr;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
	Int,
	Float,
	Text,
	Bool,
	Blob,
}

impl fmt::Display for ColumnType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ColumnType::Int => "INT",
			ColumnType::Float => "FLOAT",
			ColumnType::Text => "TEXT",
			ColumnType::Bool => "BOOL",
			ColumnType::Blob => "BLOB",
		};
		write!(f, "{s}")
	}
}

/// A single column-level constraint. A column may carry several, in any
/// order; duplicates of the same kind are rejected by the parser (spec.md:
/// "conflicting column option").
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnOption {
	PrimaryKey,
	NotNull,
	Unique,
	Check(Expr),
	Default(Expr),
}

impl fmt::Display for ColumnOption {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ColumnOption::PrimaryKey => write!(f, "PRIMARY KEY"),
			ColumnOption::NotNull => write!(f, "NOT NULL"),
			ColumnOption::Unique => write!(f, "UNIQUE"),
			ColumnOption::Check(e) => write!(f, "CHECK ({e})"),
			ColumnOption::Default(e) => write!(f, "DEFAULT {e}"),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
	pub name: String,
	pub ty: ColumnType,
	pub options: Vec<ColumnOption>,
}

impl ColumnDef {
	pub fn is_primary_key(&self) -> bool {
		self.options.contains(&ColumnOption::PrimaryKey)
	}

	pub fn is_not_null(&self) -> bool {
		self.is_primary_key() || self.options.contains(&ColumnOption::NotNull)
	}

	pub fn is_unique(&self) -> bool {
		self.is_primary_key() || self.options.contains(&ColumnOption::Unique)
	}

	pub fn default_expr(&self) -> Option<&Expr> {
		self.options.iter().find_map(|o| match o {
			ColumnOption::Default(e) => Some(e),
			_ => None,
		})
	}

	pub fn check_exprs(&self) -> impl Iterator<Item = &Expr> {
		self.options.iter().filter_map(|o| match o {
			ColumnOption::Check(e) => Some(e),
			_ => None,
		})
	}
}

/// A table-level constraint, for constraints that span more than one
/// column (a composite primary key or a multi-column unique group).
#[derive(Clone, Debug, PartialEq)]
pub enum TableConstraint {
	PrimaryKey(Vec<String>),
	Unique(Vec<String>),
	Check(Expr),
}

/// `CREATE SEQUENCE` options. Unset fields are resolved against the
/// increment's sign: a positive increment defaults to ascending
/// (`MINVALUE 1`, `MAXVALUE i64::MAX`, starting at the minimum), a negative
/// increment defaults to descending (mirrored bounds, starting at the
/// maximum) — spec.md section 4.2.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceOptions {
	pub increment_by: i64,
	pub min_value: Option<i64>,
	pub max_value: Option<i64>,
	pub start_with: Option<i64>,
	pub cache: Option<i64>,
	pub cycle: bool,
}

impl Default for SequenceOptions {
	fn default() -> Self {
		SequenceOptions {
			increment_by: 1,
			min_value: None,
			max_value: None,
			start_with: None,
			cache: None,
			cycle: false,
		}
	}
}

/// The fully-resolved bounds and starting value a sequence runs with once
/// defaults are applied; what the catalog actually stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedSequence {
	pub increment_by: i64,
	pub min_value: i64,
	pub max_value: i64,
	pub start_with: i64,
	pub cache: i64,
	pub cycle: bool,
}

impl SequenceOptions {
	pub fn resolve(&self, default_cache: i64) -> ResolvedSequence {
		let ascending = self.increment_by >= 0;
		let (default_min, default_max) = if ascending {
			(1, i64::MAX)
		} else {
			(i64::MIN, -1)
		};
		let min_value = self.min_value.unwrap_or(default_min);
		let max_value = self.max_value.unwrap_or(default_max);
		let start_with = self.start_with.unwrap_or(if ascending { min_value } else { max_value });
		ResolvedSequence {
			increment_by: self.increment_by,
			min_value,
			max_value,
			start_with,
			cache: self.cache.unwrap_or(default_cache),
			cycle: self.cycle,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ascending_sequence_defaults_start_at_minimum() {
		let opts = SequenceOptions::default();
		let resolved = opts.resolve(1);
		assert_eq!(resolved.min_value, 1);
		assert_eq!(resolved.start_with, 1);
		assert_eq!(resolved.max_value, i64::MAX);
	}

	#[test]
	fn descending_sequence_defaults_start_at_maximum() {
		let opts = SequenceOptions {
			increment_by: -1,
			..Default::default()
		};
		let resolved = opts.resolve(1);
		assert_eq!(resolved.max_value, -1);
		assert_eq!(resolved.start_with, -1);
		assert_eq!(resolved.min_value, i64::MIN);
	}
}
