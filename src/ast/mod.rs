//! The typed AST (spec component C3): values, rows, expressions and the
//! statement/query shapes the parser produces and the binder consumes.

pub mod aggregate;
pub mod ddl;
pub mod expr;
pub mod query;
pub mod row;
pub mod value;

pub use ddl::{ColumnDef, ColumnOption, ColumnType, ResolvedSequence, SequenceOptions, TableConstraint};
pub use expr::{AggregateCall, AggregateFunc, BinaryOp, CastType, ColumnRef, Environment, Expr, Walk};
pub use query::{
	Assignment, ConflictAction, ConflictClause, ConflictTarget, CreateIndexStmt,
	CreateSequenceStmt, CreateTableStmt, DeleteStmt, InsertSource, InsertStmt, OrderItem, Query,
	SelectCore, SelectSetOp, SelectStmt, Statement, TableRef, UpdateStmt,
};
pub use row::Row;
pub use value::Value;
