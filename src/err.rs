//! The crate-wide error type.
//!
//! Every fallible operation in the query core returns `crate::err::Result`.
//! Variants are grouped the way spec section 7 groups them: parse, bind,
//! execute, catalog, transaction. The planner is total over bound streams
//! and therefore contributes no variants of its own.

use crate::syn::token::Position;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
	// ---- Scanner -------------------------------------------------------
	#[error("{0}: bad string literal")]
	BadString(Position),
	#[error("{0}: bad escape sequence")]
	BadEscape(Position),
	#[error("{0}: bad regular expression: {1}")]
	BadRegex(Position, String),
	#[error("{0}: illegal character {1:?}")]
	Illegal(Position, char),
	#[error("{0}: bad numeric literal")]
	BadNumberLiteral(Position),
	#[error("{0}: bad parameter literal")]
	BadParamLiteral(Position),

	// ---- Parser ----------------------------------------------------------
	#[error("{position}: unexpected token {found:?}, expected one of {expected:?}")]
	UnexpectedToken {
		position: Position,
		found: String,
		expected: Vec<String>,
	},
	#[error("{0}: a single statement may not mix named and positional parameters")]
	MixedParameterStyle(Position),
	#[error("{0}: conflicting column option: {1}")]
	ConflictingOption(Position, String),
	#[error("{0}: {1}")]
	InvalidQuery(Position, String),

	// ---- Bind --------------------------------------------------------------
	#[error("table `{0}` does not exist")]
	TableNotFound(String),
	#[error("column `{0}` does not exist")]
	ColumnNotFound(String),
	#[error("no tables specified")]
	NoTableSpecified,
	#[error("cannot cast value to type `{0}`")]
	InvalidCast(String),
	#[error("table `{0}` must declare exactly one primary key")]
	MissingPrimaryKey(String),
	#[error("expected {0} values per row, found {1}")]
	ValueCountMismatch(usize, usize),
	#[error("column `{0}` must appear in GROUP BY or be used in an aggregate")]
	UngroupedColumn(String),

	// ---- Catalog -----------------------------------------------------------
	#[error("`{0}` already exists")]
	AlreadyExists(String),
	#[error("`{0}` not found")]
	NotFound(String),
	#[error("`{0}` is still referenced by `{1}` and cannot be dropped")]
	InUse(String, String),
	#[error("`{0}` is a reserved system table and cannot be modified")]
	ReservedTable(String),

	// ---- Execute -----------------------------------------------------------
	#[error("NOT NULL constraint failed for column `{0}`")]
	NotNullViolation(String),
	#[error("CHECK constraint failed: {0}")]
	CheckViolation(String),
	#[error("UNIQUE constraint failed for index `{0}`")]
	UniqueViolation(String),
	#[error("value of type `{1}` is not valid for column `{0}`")]
	TypeViolation(String, String),
	#[error("key generation failed for table `{0}`")]
	KeyGenerationFailed(String),
	#[error("sequence `{0}` exhausted")]
	SequenceExhausted(String),
	#[error("division by zero")]
	DivideByZero,
	#[error("arithmetic overflow")]
	Overflow,
	#[error("bad parameter value: {0}")]
	BadParameter(String),
	#[error("missing parameter `{0}`")]
	MissingParameter(String),
	#[error("operator `{op}` failed: {cause}")]
	Operator { op: &'static str, cause: String },
	#[error("statement cancelled")]
	Cancelled,
	#[error("deadline exceeded")]
	DeadlineExceeded,

	// ---- Transaction -----------------------------------------------------
	#[error("result already closed")]
	ResultAlreadyClosed,
	#[error("cannot write in a read-only transaction")]
	ReadOnlyTransaction,
	#[error("transaction has errored and must be rolled back")]
	TransactionErrored,
}

impl Error {
	/// Wraps an execute-time failure with the operator that produced it, the
	/// way spec section 6 requires runtime errors to carry an operator name.
	pub fn in_operator(op: &'static str, cause: impl std::fmt::Display) -> Self {
		Error::Operator {
			op,
			cause: cause.to_string(),
		}
	}
}
