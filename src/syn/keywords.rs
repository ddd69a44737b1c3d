//! Case-insensitive keyword lookup.
//!
//! The teacher's lexer uses a `phf` perfect-hash map behind its
//! `experimental-parser` feature; our keyword set is small enough that a
//! plain match on the upper-cased identifier is just as fast and doesn't
//! pull in a build-time code generator for a few dozen entries.

use super::token::Keyword;

pub fn lookup(ident: &str) -> Option<Keyword> {
	use Keyword::*;
	// `ident` case-folded once by the caller.
	Some(match ident {
		"SELECT" => Select,
		"INSERT" => Insert,
		"UPDATE" => Update,
		"DELETE" => Delete,
		"FROM" => From,
		"INTO" => Into,
		"VALUES" => Values,
		"SET" => Set,
		"WHERE" => Where,
		"GROUP" => Group,
		"ORDER" => Order,
		"BY" => By,
		"LIMIT" => Limit,
		"OFFSET" => Offset,
		"DISTINCT" => Distinct,
		"UNION" => Union,
		"ALL" => All,
		"AS" => As,
		"ON" => On,
		"CONFLICT" => Conflict,
		"DO" => Do,
		"NOTHING" => Nothing,
		"REPLACE" => Replace,
		"IGNORE" => Ignore,
		"RETURNING" => Returning,
		"CREATE" => Create,
		"TABLE" => Table,
		"INDEX" => Index,
		"SEQUENCE" => Sequence,
		"DROP" => Drop,
		"ALTER" => Alter,
		"RENAME" => Rename,
		"TO" => To,
		"ADD" => Add,
		"COLUMN" => Column,
		"IF" => If,
		"NOT" => Not,
		"EXISTS" => Exists,
		"UNIQUE" => Unique,
		"PRIMARY" => Primary,
		"KEY" => Key,
		"CHECK" => Check,
		"DEFAULT" => Default,
		"REFERENCES" => References,
		"INCREMENT" => Increment,
		"MINVALUE" => Minvalue,
		"MAXVALUE" => Maxvalue,
		"START" => Start,
		"WITH" => With,
		"CACHE" => Cache,
		"CYCLE" => Cycle,
		"NO" => No,
		"DESC" => Desc,
		"ASC" => Asc,
		"REINDEX" => Reindex,
		"BEGIN" => Begin,
		"TRANSACTION" => Transaction,
		"COMMIT" => Commit,
		"ROLLBACK" => Rollback,
		"READ" => Read,
		"ONLY" => Only,
		"WRITE" => Write,
		"EXPLAIN" => Explain,
		"AND" => And,
		"OR" => Or,
		"IS" => Is,
		"IN" => In,
		"LIKE" => Like,
		"BETWEEN" => Between,
		"NULL" => Null,
		"TRUE" => True,
		"FALSE" => False,
		"CAST" => Cast,
		"NEXT" => Next,
		"VALUE" => Value,
		"FOR" => For,
		"COUNT" => Count,
		"MIN" => Min,
		"MAX" => Max,
		"SUM" => Sum,
		"AVG" => Avg,
		_ => return None,
	})
}

/// Words that, syntactically, could also be used as a bare identifier in
/// some positions (used by the parser to give better "did you mean to quote
/// this" diagnostics). Kept narrow on purpose: most keywords above are
/// reserved everywhere a column/table name is expected.
pub fn could_be_reserved(ident: &str) -> bool {
	lookup(&ident.to_ascii_uppercase()).is_some()
}
