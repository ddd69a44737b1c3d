//! Environment-overridable tuning constants.
//!
//! Mirrors the teacher's `cnf` module: every limit is a `once_cell::sync::Lazy`
//! populated through [`crate::lazy_env_parse`] so it can be overridden at
//! process start without a config file, and falls back to a sane default
//! when unset or unparsable.

use once_cell::sync::Lazy;

/// How deep expression parsing and evaluation (parenthesised expressions,
/// nested casts) may recurse before failing with a parse/execute error,
/// instead of overflowing the stack. See REDESIGN FLAGS in spec.md.
pub static MAX_COMPUTATION_DEPTH: Lazy<u32> =
	lazy_env_parse!("CASKQL_MAX_COMPUTATION_DEPTH", u32, 128);

/// Row count above which `TempTreeSort`/`GroupAggregate` buffering is
/// logged at `warn!` as a capacity signal. The executor does not spill to
/// disk — there is no separate tier to spill into in a single in-memory
/// backend — but operators surface when they cross this threshold so a
/// caller can see an unbounded sort/group coming.
pub static TEMP_TREE_SPILL_THRESHOLD: Lazy<usize> =
	lazy_env_parse!("CASKQL_TEMP_TREE_SPILL_THRESHOLD", usize, 50_000);

/// Default `CACHE` size for a sequence when `CREATE SEQUENCE` omits the
/// option explicitly.
pub const DEFAULT_SEQUENCE_CACHE: i64 = 1;

/// Names reserved for system catalog tables; any DDL targeting them fails
/// with [`crate::err::Error::ReservedTable`].
pub const SYSTEM_TABLES: &[&str] = &["__catalog", "__sequence"];
