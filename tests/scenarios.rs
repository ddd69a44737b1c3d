//! End-to-end scenario tests straight out of spec.md section 8's seed
//! list: literal SQL in, literal rows/errors out, run against the crate's
//! public [`caskql::Connection`]/[`caskql::Session`] surface rather than
//! any internal module, the way a real embedder would exercise it.

mod common;

use caskql::ast::Value;
use caskql::err::Error;
use common::{col, mock, run, try_run};

#[test]
fn alter_rename_visibility() {
	let mut s = mock();
	let rows = run(
		&mut s,
		"CREATE TABLE foo(name TEXT PRIMARY KEY, age INT); \
		 INSERT INTO foo VALUES ('John Doe', 99); \
		 ALTER TABLE foo RENAME TO bar; \
		 SELECT * FROM bar;",
	);
	assert_eq!(rows.len(), 1);
	assert_eq!(col(&rows[0], "name"), &Value::Text("John Doe".into()));
	assert_eq!(col(&rows[0], "age"), &Value::Int(99));

	assert!(matches!(try_run(&mut s, "ALTER TABLE foo RENAME TO foo"), Err(Error::NotFound(_))));
	assert!(matches!(try_run(&mut s, "SELECT * FROM foo"), Err(Error::TableNotFound(_))));
	assert!(try_run(&mut s, "ALTER TABLE __catalog RENAME TO bar").is_err());
}

#[test]
fn drop_table_cascades_owned_index_and_sequence() {
	let mut s = mock();
	run(
		&mut s,
		"CREATE TABLE t1(pk INT PRIMARY KEY, a INT UNIQUE); \
		 CREATE TABLE t2(pk INT PRIMARY KEY, a INT); \
		 DROP TABLE t1;",
	);

	let mut names: Vec<String> = run(&mut s, "SELECT name FROM __catalog WHERE kind = 'table'")
		.into_iter()
		.map(|r| match col(&r, "name") {
			Value::Text(t) => t.clone(),
			other => panic!("unexpected name value: {other:?}"),
		})
		.collect();
	names.sort();
	assert_eq!(names, vec!["__catalog", "__sequence", "t2"]);

	assert!(run(&mut s, "SELECT name FROM __catalog WHERE name = 't1_a_idx'").is_empty());
	assert!(run(&mut s, "SELECT name FROM __sequence WHERE name = 't1_seq'").is_empty());
	assert!(try_run(&mut s, "DROP TABLE __catalog").is_err());
}

#[test]
fn on_conflict_do_replace_overwrites_the_primary_key_row() {
	let mut s = mock();
	let rows = run(
		&mut s,
		"CREATE TABLE t(a INT PRIMARY KEY, b INT); \
		 INSERT INTO t VALUES (1,1); \
		 INSERT INTO t (a,b) VALUES (1,2) ON CONFLICT DO REPLACE; \
		 SELECT * FROM t;",
	);
	assert_eq!(rows.len(), 1);
	assert_eq!(col(&rows[0], "a"), &Value::Int(1));
	assert_eq!(col(&rows[0], "b"), &Value::Int(2));
}

#[test]
fn delete_with_order_by_limit_offset_removes_the_middle_row() {
	let mut s = mock();
	run(
		&mut s,
		"CREATE TABLE test(n INT PRIMARY KEY); \
		 INSERT INTO test VALUES (3), (2), (1);",
	);
	run(&mut s, "DELETE FROM test ORDER BY n LIMIT 1 OFFSET 1;");

	let mut remaining: Vec<i64> = run(&mut s, "SELECT * FROM test")
		.into_iter()
		.map(|r| match col(&r, "n") {
			Value::Int(n) => *n,
			other => panic!("unexpected n value: {other:?}"),
		})
		.collect();
	remaining.sort();
	assert_eq!(remaining, vec![1, 3]);
}

#[test]
fn explain_update_chooses_index_scan_over_a_table_scan() {
	let mut s = mock();
	run(&mut s, "CREATE TABLE test(pk INT PRIMARY KEY, a INT); CREATE INDEX idx_a ON test(a);");

	let rows = run(&mut s, "EXPLAIN UPDATE test SET a=10 WHERE a>10");
	assert_eq!(rows.len(), 1);
	let plan = match col(&rows[0], "plan") {
		Value::Text(p) => p.clone(),
		other => panic!("unexpected plan value: {other:?}"),
	};
	assert!(plan.starts_with("index.Scan(\"idx_a\""), "plan did not open on an index scan: {plan}");
	assert!(!plan.contains("rows.Filter"), "plan still carries a redundant filter: {plan}");
	assert!(plan.ends_with("discard()"), "plan: {plan}");

	// table.Validate must precede index.Delete (spec.md §8 scenario 5's
	// literal rendering), which must precede table.Replace, which must
	// precede index.Insert — not just all be present somewhere.
	let validate_at = plan.find("table.Validate(\"test\")").expect("missing table.Validate");
	let delete_at = plan.find("index.Delete(\"idx_a\")").expect("missing index.Delete");
	let replace_at = plan.find("table.Replace(\"test\")").expect("missing table.Replace");
	let insert_at = plan.find("index.Insert(\"idx_a\")").expect("missing index.Insert");
	assert!(
		validate_at < delete_at && delete_at < replace_at && replace_at < insert_at,
		"plan ops out of order: {plan}"
	);
}

#[test]
fn explain_never_executes_the_inner_statement() {
	let mut s = mock();
	run(&mut s, "CREATE TABLE test(pk INT PRIMARY KEY, a INT);");
	run(&mut s, "EXPLAIN INSERT INTO test VALUES (1, 1)");
	assert!(run(&mut s, "SELECT * FROM test").is_empty());
}

#[test]
fn unique_violation_rolls_back_the_whole_insert() {
	let mut s = mock();
	run(&mut s, "CREATE TABLE t(a INT UNIQUE);");
	assert!(try_run(&mut s, "INSERT INTO t (a) VALUES (1),(1);").is_err());
	assert!(run(&mut s, "SELECT * FROM t;").is_empty());
}

#[test]
fn explicit_transaction_rollback_discards_every_statement_since_begin() {
	let mut s = mock();
	run(&mut s, "CREATE TABLE t(a INT PRIMARY KEY);");
	run(&mut s, "BEGIN; INSERT INTO t VALUES (1); ROLLBACK;");
	assert!(run(&mut s, "SELECT * FROM t").is_empty());
}

#[test]
fn read_only_transaction_rejects_writes() {
	let mut s = mock();
	run(&mut s, "CREATE TABLE t(a INT PRIMARY KEY);");
	run(&mut s, "BEGIN READ ONLY;");
	assert!(matches!(try_run(&mut s, "INSERT INTO t VALUES (1)"), Err(Error::ReadOnlyTransaction)));
	run(&mut s, "ROLLBACK;");
}

#[test]
fn union_deduplicates_while_union_all_keeps_the_multiset() {
	let mut s = mock();
	run(&mut s, "CREATE TABLE t(n INT PRIMARY KEY); INSERT INTO t VALUES (1), (2);");

	let mut union: Vec<i64> =
		run(&mut s, "SELECT n FROM t WHERE n = 1 UNION SELECT n FROM t WHERE n = 1 OR n = 2")
			.into_iter()
			.map(|r| match col(&r, "n") {
				Value::Int(n) => *n,
				other => panic!("unexpected n value: {other:?}"),
			})
			.collect();
	union.sort();
	assert_eq!(union, vec![1, 2]);

	let union_all = run(&mut s, "SELECT n FROM t WHERE n = 1 UNION ALL SELECT n FROM t WHERE n = 1");
	assert_eq!(union_all.len(), 2);
}

#[test]
fn group_by_aggregates_per_group() {
	let mut s = mock();
	run(
		&mut s,
		"CREATE TABLE sales(id INT PRIMARY KEY, region TEXT, amount INT); \
		 INSERT INTO sales VALUES (1, 'east', 10), (2, 'east', 20), (3, 'west', 5);",
	);
	let rows = run(&mut s, "SELECT region, SUM(amount) AS total FROM sales GROUP BY region ORDER BY region");
	assert_eq!(rows.len(), 2);
	assert_eq!(col(&rows[0], "region"), &Value::Text("east".into()));
	assert_eq!(col(&rows[0], "total"), &Value::Int(30));
	assert_eq!(col(&rows[1], "region"), &Value::Text("west".into()));
	assert_eq!(col(&rows[1], "total"), &Value::Int(5));
}

#[test]
fn sequences_advance_and_reindex_rebuilds_an_index() {
	let mut s = mock();
	run(
		&mut s,
		"CREATE SEQUENCE seq_ids START WITH 1; \
		 CREATE TABLE t(id INT PRIMARY KEY, a INT); \
		 INSERT INTO t VALUES (NEXT VALUE FOR seq_ids, 1), (NEXT VALUE FOR seq_ids, 2);",
	);
	let mut ids: Vec<i64> = run(&mut s, "SELECT id FROM t")
		.into_iter()
		.map(|r| match col(&r, "id") {
			Value::Int(n) => *n,
			other => panic!("unexpected id value: {other:?}"),
		})
		.collect();
	ids.sort();
	assert_eq!(ids, vec![1, 2]);

	run(&mut s, "CREATE INDEX idx_a ON t(a); REINDEX idx_a;");
	let rows = run(&mut s, "SELECT * FROM t WHERE a = 2");
	assert_eq!(rows.len(), 1);
}

#[test]
fn like_between_and_cast_evaluate_as_expected() {
	let mut s = mock();
	run(
		&mut s,
		"CREATE TABLE t(id INT PRIMARY KEY, name TEXT, n INT); \
		 INSERT INTO t VALUES (1, 'Alice', 5), (2, 'Bob', 15), (3, 'Alicia', 25);",
	);

	let mut like_names: Vec<String> = run(&mut s, "SELECT name FROM t WHERE name LIKE 'Ali%'")
		.into_iter()
		.map(|r| match col(&r, "name") {
			Value::Text(t) => t.clone(),
			other => panic!("unexpected name value: {other:?}"),
		})
		.collect();
	like_names.sort();
	assert_eq!(like_names, vec!["Alice".to_string(), "Alicia".to_string()]);

	let between_rows = run(&mut s, "SELECT id FROM t WHERE n BETWEEN 10 AND 20");
	assert_eq!(between_rows.len(), 1);
	assert_eq!(col(&between_rows[0], "id"), &Value::Int(2));

	let cast_rows = run(&mut s, "SELECT CAST(n AS TEXT) AS n_text FROM t WHERE id = 1");
	assert_eq!(cast_rows.len(), 1);
	assert_eq!(col(&cast_rows[0], "n_text"), &Value::Text("5".into()));
}

#[test]
fn check_constraint_rejects_violating_rows() {
	let mut s = mock();
	run(&mut s, "CREATE TABLE t(a INT PRIMARY KEY CHECK(a > 0));");
	assert!(matches!(try_run(&mut s, "INSERT INTO t VALUES (-1)"), Err(Error::CheckViolation(_))));
	assert!(run(&mut s, "SELECT * FROM t").is_empty());
	run(&mut s, "INSERT INTO t VALUES (1)");
	assert_eq!(run(&mut s, "SELECT * FROM t").len(), 1);
}

#[test]
fn returning_projects_the_inserted_row() {
	let mut s = mock();
	let rows = run(
		&mut s,
		"CREATE TABLE t(a INT PRIMARY KEY, b INT); \
		 INSERT INTO t VALUES (1, 2) RETURNING a, b;",
	);
	assert_eq!(rows.len(), 1);
	assert_eq!(col(&rows[0], "a"), &Value::Int(1));
	assert_eq!(col(&rows[0], "b"), &Value::Int(2));
}
