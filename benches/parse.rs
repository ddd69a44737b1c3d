//! Parser throughput (spec component C2) over the same short/long query
//! pair `benches/tokenize.rs` scans, so the two benchmarks are directly
//! comparable end to end.

use caskql::parser::Parser;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn parse(c: &mut Criterion) {
	let mut group = c.benchmark_group("parse");

	let short = "SELECT * FROM t WHERE a = 1";
	let long = "SELECT a, b, SUM(c) AS total FROM orders \
		WHERE status = 'open' AND amount >= 100 AND amount <= 999999 \
		GROUP BY a, b ORDER BY total DESC LIMIT 50 OFFSET 10";
	let insert = "INSERT INTO t (a, b, c) VALUES (1, 'x', 2.5), (2, 'y', 3.5) \
		ON CONFLICT DO REPLACE RETURNING a, b";

	group.bench_function("short select", |b| {
		b.iter(|| black_box(Parser::parse_query(black_box(short)).unwrap()));
	});
	group.bench_function("long select", |b| {
		b.iter(|| black_box(Parser::parse_query(black_box(long)).unwrap()));
	});
	group.bench_function("insert", |b| {
		b.iter(|| black_box(Parser::parse_query(black_box(insert)).unwrap()));
	});
}

criterion_group!(benches, parse);
criterion_main!(benches);
