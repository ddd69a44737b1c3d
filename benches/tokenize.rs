//! Scanner throughput (spec component C1), mirroring the sibling pack's
//! `usql-bench` tokenize/parse split — one benchmark file per pipeline
//! stage instead of one do-everything bench.

use caskql::syn::Lexer;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn tokenize_all(source: &str) {
	let mut lexer = Lexer::new(source);
	loop {
		let tok = lexer.next().expect("lexer failure in benchmark input");
		if tok.is_eof() {
			break;
		}
	}
}

fn tokenize(c: &mut Criterion) {
	let mut group = c.benchmark_group("tokenize");

	let short = "SELECT * FROM t WHERE a = 1";
	let long = "SELECT a, b, SUM(c) AS total FROM orders \
		WHERE status = 'open' AND amount >= 100 AND amount <= 999999 \
		GROUP BY a, b ORDER BY total DESC LIMIT 50 OFFSET 10";

	group.bench_function("short select", |b| {
		b.iter(|| tokenize_all(black_box(short)));
	});
	group.bench_function("long select", |b| {
		b.iter(|| tokenize_all(black_box(long)));
	});
}

criterion_group!(benches, tokenize);
criterion_main!(benches);
