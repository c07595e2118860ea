use criterion::{black_box, criterion_group, criterion_main, Criterion};
use searchcore::tokenizer::analyze;

fn bench_analyze(c: &mut Criterion) {
    let text = "The quick brown fox jumps over the lazy dog. Rust's ownership model, \
                borrowing and lifetimes make systems programming safer. "
        .repeat(200);
    c.bench_function("analyze_paragraphs", |b| b.iter(|| analyze(black_box(&text))));
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
