use bench::INPUT;
use criterion::{criterion_group, criterion_main, Criterion};
use cwat::{lexer, token::TokenKind};
use std::hint::black_box;

fn lexer(input: &str) {
    let tokens = lexer::lex_in_new(input);
    let significant = tokens
        .iter()
        .filter(|token| !token.kind.is_trivia() && token.kind != TokenKind::Eof)
        .count();
    black_box(significant);
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("lexer", |b| {
        b.iter(|| {
            black_box(lexer(black_box(INPUT)));
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
