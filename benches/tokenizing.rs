use criterion::{Criterion, criterion_group, criterion_main};
use ops_rag::embeddings::{ChunkingConfig, Tokenizer};
use ops_rag::source::markup::clean_content;
use std::fmt::Write;
use std::hint::black_box;

fn runbook_page() -> String {
    let mut page = String::from("<h1>Operations runbook</h1>");
    for section in 0..200 {
        write!(
            page,
            "<h2>Procedure {section}</h2><p>Restart the <strong>web tier</strong> after the \
             nightly backup finishes. 检查磁盘空间，然后重启服务。</p>\
             <ul><li>Drain node {section}</li><li>Deploy build {section}</li></ul>\
             <script>track({section})</script>"
        )
        .expect("writing to a String cannot fail");
    }
    page
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let page = runbook_page();
    let text = clean_content(&page);
    let tokenizer = Tokenizer::cl100k().expect("cl100k_base should load");
    let config = ChunkingConfig::default();

    c.bench_function("markup cleaning", |b| {
        b.iter(|| clean_content(black_box(&page)))
    });
    c.bench_function("tokenizing", |b| {
        b.iter(|| tokenizer.tokenize(black_box(&text)).len())
    });
    c.bench_function("windowing", |b| {
        b.iter(|| {
            let tokenized = tokenizer.tokenize(black_box(&text));
            config
                .window_ranges(tokenized.len())
                .into_iter()
                .map(|window| tokenized.decode(window).len())
                .sum::<usize>()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
