use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docsearch_core::{build_index, BuildOptions, DocumentRecord, SearchEngine, SearchMode, TextNormalizer, TfMode};

const WORDS: &[&str] = &[
    "carbon", "emission", "solar", "wind", "ice", "ocean", "temperature", "forest", "policy", "energy",
    "climate", "drought", "flood", "methane", "agriculture", "transport", "coal", "grid", "storage", "heat",
];

fn corpus(n: u32) -> Vec<DocumentRecord> {
    (1..=n)
        .map(|id| {
            let content: Vec<&str> = (0..60).map(|j| WORDS[((id * 7 + j * 13) % WORDS.len() as u32) as usize]).collect();
            DocumentRecord {
                id,
                title: format!("{} {}", WORDS[id as usize % WORDS.len()], WORDS[(id as usize * 3) % WORDS.len()]),
                content: content.join(" "),
                ..Default::default()
            }
        })
        .collect()
}

fn bench_search(c: &mut Criterion) {
    let normalizer = TextNormalizer::plain();
    let options = BuildOptions { min_df: 1, max_df_ratio: 1.0 };
    let index = build_index(corpus(500), &normalizer, &options).expect("build");
    let engine = SearchEngine::new(index, TfMode::Normalized);

    c.bench_function("vector_search_500", |b| {
        b.iter(|| engine.search(black_box("solar wind energy storage"), &normalizer, SearchMode::Vector, 10))
    });
    c.bench_function("boolean_and_500", |b| {
        b.iter(|| engine.search(black_box("solar wind"), &normalizer, SearchMode::BooleanAnd, 10))
    });
    c.bench_function("related_500", |b| b.iter(|| engine.related_documents(black_box(42), 5)));
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
