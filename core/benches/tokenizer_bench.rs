use criterion::{criterion_group, criterion_main, Criterion};
use docsearch_core::tokenizer::{Normalizer, TextNormalizer};

const TEXT: &str = "Global warming is the long-term rise in the average temperature of the Earth's \
climate system. Burning fossil fuels releases carbon dioxide and other greenhouse gases, which \
trap heat in the atmosphere. Renewable energy sources such as solar and wind power reduce \
emissions while melting polar ice sheets raise sea levels around the world.";

fn bench_normalize(c: &mut Criterion) {
    let english = TextNormalizer::english();
    let plain = TextNormalizer::plain();
    c.bench_function("normalize_english", |b| b.iter(|| english.normalize(TEXT)));
    c.bench_function("normalize_plain", |b| b.iter(|| plain.normalize(TEXT)));
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
