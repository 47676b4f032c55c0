use std::hint::black_box;

use common::config::HybridWeights;
use criterion::{Criterion, criterion_group, criterion_main};
use search_core::keyword::KeywordHit;
use search_core::merge::{merge_results, normalize_keyword_hits, normalize_vector_hits};
use search_core::schema::StoredDoc;
use search_core::vector::{VectorHit, VectorMetadata};

fn keyword_hits(n: usize) -> Vec<KeywordHit> {
    (0..n)
        .map(|i| KeywordHit {
            doc: StoredDoc {
                document_id: format!("src/file{i}.rs:entity{i}:1:20"),
                source_file: format!("src/file{i}.rs"),
                entity_name: format!("entity{i}"),
                ..StoredDoc::default()
            },
            score: (i % 17) as f32 + 0.5,
            field_match: None,
        })
        .collect()
}

fn vector_hits(n: usize) -> Vec<VectorHit> {
    (0..n)
        .map(|i| VectorHit {
            id: format!("src/file{i}.rs:1:0:100"),
            metadata: VectorMetadata {
                source_file: format!("src/file{i}.rs"),
                entity_name: format!("entity{i}"),
                start_line: 1,
                end_line: 20,
                ..VectorMetadata::default()
            },
            similarity: ((i % 13) as f32).mul_add(0.07, 0.05),
        })
        .collect()
}

fn bench_normalize_and_merge(c: &mut Criterion) {
    let weights = HybridWeights::default();
    c.bench_function("normalize_and_merge_512", |b| {
        b.iter(|| {
            let keyword = normalize_keyword_hits(black_box(keyword_hits(512)));
            let vector = normalize_vector_hits(black_box(vector_hits(512)));
            black_box(merge_results(keyword, vector, weights))
        });
    });
}

criterion_group!(benches, bench_normalize_and_merge);
criterion_main!(benches);
