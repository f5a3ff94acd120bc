use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use vesper::query::ast::{BoolQuery, MatchPhraseQuery, RangeQuery};
use vesper::{
    BulkOperation, BulkRequest, Engine, FieldDefinition, FieldValue, IndexSettings, Query, RefreshPolicy,
    SearchRequest, SortField, Source, TypeMapping,
};

const WORDS: [&str; 8] = ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog"];

/// Helper to create test documents
fn create_test_document(id: u64, content_size: usize) -> Source {
    let mut rng = rand::thread_rng();
    let content: String = (0..content_size)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ");

    BTreeMap::from([
        ("title".to_string(), FieldValue::Text(format!("Document {}", id))),
        ("content".to_string(), FieldValue::Text(content)),
        ("category".to_string(), FieldValue::Text(format!("category_{}", id % 10))),
        ("score".to_string(), FieldValue::Float(rng.gen_range(0.0..100.0))),
    ])
}

fn mapping() -> TypeMapping {
    TypeMapping::new()
        .field("title", FieldDefinition::text().with_field("keyword", FieldDefinition::keyword()))
        .field("content", FieldDefinition::text())
        .field("category", FieldDefinition::keyword())
        .field("score", FieldDefinition::float())
}

fn engine_with(settings: IndexSettings) -> Engine {
    let engine = Engine::default();
    engine.create_index("bench", settings, mapping()).unwrap();
    engine
}

fn batched_settings() -> IndexSettings {
    IndexSettings {
        refresh_interval: Some(RefreshPolicy::Interval { interval_ms: 60_000 }),
        ..IndexSettings::default()
    }
}

/// Benchmark single document writes with a refresh per write
fn bench_single_insert(c: &mut Criterion) {
    let engine = engine_with(IndexSettings::default());

    c.bench_function("single_document_insert", |b| {
        let mut id = 0u64;
        b.iter(|| {
            let doc = create_test_document(id, 100);
            engine.index("bench", Some(&id.to_string()), doc).unwrap();
            id += 1;
        });
    });
}

/// Benchmark bulk writes followed by one refresh
fn bench_bulk_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_insert");

    for batch_size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
            let engine = engine_with(batched_settings());
            let mut id_counter = 0u64;

            b.iter(|| {
                let mut request = BulkRequest::for_index("bench");
                for _ in 0..batch_size {
                    let doc = create_test_document(id_counter, 100);
                    request = request.add(BulkOperation::index(id_counter.to_string(), doc));
                    id_counter += 1;
                }
                let response = engine.bulk(request);
                assert!(!response.errors);
                engine.refresh("bench").unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark query types against a populated index
fn bench_search(c: &mut Criterion) {
    let engine = engine_with(batched_settings());
    for i in 0..1000 {
        engine
            .index("bench", Some(&i.to_string()), create_test_document(i, 100))
            .unwrap();
    }
    engine.refresh("bench").unwrap();

    let queries: Vec<(&str, Query)> = vec![
        ("simple_match", Query::match_text("content", "fox")),
        (
            "boolean_and",
            BoolQuery::new()
                .with_must(Query::match_text("content", "quick"))
                .with_must(Query::match_text("content", "brown"))
                .into(),
        ),
        ("match_or", Query::match_text("content", "fox dog")),
        ("prefix", Query::prefix("title.keyword", "Document 1")),
        ("wildcard", Query::wildcard("title.keyword", "Doc*ment 9*")),
        ("category_term", Query::term("category", "category_5")),
        ("range_numeric", RangeQuery::new("score").gte(25.0).lte(75.0).into()),
        ("phrase", MatchPhraseQuery::new("content", "quick brown fox").into()),
    ];

    let mut group = c.benchmark_group("search");
    for (name, query) in queries {
        // distinct sizes keep the query cache from answering every iteration
        let mut size = 10;
        group.bench_function(name, |b| {
            b.iter(|| {
                size = if size == 10 { 11 } else { 10 };
                let request = SearchRequest::new(query.clone()).size(size);
                black_box(engine.search("bench", &request).unwrap());
            });
        });
    }

    group.bench_function("sorted_by_score_field", |b| {
        b.iter(|| {
            let request = SearchRequest::new(Query::match_all()).sort(SortField::desc("score"));
            black_box(engine.search("bench", &request).unwrap());
        });
    });
    group.finish();
}

/// Benchmark readers running while a writer keeps updating
fn bench_concurrent_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_operations");

    for readers in [1, 4].iter() {
        group.bench_with_input(BenchmarkId::new("readers", readers), readers, |b, &readers| {
            let engine = Arc::new(engine_with(IndexSettings::default()));
            for i in 0..200 {
                engine
                    .index("bench", Some(&i.to_string()), create_test_document(i, 20))
                    .unwrap();
            }

            b.iter(|| {
                let writer = {
                    let engine = engine.clone();
                    thread::spawn(move || {
                        for i in 0..20u64 {
                            engine
                                .index("bench", Some(&i.to_string()), create_test_document(i, 20))
                                .unwrap();
                        }
                    })
                };
                let handles: Vec<_> = (0..readers)
                    .map(|_| {
                        let engine = engine.clone();
                        thread::spawn(move || {
                            for _ in 0..20 {
                                engine.count("bench", &Query::match_text("content", "lazy")).unwrap();
                            }
                        })
                    })
                    .collect();
                writer.join().unwrap();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_bulk_insert,
    bench_search,
    bench_concurrent_operations
);
criterion_main!(benches);
