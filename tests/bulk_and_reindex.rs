//! Bulk requests, reindex and by-query operations.

use serde_json::json;
use vesper::core::types::source_from_json;
use vesper::schema::mapping::DynamicMapping;
use vesper::{
    BulkOperation, BulkRequest, CancellationToken, Engine, ErrorKind, FieldDefinition, FieldValue, IndexSettings,
    OpType, Query, RefreshPolicy, ReindexRequest, Source, TypeMapping, UpdateAction, WriteOutcome,
};

fn source(value: serde_json::Value) -> Source {
    source_from_json(value).unwrap()
}

#[test]
fn test_bulk_isolates_item_failures() {
    let engine = Engine::default();
    engine.index("orders", Some("1"), source(json!({"qty": 1}))).unwrap();

    let request = BulkRequest::for_index("orders")
        .add(BulkOperation::index("2", source(json!({"qty": 2}))))
        .add(BulkOperation::create("1", source(json!({"qty": 9}))))
        .add(BulkOperation::index("3", source(json!({"qty": 3}))));
    let response = engine.bulk(request);

    assert!(response.errors);
    assert_eq!(response.items.len(), 3);
    assert!(response.items[0].is_success());
    assert_eq!(
        response.items[1].status.as_ref().unwrap_err().kind,
        ErrorKind::VersionConflict
    );
    assert!(response.items[2].is_success());

    assert_eq!(engine.get("orders", "1").unwrap().source["qty"], FieldValue::Int(1));
    assert_eq!(engine.get("orders", "2").unwrap().version, 1);
    assert_eq!(engine.get("orders", "3").unwrap().version, 1);
    assert_eq!(engine.count("orders", &Query::match_all()).unwrap(), 3);
}

#[test]
fn test_bulk_mixed_operations_and_targets() {
    let engine = Engine::default();
    engine.index("orders", Some("1"), source(json!({"qty": 1}))).unwrap();

    let request = BulkRequest::for_index("orders")
        .add(BulkOperation::update("1", UpdateAction::merge(source(json!({"qty": 5})))))
        .add(BulkOperation::index("a", source(json!({"event": "x"}))).in_index("audit"))
        .add(BulkOperation::delete("1"))
        .add(BulkOperation::delete("missing"))
        .add(BulkOperation::update("x", UpdateAction::merge(Source::new())).in_index("nope"));
    let response = engine.bulk(request);

    let outcomes: Vec<Option<WriteOutcome>> = response
        .items
        .iter()
        .map(|item| item.status.as_ref().ok().map(|r| r.result))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            Some(WriteOutcome::Updated),
            Some(WriteOutcome::Created),
            Some(WriteOutcome::Deleted),
            None,
            None
        ]
    );
    assert_eq!(response.items[1].index, "audit");
    assert_eq!(response.items[3].status.as_ref().unwrap_err().kind, ErrorKind::NotFound);
    assert_eq!(response.items[4].status.as_ref().unwrap_err().kind, ErrorKind::NotFound);
    assert!(!engine.index_exists("nope"));
    assert_eq!(engine.count("audit", &Query::match_all()).unwrap(), 1);
    assert_eq!(engine.count("orders", &Query::match_all()).unwrap(), 0);
}

#[test]
fn test_bulk_without_target_index() {
    let engine = Engine::default();
    let response = engine.bulk(BulkRequest::new().add(BulkOperation::index("1", Source::new())));
    assert!(response.errors);
    assert_eq!(
        response.items[0].status.as_ref().unwrap_err().kind,
        ErrorKind::InvalidArgument
    );
}

fn populate_source_index(engine: &Engine) {
    for i in 0..15 {
        let kind = if i < 10 { "book" } else { "film" };
        engine
            .index(
                "library",
                Some(&format!("item-{:02}", i)),
                source(json!({"kind": kind, "title": format!("Title {}", i), "year": 2000 + i})),
            )
            .unwrap();
    }
}

#[test]
fn test_reindex_copies_matching_documents() {
    let engine = Engine::default();
    populate_source_index(&engine);

    let request = ReindexRequest::new("library", "books")
        .query(Query::term("kind.keyword", "book"))
        .batch_size(3);
    let response = engine.reindex(&request, &CancellationToken::new()).unwrap();

    assert_eq!((response.total, response.created, response.batches), (10, 10, 4));
    assert!(!response.cancelled);
    assert!(response.failures.is_empty());
    assert_eq!(engine.count("books", &Query::match_all()).unwrap(), 10);
    for i in 0..10 {
        let id = format!("item-{:02}", i);
        assert_eq!(
            engine.get("books", &id).unwrap().source,
            engine.get("library", &id).unwrap().source
        );
    }
}

#[test]
fn test_reindex_projection_transform_and_conflicts() {
    let engine = Engine::default();
    populate_source_index(&engine);
    engine
        .create("films", Some("item-10"), source(json!({"title": "existing"})))
        .unwrap();

    let request = ReindexRequest::new("library", "films")
        .query(Query::term("kind.keyword", "film"))
        .source_fields(vec!["title".to_string()])
        .op_type(OpType::Create)
        .transform(|id, body| if id == "item-14" { None } else { Some(body.clone()) });
    let response = engine.reindex(&request, &CancellationToken::new()).unwrap();

    assert_eq!(response.total, 5);
    assert_eq!(response.created, 3);
    assert_eq!(response.version_conflicts, 1);
    assert_eq!(response.noops, 1);
    assert_eq!(
        engine.get("films", "item-11").unwrap().source,
        source(json!({"title": "Title 11"}))
    );
    assert_eq!(engine.get("films", "item-14").unwrap_err().kind, ErrorKind::NotFound);
}

#[test]
fn test_reindex_keeps_source_values_under_new_mapping() {
    let engine = Engine::default();
    engine.index("raw", Some("1"), source(json!({"code": 42}))).unwrap();
    engine
        .create_index(
            "typed",
            IndexSettings::default(),
            TypeMapping::new().field("code", FieldDefinition::keyword()),
        )
        .unwrap();

    engine
        .reindex(&ReindexRequest::new("raw", "typed"), &CancellationToken::new())
        .unwrap();
    assert_eq!(engine.get("typed", "1").unwrap().source["code"], FieldValue::Int(42));
    assert_eq!(engine.count("typed", &Query::term("code", "42")).unwrap(), 1);
}

#[test]
fn test_cancelled_reindex_leaves_destination_usable() {
    let engine = Engine::default();
    populate_source_index(&engine);
    let token = CancellationToken::new();
    token.cancel();

    let response = engine
        .reindex(&ReindexRequest::new("library", "copy"), &token)
        .unwrap();
    assert!(response.cancelled);
    assert_eq!(response.created, 0);
    assert_eq!(engine.count("copy", &Query::match_all()).unwrap(), 0);
    engine.index("copy", Some("x"), Source::new()).unwrap();
}

#[test]
fn test_reindex_errors() {
    let engine = Engine::default();
    populate_source_index(&engine);
    let err = engine
        .reindex(&ReindexRequest::new("missing", "dest"), &CancellationToken::new())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    let err = engine
        .reindex(&ReindexRequest::new("library", "library"), &CancellationToken::new())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[test]
fn test_update_by_query_applies_new_mapping() {
    let engine = Engine::default();
    engine
        .create_index(
            "catalog",
            IndexSettings::default(),
            TypeMapping::new().with_dynamic(DynamicMapping::False),
        )
        .unwrap();
    for (id, colour) in [("1", "red"), ("2", "blue")] {
        engine
            .index("catalog", Some(id), source(json!({"colour": colour})))
            .unwrap();
    }
    assert_eq!(engine.count("catalog", &Query::term("colour", "red")).unwrap(), 0);

    engine
        .put_mapping("catalog", &TypeMapping::new().field("colour", FieldDefinition::keyword()))
        .unwrap();
    let response = engine
        .update_by_query("catalog", &Query::match_all(), None, &CancellationToken::new())
        .unwrap();
    assert_eq!((response.total, response.updated), (2, 2));
    assert_eq!(engine.count("catalog", &Query::term("colour", "red")).unwrap(), 1);
    assert_eq!(engine.get("catalog", "1").unwrap().version, 2);

    let paint = UpdateAction::merge(source(json!({"colour": "green"})));
    let response = engine
        .update_by_query("catalog", &Query::term("colour", "blue"), Some(paint), &CancellationToken::new())
        .unwrap();
    assert_eq!(response.updated, 1);
    assert_eq!(engine.count("catalog", &Query::term("colour", "green")).unwrap(), 1);
}

#[test]
fn test_by_query_and_reindex_see_unrefreshed_writes() {
    let engine = Engine::default();
    let slow = IndexSettings {
        refresh_interval: Some(RefreshPolicy::Interval { interval_ms: 60_000 }),
        ..IndexSettings::default()
    };
    engine.create_index("buffered", slow, TypeMapping::new()).unwrap();
    for id in ["a", "b", "c"] {
        engine
            .index("buffered", Some(id), source(json!({"state": "new"})))
            .unwrap();
    }

    let response = engine
        .reindex(&ReindexRequest::new("buffered", "copied"), &CancellationToken::new())
        .unwrap();
    assert_eq!((response.total, response.created), (3, 3));
    assert_eq!(engine.count("copied", &Query::match_all()).unwrap(), 3);

    engine
        .index("buffered", Some("d"), source(json!({"state": "new"})))
        .unwrap();
    let response = engine
        .update_by_query(
            "buffered",
            &Query::match_all(),
            Some(UpdateAction::merge(source(json!({"state": "seen"})))),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(response.updated, 4);
    assert_eq!(engine.get("buffered", "d").unwrap().source["state"], FieldValue::from("seen"));

    engine
        .index("buffered", Some("e"), source(json!({"state": "new"})))
        .unwrap();
    let response = engine
        .delete_by_query("buffered", &Query::match_all(), &CancellationToken::new())
        .unwrap();
    assert_eq!(response.deleted, 5);
    assert_eq!(engine.get("buffered", "e").unwrap_err().kind, ErrorKind::NotFound);
}
