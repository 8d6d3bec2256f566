mod common;

use std::sync::Arc;
use chrono::{TimeZone, Utc};
use futures::{StreamExt, TryStreamExt};
use serde_json::json;

use bqpipe::error::{BqPipeError, FailurePhase};
use bqpipe::pipeline::{QueryToFile, QueryToFileToStream};
use bqpipe::warehouse::FormatOptions;
use common::{gzip, params, Call, FakeWarehouse, MemoryStore, Outcome, DATASET};

const TABLE: &str = "tmp_base_name_1481155200000";
const FILE: &str = "tmp/tmp_base_name_1481155200000.json.gz";

fn query_to_file(warehouse: &FakeWarehouse, store: &MemoryStore) -> QueryToFile {
    let at = Utc.with_ymd_and_hms(2016, 12, 8, 0, 0, 0).unwrap();
    QueryToFile::create_at(warehouse.client(), Arc::new(store.clone()), "base_name", at)
}

fn call_kinds(calls: &[Call]) -> Vec<&'static str> {
    calls
        .iter()
        .map(|c| match c {
            Call::StartQuery(_) => "query",
            Call::Export { .. } => "export",
            Call::Delete { .. } => "delete",
            _ => "other",
        })
        .collect()
}

#[test]
fn test_names_from_fixed_clock() {
    let op = query_to_file(&FakeWarehouse::new(), &MemoryStore::new());

    assert_eq!(op.table_name(), TABLE);
    assert_eq!(op.file_name(), FILE);
}

#[test]
fn test_file_name_follows_format() {
    let op = query_to_file(&FakeWarehouse::new(), &MemoryStore::new()).with_format(FormatOptions::csv(false));
    assert_eq!(op.file_name(), "tmp/tmp_base_name_1481155200000.csv");
}

#[test]
fn test_explicit_filename_wins() {
    let op = query_to_file(&FakeWarehouse::new(), &MemoryStore::new()).with_filename("out/report.json.gz");
    assert_eq!(op.file_name(), "out/report.json.gz");
}

#[test]
fn test_table_name_uses_current_time() {
    let before = Utc::now().timestamp_millis();
    let op = QueryToFile::create(FakeWarehouse::new().client(), Arc::new(MemoryStore::new()), "base");
    let after = Utc::now().timestamp_millis();

    let millis: i64 = op.table_name().trim_start_matches("tmp_base_").parse().unwrap();
    assert!(millis >= before && millis <= after);
}

#[tokio::test]
async fn test_runs_query_export_delete_in_order() {
    let warehouse = FakeWarehouse::new();
    let store = MemoryStore::new();

    let file = query_to_file(&warehouse, &store)
        .run("SELECT 1", params(json!({})))
        .await
        .unwrap();

    assert_eq!(file.uri(), format!("gs://bucket/{}", FILE));

    let calls = warehouse.calls();
    assert_eq!(call_kinds(&calls), vec!["query", "export", "delete"]);

    let Call::StartQuery(request) = &calls[0] else { unreachable!() };
    assert_eq!(request["destinationTable"]["tableId"], TABLE);
    assert_eq!(
        calls[1],
        Call::Export {
            dataset: DATASET.into(),
            table: TABLE.into(),
            uri: format!("gs://bucket/{}", FILE),
            options: FormatOptions::default(),
        }
    );
    assert_eq!(
        calls[2],
        Call::Delete {
            dataset: DATASET.into(),
            table: TABLE.into(),
        }
    );
}

#[tokio::test]
async fn test_query_failure_skips_export_and_cleanup() {
    let warehouse = FakeWarehouse::new().with_query(Outcome::Fail("query job failed".into()));

    let result = query_to_file(&warehouse, &MemoryStore::new())
        .run("SELECT 1", params(json!({})))
        .await;

    match result {
        Err(err) => assert_eq!(err.to_string(), "query job failed"),
        Ok(_) => panic!("expected the query to fail"),
    }
    assert_eq!(call_kinds(&warehouse.calls()), vec!["query"]);
}

#[tokio::test]
async fn test_export_failure_leaves_table() {
    let warehouse = FakeWarehouse::new().with_export(Outcome::Transport("export creation failed".into()));

    let result = query_to_file(&warehouse, &MemoryStore::new())
        .run("SELECT 1", params(json!({})))
        .await;

    match result {
        Err(err) => assert_eq!(err.to_string(), "export creation failed"),
        Ok(_) => panic!("expected the export to fail"),
    }
    assert_eq!(call_kinds(&warehouse.calls()), vec!["query", "export"]);
}

#[tokio::test]
async fn test_delete_failure_propagates() {
    let warehouse = FakeWarehouse::new().with_delete_error("Not found: Table tmp_base_name");

    let result = query_to_file(&warehouse, &MemoryStore::new())
        .run("SELECT 1", params(json!({})))
        .await;

    match result {
        Err(err) => assert_eq!(err.to_string(), "Not found: Table tmp_base_name"),
        Ok(_) => panic!("expected the cleanup to fail"),
    }
    assert_eq!(call_kinds(&warehouse.calls()), vec!["query", "export", "delete"]);
}

#[tokio::test]
async fn test_stream_yields_exported_records_in_order() {
    let warehouse = FakeWarehouse::new();
    let store = MemoryStore::new();
    store.put(
        FILE,
        gzip(b"{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n{\"id\":3,\"name\":\"c\"}\n"),
    );

    let op = QueryToFileToStream::new(query_to_file(&warehouse, &store));
    let records: Vec<_> = op
        .create_query_stream("SELECT id, name FROM t", params(json!({})))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(
        records,
        vec![
            json!({"id": 1, "name": "a"}),
            json!({"id": 2, "name": "b"}),
            json!({"id": 3, "name": "c"}),
        ]
    );
    assert_eq!(call_kinds(&warehouse.calls()), vec!["query", "export", "delete"]);
}

#[tokio::test]
async fn test_stream_reads_export_on_demand() {
    let warehouse = FakeWarehouse::new();
    let store = MemoryStore::new();

    let content: String = (0..5000)
        .map(|id| format!("{{\"id\":{},\"name\":\"row{}\"}}\n", id, id * 7919 % 10007))
        .collect();
    let compressed = gzip(content.as_bytes());
    let total_chunks = compressed.len().div_ceil(7);
    store.put(FILE, compressed);

    let op = QueryToFileToStream::new(query_to_file(&warehouse, &store));
    let mut records = op
        .create_query_stream("SELECT id, name FROM t", params(json!({})))
        .await
        .unwrap();

    assert_eq!(store.chunks_served(), 0);

    let first = records.next().await.unwrap().unwrap();
    assert_eq!(first, json!({"id": 0, "name": "row0"}));

    let served = store.chunks_served();
    assert!(served > 0);
    assert!(
        served < total_chunks / 4,
        "read {} of {} chunks for one record",
        served,
        total_chunks
    );
}

#[tokio::test]
async fn test_stream_reports_corrupt_export() {
    let warehouse = FakeWarehouse::new();
    let store = MemoryStore::new();

    let mut corrupt = gzip(b"{\"id\":1}\n")[..10].to_vec();
    corrupt.extend_from_slice(&[0xff; 16]);
    store.put(FILE, corrupt);

    let op = QueryToFileToStream::new(query_to_file(&warehouse, &store));
    let items: Vec<_> = op
        .create_query_stream("SELECT 1", params(json!({})))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    match &items[0] {
        Err(err) => {
            assert!(matches!(err, BqPipeError::Decompress(_)));
            assert_eq!(err.phase(), FailurePhase::Transform);
        }
        Ok(record) => panic!("expected a decompression error, got {}", record),
    }
}

#[tokio::test]
async fn test_stream_reports_malformed_line() {
    let warehouse = FakeWarehouse::new();
    let store = MemoryStore::new();
    store.put(FILE, gzip(b"{\"id\":1}\nnot json\n{\"id\":3}\n"));

    let op = QueryToFileToStream::new(query_to_file(&warehouse, &store));
    let items: Vec<_> = op
        .create_query_stream("SELECT 1", params(json!({})))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().ok(), Some(&json!({"id": 1})));
    assert!(matches!(&items[1], Err(BqPipeError::Parse { line: 2, .. })));
}

#[tokio::test]
async fn test_stream_fails_before_query_for_csv() {
    let warehouse = FakeWarehouse::new();
    let op = QueryToFileToStream::new(
        query_to_file(&warehouse, &MemoryStore::new()).with_format(FormatOptions::csv(false)),
    );

    let result = op.create_query_stream("SELECT 1", params(json!({}))).await;

    assert!(matches!(result, Err(BqPipeError::InvalidFormat(_))));
    assert!(warehouse.calls().is_empty());
}

#[tokio::test]
async fn test_stream_propagates_pipeline_failure() {
    let warehouse = FakeWarehouse::new().with_query(Outcome::Fail("query job failed".into()));
    let op = QueryToFileToStream::new(query_to_file(&warehouse, &MemoryStore::new()));

    let result = op.create_query_stream("SELECT 1", params(json!({}))).await;

    match result {
        Err(err) => assert_eq!(err.to_string(), "query job failed"),
        Ok(_) => panic!("expected the pipeline to fail"),
    }
}
