mod common;

use common::{BrokenStore, MapSource, ReadOnlyTableStore, RecordingSink, strings};
use serde_json::{Value, json};
use sheet_bridge::error::SyncError;
use sheet_bridge::pipeline::{self, handle_get, handle_post, migrate, replace, snapshot};
use sheet_bridge::schema::TableSchema;
use sheet_bridge::store::MemoryStore;

fn stocks_text(count: usize) -> String {
    let mut text = String::from("id,name,isGift,copies\n");
    for i in 0..count {
        text.push_str(&format!("S{i},line {i},false,{}\n", i % 4));
    }
    text
}

fn empty_tables() -> MapSource {
    MapSource::default()
        .with("Crosses", "id,parentA\n")
        .with("Pins", "user,hash\n")
}

#[test]
fn snapshot_end_to_end() {
    let mut store = MemoryStore::new().with_table(
        "Stocks",
        vec![strings(&["id", "name", "isGift"]), strings(&["S1", "w1118", "true"])],
    );
    let response = handle_get(&mut store, &TableSchema::builtin());
    assert_eq!(
        response,
        json!({
            "stocks": [{"id": "S1", "name": "w1118", "isGift": true}],
            "crosses": [],
            "pins": [],
        })
    );
}

#[test]
fn snapshot_filters_blank_keys_and_trims_empty_cells() {
    let schemas = TableSchema::builtin();
    let mut store = MemoryStore::new()
        .with_table(
            "Stocks",
            vec![
                strings(&["id", " name", "notes ", "isGift"]),
                strings(&["S1", "yw", "", "false"]),
                strings(&["", "orphan", "lost", "true"]),
                strings(&["S2"]),
            ],
        )
        .with_table(
            "Crosses",
            vec![
                strings(&["id", "collected"]),
                strings(&["X1", "not json"]),
            ],
        );
    let combined = snapshot(&mut store, &schemas).unwrap();
    assert_eq!(
        combined["stocks"],
        json!([{"id": "S1", "name": "yw"}, {"id": "S2"}])
    );
    assert_eq!(
        combined["crosses"],
        json!([{"id": "X1", "collected": "not json"}])
    );
}

#[test]
fn snapshot_initialises_missing_tables() {
    let mut store = MemoryStore::new();
    snapshot(&mut store, &TableSchema::builtin()).unwrap();
    assert_eq!(store.table_names(), vec!["Stocks", "Crosses", "Pins"]);
    assert_eq!(
        store.table("Pins").unwrap(),
        &[strings(&["user", "hash"])][..]
    );
}

#[test]
fn snapshot_failure_is_reported_in_band() {
    let response = handle_get(&mut BrokenStore, &TableSchema::builtin());
    assert_eq!(
        response,
        json!({"error": "You do not have permission to access Stocks"})
    );
}

#[test]
fn replace_swaps_present_tables_only() {
    let schemas = TableSchema::builtin();
    let mut store = MemoryStore::new();
    replace(
        &mut store,
        &schemas,
        &json!({
            "stocks": [{"id": "S1"}, {"id": "S2"}],
            "pins": [{"user": "ada", "hash": "h"}],
        }),
    )
    .unwrap();

    let summary = replace(
        &mut store,
        &schemas,
        &json!({
            "stocks": [{"id": "S3", "name": "Canton-S", "isGift": true, "copies": 0}],
            "crosses": [{"id": "X1", "vials": [{"n": 1}], "targetCount": 10}],
        }),
    )
    .unwrap();
    assert_eq!(summary.count("stocks"), 1);
    assert_eq!(summary.count("crosses"), 1);
    assert_eq!(summary.count("pins"), 0);

    let stocks = store.table("Stocks").unwrap();
    assert_eq!(stocks.len(), 2);
    assert_eq!(stocks[0], TableSchema::stocks().headers());
    assert_eq!(stocks[1][0], "S3");
    assert_eq!(stocks[1][1], "Canton-S");
    assert_eq!(stocks[1][11], "true");
    assert_eq!(stocks[1][15], "0");

    let crosses = store.table("Crosses").unwrap();
    assert_eq!(crosses[1][8], "10");
    assert_eq!(crosses[1][10], "[{\"n\":1}]");

    let pins = store.table("Pins").unwrap();
    assert_eq!(pins[1], strings(&["ada", "h"]));
}

#[test]
fn replace_with_empty_list_clears_data_rows() {
    let schemas = TableSchema::builtin();
    let mut store = MemoryStore::new();
    replace(&mut store, &schemas, &json!({"pins": [{"user": "a", "hash": "b"}]})).unwrap();
    replace(&mut store, &schemas, &json!({"pins": []})).unwrap();
    assert_eq!(store.table("Pins").unwrap().len(), 1);
}

#[test]
fn post_response_reports_counts() {
    let mut store = MemoryStore::new();
    let response = handle_post(
        &mut store,
        &TableSchema::builtin(),
        r#"{"stocks":[{"id":"S1"},{"id":"S2"}],"pins":[{"user":"ada","hash":"x"}]}"#,
    );
    assert_eq!(
        response,
        json!({"success": true, "stockCount": 2, "crossCount": 0, "pinCount": 1})
    );
}

#[test]
fn malformed_post_bodies_are_reported_in_band() {
    let schemas = TableSchema::builtin();
    let mut store = MemoryStore::new();

    let response = handle_post(&mut store, &schemas, "{not json");
    let message = response["error"].as_str().unwrap();
    assert!(message.starts_with("Parse error: request body is not JSON"));

    let body = r#"{"stocks":[{"id":"S1"}],"crosses":{"id":"X1"}}"#;
    let response = handle_post(&mut store, &schemas, body);
    assert_eq!(
        response,
        json!({"error": "Invalid payload: 'crosses' must be an array"})
    );
    // validation happens before any write
    assert!(store.table("Stocks").is_none());
}

#[test]
fn write_failure_keeps_earlier_tables_committed() {
    let mut store = ReadOnlyTableStore {
        inner: MemoryStore::new(),
        read_only: "Crosses".to_string(),
    };
    let response = handle_post(
        &mut store,
        &TableSchema::builtin(),
        r#"{"stocks":[{"id":"S1"}],"crosses":[{"id":"X1"}],"pins":[{"user":"u"}]}"#,
    );
    assert_eq!(response, json!({"error": "The sheet Crosses is protected"}));
    assert_eq!(store.inner.table("Stocks").unwrap().len(), 2);
    assert!(store.inner.table("Pins").is_none());
}

#[test]
fn migrate_upserts_in_batches_of_fifty() {
    let source = empty_tables().with("Stocks", &stocks_text(120));
    let mut sink = RecordingSink::default();
    let report = migrate(
        &source,
        &mut sink,
        &TableSchema::builtin(),
        pipeline::DEFAULT_BATCH_SIZE,
    )
    .unwrap();

    assert_eq!(sink.sizes("stocks"), vec![50, 50, 20]);
    assert!(sink.sizes("crosses").is_empty());
    assert_eq!(report.total_upserted(), 120);
    assert_eq!(report.tables[0].batches, 3);

    let first = &sink.batches[0].1[0];
    assert_eq!(
        Value::Object(first.clone()),
        json!({"id": "S0", "name": "line 0", "is_gift": false, "copies": 0})
    );
    let last = &sink.batches[2].1[19];
    assert_eq!(last["id"], json!("S119"));
}

#[test]
fn failed_batch_stops_the_table_and_the_run() {
    let source = empty_tables()
        .with("Stocks", &stocks_text(120))
        .with("Crosses", "id,parentA\nX1,S1\n");
    let mut sink = RecordingSink::failing_on("stocks", 2);
    let err = migrate(&source, &mut sink, &TableSchema::builtin(), 50).unwrap_err();

    assert_eq!(sink.sizes("stocks"), vec![50]);
    assert!(sink.sizes("crosses").is_empty());
    match err {
        SyncError::UpstreamBatch {
            table,
            batch,
            status,
            body,
        } => {
            assert_eq!(table, "stocks");
            assert_eq!(batch, 2);
            assert_eq!(status, 409);
            assert!(body.contains("duplicate key"));
        }
        other => panic!("expected an upstream batch error, got {other:?}"),
    }
}

#[test]
fn migrate_drops_rows_without_a_key() {
    let source = empty_tables().with(
        "Stocks",
        "id,name,copies\nS1,a,abc\n,orphan,2\n\nS2,b,\n",
    );
    let mut sink = RecordingSink::default();
    let report = migrate(&source, &mut sink, &TableSchema::builtin(), 50).unwrap();

    let stocks = &report.tables[0];
    assert_eq!(stocks.fetched, 3);
    assert_eq!(stocks.kept, 2);
    assert_eq!(stocks.degraded.count("copies"), 1);
    let rows = &sink.batches[0].1;
    assert_eq!(rows[0]["copies"], Value::Null);
    assert_eq!(rows[1]["id"], json!("S2"));
}

#[test]
fn migrate_maps_legacy_pin_headers() {
    let source = MapSource::default()
        .with("Stocks", "id\n")
        .with("Crosses", "id\n")
        .with("Pins", "userName,hash\nada,abc\n,zzz\n");
    let mut sink = RecordingSink::default();
    migrate(&source, &mut sink, &TableSchema::builtin(), 50).unwrap();
    assert_eq!(sink.batches.len(), 1);
    assert_eq!(
        Value::Object(sink.batches[0].1[0].clone()),
        json!({"user_name": "ada", "hash": "abc"})
    );
}

#[test]
fn fetch_failure_aborts_before_any_upsert() {
    let source = MapSource::default().with("Stocks", &stocks_text(3));
    let mut sink = RecordingSink::default();
    let err = migrate(&source, &mut sink, &TableSchema::builtin(), 50).unwrap_err();
    assert!(matches!(err, SyncError::Retrieval(_)));
    assert!(sink.batches.is_empty());
}

#[test]
fn zero_batch_size_is_rejected() {
    let mut sink = RecordingSink::default();
    let err = migrate(&empty_tables(), &mut sink, &TableSchema::builtin(), 0).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn crosses_only_post_is_served_back_as_crosses() {
    let schemas = TableSchema::builtin();
    let mut store = MemoryStore::new();

    let posted = handle_post(
        &mut store,
        &schemas,
        r#"{"crosses": [{"id": "X1", "parentA": "S1"}]}"#,
    );
    assert_eq!(
        posted,
        json!({"success": true, "stockCount": 0, "crossCount": 1, "pinCount": 0})
    );

    let response = handle_get(&mut store, &schemas);
    assert_eq!(
        response,
        json!({
            "stocks": [],
            "crosses": [{"id": "X1", "parentA": "S1"}],
            "pins": []
        })
    );
}
