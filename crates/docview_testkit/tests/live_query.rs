//! Live query recovery over a store that fails on request.

use docview_core::{Config, CoreError, Database, QueryOptions};
use docview_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn live_query_recovers_after_scan_failure() {
    init_test_logging();
    let store = Arc::new(FaultyStore::new());
    let db = Database::open(store.clone(), Config::default()).unwrap();
    let view = db.view("v").unwrap();
    view.set_map(key_map(), "1").unwrap();

    store.fail_next_scan();
    let live = view
        .create_query()
        .with_options(QueryOptions::new().reduce(false))
        .to_live_query();
    let err = live.wait_for_rows().unwrap_err();
    assert!(matches!(&err, CoreError::QueryFailed(inner)
        if matches!(**inner, CoreError::Storage(_))));
    assert!(live.is_running());

    store.documents().put("a", json!({"key": 1})).unwrap();
    assert!(eventually(|| live.last_error().is_none()));
    assert!(eventually(|| live.rows().map(|rows| rows.len()) == Some(1)));
    live.stop();
}

#[test]
fn live_query_keeps_rows_when_a_rerun_fails() {
    let store = Arc::new(FaultyStore::new());
    let db = Database::open(store.clone(), Config::default()).unwrap();
    let view = db.view("v").unwrap();
    view.set_map(key_map(), "1").unwrap();
    store.documents().put("a", json!({"key": 1})).unwrap();

    let live = view.create_query().to_live_query();
    assert_eq!(live.wait_for_rows().unwrap().len(), 1);

    store.fail_next_scan();
    live.update();
    assert!(eventually(|| live.last_error().is_some()));
    assert_eq!(live.rows().map(|rows| rows.len()), Some(1));
}
