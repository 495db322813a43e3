//! Incremental index maintenance.
//!
//! An update pass runs inside one index transaction:
//!
//! 1. Rows of revisions superseded since the watermark are deleted. When the
//!    watermark is zero every row is deleted instead.
//! 2. The map function runs once over the winning revision of each changed,
//!    live, non-design document. Each emitted row is tagged with that
//!    revision's sequence.
//! 3. The watermark advances to the maximum sequence seen and the
//!    transaction commits.
//!
//! A storage failure drops the transaction, so rows and watermark stay as
//! they were and the pass can simply be retried. A failing map function only
//! costs the rows of the document it failed on.

use crate::error::{CoreError, CoreResult};
use crate::stats::UpdateStats;
use crate::view::{Emitter, MapFunction, View};
use docview_codec::{encode, Value};
use docview_storage::{DocumentChange, IndexRow, SequenceFilter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio_util::sync::CancellationToken;

pub(crate) fn update_index(
    view: &View,
    cancel: Option<&CancellationToken>,
) -> CoreResult<UpdateStats> {
    view.ensure_live()?;
    let map = view
        .functions()
        .map
        .ok_or_else(|| CoreError::MapFunctionMissing {
            view: view.name().to_string(),
        })?;

    let store = view.store();
    let id = view.id();
    let indexed = store.watermark(id).map_err(|e| view.storage_err(e))?;
    if indexed >= store.current_max_sequence()? {
        return Ok(UpdateStats::unchanged(indexed));
    }

    let mut txn = store.begin_update(id).map_err(|e| view.storage_err(e))?;
    // Another pass may have committed while we waited for the transaction.
    let last = store.watermark(id).map_err(|e| view.storage_err(e))?;
    let snapshot = store.snapshot_since(last)?;
    if last >= snapshot.max_sequence {
        return Ok(UpdateStats::unchanged(last));
    }

    tracing::info!(view = %view.name(), from = last, to = snapshot.max_sequence, "updating index");

    if last == 0 {
        txn.delete_rows(SequenceFilter::All)?;
    } else if !snapshot.superseded.is_empty() {
        txn.delete_rows(SequenceFilter::In(snapshot.superseded))?;
    }

    let prefix = view.db.config.design_doc_prefix.as_str();
    let mut stats = UpdateStats {
        from_sequence: last,
        to_sequence: snapshot.max_sequence,
        ..UpdateStats::default()
    };
    let mut previous: Option<&str> = None;
    for change in &snapshot.changes {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                tracing::debug!(view = %view.name(), "index update cancelled");
                return Err(CoreError::Cancelled);
            }
        }
        if change.sequence > snapshot.max_sequence || previous == Some(change.doc_id.as_str()) {
            continue;
        }
        previous = Some(change.doc_id.as_str());
        if change.deleted || change.doc_id.starts_with(prefix) {
            continue;
        }

        stats.documents_mapped += 1;
        let rows = match run_map(map.as_ref(), change) {
            Ok(rows) => rows,
            Err(message) => {
                let err = CoreError::MapFunction {
                    view: view.name().to_string(),
                    doc_id: change.doc_id.clone(),
                    message,
                };
                tracing::error!(view = %view.name(), doc_id = %change.doc_id, error = %err, "map function failed");
                stats.map_failures += 1;
                continue;
            }
        };
        for (key, value) in rows {
            txn.insert_row(IndexRow {
                sequence: change.sequence,
                doc_id: change.doc_id.clone(),
                key: encode(&key),
                value: encode(&value),
            })?;
        }
    }

    txn.set_watermark(snapshot.max_sequence)?;
    let summary = txn.commit().map_err(|e| view.storage_err(e))?;
    stats.rows_deleted = summary.rows_deleted;
    stats.rows_inserted = summary.rows_inserted;

    tracing::info!(
        view = %view.name(),
        to = stats.to_sequence,
        deleted = stats.rows_deleted,
        inserted = stats.rows_inserted,
        failures = stats.map_failures,
        "index updated"
    );
    view.stats().record_update(&stats);
    Ok(stats)
}

/// Runs the map function over one document, isolating errors and panics.
fn run_map(map: &dyn MapFunction, change: &DocumentChange) -> Result<Vec<(Value, Value)>, String> {
    let doc = map_input(change);
    let mut emitter = Emitter::new(change.doc_id.as_str(), change.sequence);
    let outcome = catch_unwind(AssertUnwindSafe(|| map.map(&doc, &mut emitter)));
    match outcome {
        Ok(Ok(())) => Ok(emitter.into_rows()),
        Ok(Err(err)) => Err(err.message().to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

/// Builds the map input: the revision body plus `_id`, `_rev` and `_local_seq`.
fn map_input(change: &DocumentChange) -> Value {
    let mut doc = change
        .properties
        .clone()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    if let Value::Object(fields) = &mut doc {
        fields.insert("_id".to_string(), Value::from(change.doc_id.as_str()));
        fields.insert("_rev".to_string(), Value::from(change.rev_id.as_str()));
        fields.insert("_local_seq".to_string(), Value::from(change.sequence));
    }
    doc
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
