//! Translating query options into index scans.
//!
//! Range queries become a single [`KeyRange`] scan. With `descending` the
//! start and end bounds trade places (together with their inclusivity and
//! document ID tie-breaks) and the scan runs in reverse. A `keys` list
//! becomes one exact-key scan per key, chained in list order.

use crate::error::CoreResult;
use crate::query::{QueryOptions, QueryRow};
use crate::view::View;
use docview_codec::{encode, Collation, Value};
use docview_storage::{
    KeyBound, KeyRange, ResolvedDocument, RowCursor, ScanDirection, StorageResult, ViewStorage,
};
use tokio_util::sync::CancellationToken;

/// Builds the key range a non-`keys` query scans.
pub(crate) fn key_range(options: &QueryOptions, collation: Collation) -> KeyRange {
    let mut lower = (&options.start_key, options.inclusive_start, &options.start_key_doc_id);
    let mut upper = (&options.end_key, options.inclusive_end, &options.end_key_doc_id);
    if options.descending {
        std::mem::swap(&mut lower, &mut upper);
    }
    let (max_key, max_inclusive, max_doc_id) = upper;
    let max_key = max_key
        .clone()
        .map(|key| prefix_match_key(key, options.prefix_match_level));
    let (min_key, min_inclusive, min_doc_id) = lower;
    KeyRange::all(collation)
        .with_min(bound(min_key.as_ref(), min_inclusive, min_doc_id))
        .with_max(bound(max_key.as_ref(), max_inclusive, max_doc_id))
}

fn bound(key: Option<&Value>, inclusive: bool, doc_id: &Option<String>) -> Option<KeyBound> {
    key.map(|key| {
        let encoded = encode(key);
        let bound = if inclusive {
            KeyBound::inclusive(encoded)
        } else {
            KeyBound::exclusive(encoded)
        };
        bound.with_doc_id(doc_id.clone())
    })
}

/// Extends `key` so it collates after every key it is a prefix of.
///
/// Strings get `U+FFFF` appended. Arrays get an empty object appended at
/// level 1, otherwise their last element is extended one level down.
pub(crate) fn prefix_match_key(key: Value, level: usize) -> Value {
    if level == 0 {
        return key;
    }
    match key {
        Value::String(mut s) => {
            s.push('\u{ffff}');
            Value::String(s)
        }
        Value::Array(mut items) => {
            if level == 1 {
                items.push(Value::Object(serde_json::Map::new()));
            } else if let Some(last) = items.pop() {
                items.push(prefix_match_key(last, level - 1));
            }
            Value::Array(items)
        }
        other => other,
    }
}

/// Opens the ordered cursor a query reads from.
pub(crate) fn open_scan(
    store: &dyn ViewStorage,
    view: &View,
    options: &QueryOptions,
    collation: Collation,
) -> CoreResult<RowCursor> {
    let cursor = match &options.keys {
        Some(keys) => {
            let cursors = keys
                .iter()
                .map(|key| {
                    store.scan(
                        view.id(),
                        &KeyRange::exact(encode(key), collation),
                        ScanDirection::Forward,
                    )
                })
                .collect::<StorageResult<Vec<_>>>()
                .map_err(|e| view.storage_err(e))?;
            Box::new(cursors.into_iter().flatten()) as RowCursor
        }
        None => {
            let direction = if options.descending {
                ScanDirection::Reverse
            } else {
                ScanDirection::Forward
            };
            store
                .scan(view.id(), &key_range(options, collation), direction)
                .map_err(|e| view.storage_err(e))?
        }
    };
    Ok(cursor)
}

/// Reads map rows from `cursor`, applying `include_docs`, the post filter,
/// `skip` and `limit` in that order.
pub(crate) fn map_rows(
    view: &View,
    cursor: RowCursor,
    options: &QueryOptions,
    cancel: Option<&CancellationToken>,
) -> CoreResult<Vec<QueryRow>> {
    let store = view.store();
    let mut rows = Vec::new();
    if options.limit == 0 {
        return Ok(rows);
    }
    let mut skipped = 0;
    for item in cursor {
        super::check_cancelled(cancel)?;
        let mut row = QueryRow::from_index(item.map_err(|e| view.storage_err(e))?)?;
        if options.include_docs {
            attach_document(store, &mut row)?;
        }
        if let Some(filter) = &options.post_filter {
            if !filter(&row) {
                continue;
            }
        }
        if skipped < options.skip {
            skipped += 1;
            continue;
        }
        rows.push(row);
        if rows.len() >= options.limit {
            break;
        }
    }
    Ok(rows)
}

/// Attaches a document body to a map row.
///
/// A value of the form `{"_id": ..}` links to another document, optionally
/// at the revision named by `_rev`. A dangling link leaves the body empty and
/// the sequence zero.
pub(crate) fn attach_document(store: &dyn ViewStorage, row: &mut QueryRow) -> CoreResult<()> {
    let linked_id = row.value.get("_id").and_then(Value::as_str);
    if let Some(linked_id) = linked_id {
        let rev_id = row.value.get("_rev").and_then(Value::as_str);
        match store.document(linked_id, rev_id)? {
            Some(doc) => {
                row.sequence = doc.sequence;
                row.document = Some(document_body(doc));
            }
            None => {
                tracing::debug!(linked_id, "linked document not found");
                row.sequence = 0;
                row.document = None;
            }
        }
        return Ok(());
    }
    if let Some(doc_id) = &row.doc_id {
        row.document = store.document(doc_id, None)?.map(document_body);
    }
    Ok(())
}

fn document_body(doc: ResolvedDocument) -> Value {
    let mut body = doc.properties;
    if let Value::Object(fields) = &mut body {
        fields.insert("_id".to_string(), Value::String(doc.doc_id));
        fields.insert("_rev".to_string(), Value::String(doc.rev_id));
    }
    body
}
