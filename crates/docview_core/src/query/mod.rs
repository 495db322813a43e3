//! Queries over a view's index.
//!
//! [`Query`] holds the options and runs them, either synchronously with
//! [`Query::run`] or on the background executor with [`Query::run_async`].
//! Each run:
//!
//! 1. brings the index up to date according to the [`IndexUpdateMode`],
//! 2. scans the key range (or the explicit `keys`),
//! 3. groups and reduces the scanned rows when reduce or grouping is on,
//! 4. returns a [`QueryEnumerator`] snapshot.

mod enumerator;
mod options;
mod planner;
mod reduce;
mod row;

pub use enumerator::QueryEnumerator;
pub use options::{IndexUpdateMode, PostFilter, QueryOptions};
pub use row::QueryRow;

use crate::error::{CoreError, CoreResult};
use crate::live::LiveQuery;
use crate::view::View;
use docview_codec::decode;
use parking_lot::Mutex;
use reduce::Grouper;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) fn check_cancelled(cancel: Option<&CancellationToken>) -> CoreResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(CoreError::Cancelled),
        _ => Ok(()),
    }
}

/// Deletes an anonymous view once the last query using it is gone.
pub(crate) struct TemporaryView(pub(crate) View);

impl Drop for TemporaryView {
    fn drop(&mut self) {
        if let Err(err) = self.0.delete() {
            tracing::debug!(view = %self.0.name(), error = %err, "temporary view already gone");
        }
    }
}

/// Everything needed to run a query, detached from the [`Query`] handle.
#[derive(Clone)]
pub(crate) struct QueryJob {
    pub(crate) view: View,
    pub(crate) options: QueryOptions,
    temporary: Option<Arc<TemporaryView>>,
}

impl QueryJob {
    pub(crate) fn execute(&self, cancel: Option<&CancellationToken>) -> CoreResult<QueryEnumerator> {
        let view = &self.view;
        let options = &self.options;
        view.ensure_live()?;

        let functions = view.functions();
        let grouped = options.is_grouped();
        let reduce_requested = options.reduce.unwrap_or(functions.reduce.is_some());
        if reduce_requested && functions.reduce.is_none() && !grouped {
            return Err(CoreError::ReduceFunctionMissing {
                view: view.name().to_string(),
            });
        }
        let reduced = reduce_requested || grouped;
        if reduced && options.include_docs {
            return Err(CoreError::invalid_options(
                "include_docs cannot be combined with reduce or grouping",
            ));
        }

        let mode = options.index_update_mode;
        if mode != IndexUpdateMode::Never && functions.map.is_none() {
            return Err(CoreError::MapFunctionMissing {
                view: view.name().to_string(),
            });
        }
        check_cancelled(cancel)?;
        if mode == IndexUpdateMode::Before {
            view.update_index_with(cancel)?;
        }

        let sequence = view.last_sequence_indexed()?;
        let collation = view.collation()?;
        tracing::debug!(
            view = %view.name(),
            ?mode,
            reduced,
            grouped,
            group_level = options.group_level,
            descending = options.descending,
            keys = options.keys.as_ref().map_or(0, Vec::len),
            "running query"
        );

        let store = view.store();
        let cursor = planner::open_scan(store, view, options, collation)?;
        let rows = if reduced {
            let mut grouper = Grouper::new(
                collation,
                grouped,
                options.group_level,
                functions.reduce.clone(),
                view.name(),
            );
            for item in cursor {
                check_cancelled(cancel)?;
                let row = item.map_err(|e| view.storage_err(e))?;
                grouper.push(decode(&row.key)?, decode(&row.value)?);
            }
            window(grouper.finish(), options)
        } else {
            planner::map_rows(view, cursor, options, cancel)?
        };

        if mode == IndexUpdateMode::After {
            let view = view.clone();
            let _ = view.db.executor.clone().spawn_blocking(move || {
                if let Err(err) = view.update_index() {
                    tracing::warn!(view = %view.name(), error = %err, "background index update failed");
                }
            });
        }

        view.stats().record_query();
        Ok(QueryEnumerator::new(
            rows,
            sequence,
            Arc::clone(&view.db.store),
        ))
    }
}

/// Applies the post filter, `skip` and `limit` to reduced rows.
fn window(rows: Vec<QueryRow>, options: &QueryOptions) -> Vec<QueryRow> {
    rows.into_iter()
        .filter(|row| options.post_filter.as_ref().map_or(true, |filter| filter(row)))
        .skip(options.skip)
        .take(options.limit)
        .collect()
}

/// A query over one view.
///
/// # Example
///
/// ```
/// use docview_core::{map_fn, reducers, Config, Database, QueryOptions};
/// use docview_storage::MemoryStore;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// store.put("1", json!({"type": "a", "amount": 1})).unwrap();
/// store.put("2", json!({"type": "a", "amount": 2})).unwrap();
/// store.put("3", json!({"type": "b", "amount": 5})).unwrap();
///
/// let db = Database::open(store, Config::default()).unwrap();
/// let view = db.view("amounts").unwrap();
/// let map = map_fn(|doc, emit| {
///     emit.emit(doc["type"].clone(), doc["amount"].clone());
///     Ok(())
/// });
/// view.set_map_reduce(map, Some(reducers::sum()), "1").unwrap();
///
/// let rows = view
///     .create_query()
///     .with_options(QueryOptions::new().group_level(1))
///     .run()
///     .unwrap();
/// let pairs: Vec<_> = rows.map(|row| (row.key, row.value)).collect();
/// assert_eq!(pairs, vec![(json!("a"), json!(3)), (json!("b"), json!(5))]);
/// ```
pub struct Query {
    job: QueryJob,
    last_error: Mutex<Option<String>>,
}

impl Query {
    pub(crate) fn new(view: View) -> Self {
        let mode = view.db.config.default_index_update_mode;
        Self {
            job: QueryJob {
                view,
                options: QueryOptions::new().index_update_mode(mode),
                temporary: None,
            },
            last_error: Mutex::new(None),
        }
    }

    pub(crate) fn temporary(view: View) -> Self {
        let mut query = Self::new(view.clone());
        query.job.temporary = Some(Arc::new(TemporaryView(view)));
        query
    }

    /// Returns the view being queried.
    pub fn view(&self) -> &View {
        &self.job.view
    }

    /// Returns the options.
    pub fn options(&self) -> &QueryOptions {
        &self.job.options
    }

    /// Returns the options for in-place changes.
    pub fn options_mut(&mut self) -> &mut QueryOptions {
        &mut self.job.options
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.job.options = options;
        self
    }

    /// Runs the query on the calling thread.
    pub fn run(&self) -> CoreResult<QueryEnumerator> {
        let result = self.job.execute(None);
        *self.last_error.lock() = result.as_ref().err().map(ToString::to_string);
        result
    }

    /// Runs the query on the background executor.
    ///
    /// `callback` receives the result on an executor thread. It is not
    /// called if the run is cancelled through the returned handle. The
    /// query's [`last_error`](Self::last_error) is left untouched.
    pub fn run_async<F>(&self, callback: F) -> QueryHandle
    where
        F: FnOnce(CoreResult<QueryEnumerator>) + Send + 'static,
    {
        let job = self.job.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = self.job.view.db.executor.spawn_blocking(move || {
            match job.execute(Some(&token)) {
                Err(CoreError::Cancelled) => {
                    tracing::debug!(view = %job.view.name(), "async query cancelled");
                }
                result => callback(result),
            }
        });
        QueryHandle { join, cancel }
    }

    /// Returns the message of the last synchronous run's error, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Creates a live query with these options.
    pub fn to_live_query(&self) -> LiveQuery {
        LiveQuery::new(self.job.clone(), self.job.view.db.executor.clone())
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("view", &self.job.view.name())
            .field("options", &self.job.options)
            .field("temporary", &self.job.temporary.is_some())
            .finish()
    }
}

/// Handle to a query started with [`Query::run_async`].
#[derive(Debug)]
pub struct QueryHandle {
    join: JoinHandle<()>,
    cancel: CancellationToken,
}

impl QueryHandle {
    /// Requests cancellation. Best effort: a run that already finished still
    /// delivers its result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the run and its callback have finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the run and its callback to finish.
    pub async fn join(self) -> CoreResult<()> {
        self.join.await.map_err(io::Error::from)?;
        Ok(())
    }
}
