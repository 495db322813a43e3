//! Live queries: queries that re-run when documents change.
//!
//! A running [`LiveQuery`] owns a driver task on the executor. The driver is
//! the only consumer of a command queue fed by the change feed, by
//! [`LiveQuery::update`] and by finished query runs, so every state
//! transition happens on one task:
//!
//! ```text
//!            Refresh                  Refresh
//!   Idle ─────────────▶ Updating ─────────────▶ UpdatingRerunPending
//!    ▲                   │   ▲                          │
//!    └──── Finished ─────┘   └─────── Finished ─────────┘
//! ```
//!
//! At most one query runs at a time. Any number of refresh requests that
//! arrive while a query runs collapse into a single rerun.

use crate::error::{CoreError, CoreResult};
use crate::executor::Executor;
use crate::query::{QueryEnumerator, QueryJob};
use docview_storage::ObserverId;
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Observable state of a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveQueryState {
    /// Not running; changes are ignored.
    Stopped,
    /// Running with no query in flight.
    Idle,
    /// A query is in flight.
    Updating,
    /// A query is in flight and another run is queued behind it.
    UpdatingRerunPending,
}

/// Identifies a listener registered with [`LiveQuery::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What listeners are told when a run completes with news.
#[derive(Debug, Clone)]
pub struct LiveQueryChange {
    /// Current rows. Unchanged by a failed run.
    pub rows: Option<QueryEnumerator>,
    /// The failure, if the run failed.
    pub error: Option<Arc<CoreError>>,
}

type Listener = Arc<dyn Fn(&LiveQueryChange) + Send + Sync>;

enum Command {
    Refresh,
    Finished(CoreResult<QueryEnumerator>),
    Stop,
}

struct LiveState {
    phase: LiveQueryState,
    generation: u64,
    rows: Option<QueryEnumerator>,
    last_error: Option<Arc<CoreError>>,
    commands: Option<UnboundedSender<Command>>,
    observer: Option<ObserverId>,
}

struct Shared {
    job: QueryJob,
    executor: Executor,
    state: Mutex<LiveState>,
    changed: Condvar,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    queries_started: AtomicU64,
}

/// A query whose results follow the database.
///
/// Create one with [`Query::to_live_query`](crate::Query::to_live_query).
/// Failures never escape [`start`](Self::start), [`stop`](Self::stop) or
/// [`update`](Self::update); they are recorded and passed to listeners, and
/// the live query keeps running.
///
/// Dropping a live query stops it.
pub struct LiveQuery {
    shared: Arc<Shared>,
}

impl LiveQuery {
    pub(crate) fn new(job: QueryJob, executor: Executor) -> Self {
        Self {
            shared: Arc::new(Shared {
                job,
                executor,
                state: Mutex::new(LiveState {
                    phase: LiveQueryState::Stopped,
                    generation: 0,
                    rows: None,
                    last_error: None,
                    commands: None,
                    observer: None,
                }),
                changed: Condvar::new(),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                queries_started: AtomicU64::new(0),
            }),
        }
    }

    /// Starts observing changes and runs the query. No-op if running.
    pub fn start(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.phase != LiveQueryState::Stopped {
            return;
        }
        state.generation += 1;
        state.rows = None;
        state.last_error = None;
        let generation = state.generation;
        let (tx, rx) = mpsc::unbounded_channel();

        let feed_tx = tx.clone();
        let observer = shared
            .job
            .view
            .store()
            .change_feed()
            .observe(move |_event| {
                let _ = feed_tx.send(Command::Refresh);
            });

        state.phase = LiveQueryState::Idle;
        state.commands = Some(tx.clone());
        state.observer = Some(observer);
        drop(state);

        tracing::debug!(view = %shared.job.view.name(), generation, "live query started");
        shared
            .executor
            .spawn(drive(Arc::clone(shared), generation, rx, tx.clone()));
        let _ = tx.send(Command::Refresh);
    }

    /// Stops observing changes and cancels work in flight. No-op if stopped.
    pub fn stop(&self) {
        let shared = &self.shared;
        let (observer, commands) = {
            let mut state = shared.state.lock();
            if state.phase == LiveQueryState::Stopped {
                return;
            }
            state.phase = LiveQueryState::Stopped;
            (state.observer.take(), state.commands.take())
        };
        if let Some(id) = observer {
            shared.job.view.store().change_feed().unobserve(id);
        }
        if let Some(tx) = commands {
            let _ = tx.send(Command::Stop);
        }
        shared.changed.notify_all();
        tracing::debug!(view = %shared.job.view.name(), "live query stopped");
    }

    /// Requests a re-run. No-op if stopped.
    pub fn update(&self) {
        if let Some(tx) = &self.shared.state.lock().commands {
            let _ = tx.send(Command::Refresh);
        }
    }

    /// Blocks until the first run completes and returns its rows.
    ///
    /// Starts the live query if needed. Must not be called from an executor
    /// thread.
    pub fn wait_for_rows(&self) -> CoreResult<QueryEnumerator> {
        self.start();
        let mut state = self.shared.state.lock();
        loop {
            if let Some(rows) = &state.rows {
                return Ok(rows.clone());
            }
            if let Some(err) = &state.last_error {
                return Err(CoreError::QueryFailed(Arc::clone(err)));
            }
            if state.phase == LiveQueryState::Stopped {
                return Err(CoreError::LiveQueryStopped);
            }
            self.shared.changed.wait(&mut state);
        }
    }

    /// Starts the live query if needed and returns the cached rows.
    pub fn rows(&self) -> Option<QueryEnumerator> {
        self.start();
        self.shared.state.lock().rows.clone()
    }

    /// Returns the error of the most recent failed run.
    ///
    /// Cleared by the next successful run.
    pub fn last_error(&self) -> Option<Arc<CoreError>> {
        self.shared.state.lock().last_error.clone()
    }

    /// Registers a listener called after each run that changed the rows or
    /// failed. Listeners run on executor threads.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LiveQueryChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::SeqCst));
        self.shared.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Returns the current state.
    pub fn state(&self) -> LiveQueryState {
        self.shared.state.lock().phase
    }

    /// Returns true unless stopped.
    pub fn is_running(&self) -> bool {
        self.state() != LiveQueryState::Stopped
    }

    /// Returns how many query runs have been started.
    pub fn queries_started(&self) -> u64 {
        self.shared.queries_started.load(Ordering::SeqCst)
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("view", &self.shared.job.view.name())
            .field("state", &self.state())
            .field("queries_started", &self.queries_started())
            .finish()
    }
}

/// The driver: sole consumer of one live query's commands.
async fn drive(
    shared: Arc<Shared>,
    generation: u64,
    mut commands: UnboundedReceiver<Command>,
    tx: UnboundedSender<Command>,
) {
    let mut in_flight: Option<CancellationToken> = None;
    let mut rerun = false;
    while let Some(command) = commands.recv().await {
        match command {
            Command::Refresh => {
                if in_flight.is_none() {
                    in_flight = Some(shared.start_run(generation, &tx));
                } else if !rerun {
                    rerun = true;
                    shared.set_phase(generation, LiveQueryState::UpdatingRerunPending);
                }
            }
            Command::Finished(result) => {
                in_flight = None;
                shared.complete(generation, result);
                if rerun {
                    rerun = false;
                    in_flight = Some(shared.start_run(generation, &tx));
                } else {
                    shared.set_phase(generation, LiveQueryState::Idle);
                }
            }
            Command::Stop => {
                if let Some(token) = in_flight.take() {
                    token.cancel();
                }
                break;
            }
        }
    }
}

impl Shared {
    fn is_current(state: &LiveState, generation: u64) -> bool {
        state.generation == generation && state.phase != LiveQueryState::Stopped
    }

    fn set_phase(&self, generation: u64, phase: LiveQueryState) {
        let mut state = self.state.lock();
        if Self::is_current(&state, generation) && state.phase != phase {
            tracing::debug!(view = %self.job.view.name(), from = ?state.phase, to = ?phase, "live query state");
            state.phase = phase;
        }
    }

    fn start_run(&self, generation: u64, tx: &UnboundedSender<Command>) -> CancellationToken {
        self.set_phase(generation, LiveQueryState::Updating);
        self.queries_started.fetch_add(1, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let job = self.job.clone();
        let tx = tx.clone();
        self.executor.spawn_blocking(move || {
            let result = job.execute(Some(&token));
            let _ = tx.send(Command::Finished(result));
        });
        cancel
    }

    fn complete(&self, generation: u64, result: CoreResult<QueryEnumerator>) {
        let change = {
            let mut state = self.state.lock();
            if !Self::is_current(&state, generation) {
                return;
            }
            match result {
                Ok(rows) => {
                    state.last_error = None;
                    if state.rows.as_ref() == Some(&rows) {
                        None
                    } else {
                        state.rows = Some(rows.clone());
                        Some(LiveQueryChange {
                            rows: Some(rows),
                            error: None,
                        })
                    }
                }
                Err(err) if err.is_retryable() => {
                    tracing::debug!(view = %self.job.view.name(), "live query run cancelled");
                    None
                }
                Err(err) => {
                    tracing::warn!(view = %self.job.view.name(), error = %err, "live query run failed");
                    let err = Arc::new(err);
                    state.last_error = Some(Arc::clone(&err));
                    Some(LiveQueryChange {
                        rows: state.rows.clone(),
                        error: Some(err),
                    })
                }
            }
        };
        self.changed.notify_all();
        if let Some(change) = change {
            let listeners: Vec<Listener> = self
                .listeners
                .read()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for listener in listeners {
                listener(&change);
            }
        }
    }
}
