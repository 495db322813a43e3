//! The database facade: entry point owning views and the executor.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::executor::Executor;
use crate::query::Query;
use crate::reducers;
use crate::view::{MapFunction, View, ViewCompiler, ViewInner, ViewRegistry, ViewSource};
use docview_storage::ViewStorage;
use std::sync::Arc;

pub(crate) struct DatabaseInner {
    pub(crate) store: Arc<dyn ViewStorage>,
    pub(crate) config: Config,
    pub(crate) executor: Executor,
    pub(crate) views: ViewRegistry,
}

/// Views and queries over one document store.
///
/// Cloning is cheap; clones share views and the executor.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Opens a database over `store`, reusing the ambient tokio runtime if
    /// there is one and building a dedicated one otherwise.
    pub fn open(store: Arc<dyn ViewStorage>, config: Config) -> CoreResult<Self> {
        let executor = Executor::current_or_new(&config)?;
        Ok(Self::open_with_executor(store, config, executor))
    }

    /// Opens a database that runs background work on `executor`.
    pub fn open_with_executor(
        store: Arc<dyn ViewStorage>,
        config: Config,
        executor: Executor,
    ) -> Self {
        tracing::debug!(views = ?store.view_names().unwrap_or_default(), "database opened");
        Self {
            inner: Arc::new(DatabaseInner {
                store,
                config,
                executor,
                views: ViewRegistry::new(),
            }),
        }
    }

    /// Returns the named view, creating it if it does not exist.
    ///
    /// A new view uses the configured default collation and has no
    /// functions bound.
    pub fn view(&self, name: &str) -> CoreResult<View> {
        let store = &self.inner.store;
        let collation = self.inner.config.default_collation;
        let inner = self.inner.views.get_or_insert_with(name, || {
            let id = store.create_view(name, collation)?;
            Ok(Arc::new(ViewInner::new(name, id)))
        })?;
        Ok(View::new(inner, Arc::clone(&self.inner)))
    }

    /// Returns the named view if the store already has it.
    pub fn existing_view(&self, name: &str) -> CoreResult<Option<View>> {
        if self.inner.views.get(name).is_none() && self.inner.store.view_id(name)?.is_none() {
            return Ok(None);
        }
        self.view(name).map(Some)
    }

    /// Returns the names of every view in the store.
    pub fn view_names(&self) -> CoreResult<Vec<String>> {
        Ok(self.inner.store.view_names()?)
    }

    /// Compiles `source` and binds the result to the named view.
    ///
    /// Built-in reduce names (`_sum`, `_count`, `_stats`) are resolved
    /// without the compiler. Returns the view and whether its index was
    /// invalidated by a version change.
    pub fn compile_view(
        &self,
        name: &str,
        source: &ViewSource,
        compiler: &dyn ViewCompiler,
    ) -> CoreResult<(View, bool)> {
        let map = compiler
            .compile_map(&source.map, &source.language)
            .ok_or_else(|| CoreError::compile_failed(name, "map function rejected"))?;
        let reduce = match &source.reduce {
            Some(reduce) => Some(
                reducers::by_name(reduce)
                    .or_else(|| compiler.compile_reduce(reduce, &source.language))
                    .ok_or_else(|| CoreError::compile_failed(name, "reduce function rejected"))?,
            ),
            None => None,
        };
        let view = self.view(name)?;
        let changed = view.set_map_reduce(map, reduce, &source.effective_version())?;
        Ok((view, changed))
    }

    /// Creates a query over an anonymous view mapped by `map`.
    ///
    /// The view is deleted once the query, and every live query made from
    /// it, is dropped.
    pub fn slow_query(&self, map: Arc<dyn MapFunction>) -> CoreResult<Query> {
        let name = format!("$temp-{}", uuid::Uuid::new_v4().simple());
        let view = self.view(&name)?;
        view.set_map(map, "1")?;
        Ok(Query::temporary(view))
    }

    /// Returns the document store.
    pub fn store(&self) -> &Arc<dyn ViewStorage> {
        &self.inner.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the background executor.
    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    /// Returns the sequence of the most recent document write.
    pub fn last_sequence(&self) -> CoreResult<u64> {
        Ok(self.inner.store.current_max_sequence()?)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .field("views", &self.inner.views.names())
            .finish()
    }
}
