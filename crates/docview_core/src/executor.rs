//! Background executor for asynchronous queries and live query drivers.

use crate::config::Config;
use crate::error::CoreResult;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Owns a runtime and shuts it down without blocking when dropped.
struct OwnedRuntime {
    runtime: Option<Runtime>,
}

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Shared background executor.
///
/// Index updates and scans run as blocking tasks. Live query drivers run as
/// async tasks. Cloning is cheap; all clones share one runtime.
#[derive(Clone)]
pub struct Executor {
    handle: Handle,
    _owned: Option<Arc<OwnedRuntime>>,
}

impl Executor {
    /// Builds a dedicated multi-threaded runtime from `config`.
    pub fn new(config: &Config) -> CoreResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        tracing::debug!(
            threads = config.worker_threads,
            name = %config.thread_name,
            "executor started"
        );
        Ok(Self {
            handle: runtime.handle().clone(),
            _owned: Some(Arc::new(OwnedRuntime {
                runtime: Some(runtime),
            })),
        })
    }

    /// Uses an existing runtime owned by the host application.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            _owned: None,
        }
    }

    /// Uses the ambient runtime if called from inside one, otherwise builds
    /// a dedicated runtime.
    pub fn current_or_new(config: &Config) -> CoreResult<Self> {
        match Handle::try_current() {
            Ok(handle) => Ok(Self::from_handle(handle)),
            Err(_) => Self::new(config),
        }
    }

    /// Returns the runtime handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns an async task.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tracing::trace!("executor.spawn");
        self.handle.spawn(fut)
    }

    /// Spawns blocking work.
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        tracing::trace!("executor.spawn_blocking");
        self.handle.spawn_blocking(f)
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("owned", &self._owned.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn runs_blocking_work_off_thread() {
        let executor = Executor::new(&Config::default()).unwrap();
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();
        executor.spawn_blocking(move || {
            tx.send(std::thread::current().id()).unwrap();
        });
        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn runs_async_tasks() {
        let executor = Executor::new(&Config::default().worker_threads(1)).unwrap();
        let (tx, rx) = mpsc::channel();
        executor.spawn(async move {
            tokio::task::yield_now().await;
            tx.send(42).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn from_handle_shares_host_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let executor = Executor::from_handle(runtime.handle().clone());
        let value = runtime.block_on(executor.spawn(async { 7 })).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn dropping_inside_runtime_does_not_panic() {
        let executor = Executor::new(&Config::default()).unwrap();
        let inner = executor.clone();
        let (tx, rx) = mpsc::channel();
        executor.spawn(async move {
            drop(inner);
            tx.send(()).unwrap();
        });
        drop(executor);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
