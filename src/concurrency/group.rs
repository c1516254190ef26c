//! `ConcurrencyGroup`: a scoped container for structured concurrency,
//! realized over `tokio::task::JoinSet` rather than OS threads directly,
//! since the rest of the engine (tmux polling, rsync children, remote-mng
//! HTTP calls) is already async. CPU-bound work is spawned via
//! `spawn_blocking` and tracked the same way as any other worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::errors::MngError;

/// What happened when a group's workers were joined on scope exit.
#[derive(Debug, Default)]
pub struct JoinOutcome {
    /// Errors collected from workers that were `is_checked` and failed.
    pub errors: Vec<MngError>,
}

impl JoinOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn a non-empty outcome into a `ConcurrencyExceptionGroup`, or `Ok(())`.
    pub fn into_result(self) -> Result<(), MngError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            let messages = self.errors.iter().map(|e| e.to_string()).collect();
            Err(MngError::ConcurrencyExceptionGroup(
                self.errors.len(),
                messages,
            ))
        }
    }
}

/// A handle shared by a `ConcurrencyGroup` and its children, so that
/// cancelling a parent cancels every descendant.
#[derive(Clone)]
pub struct ConcurrencyGroupHandle {
    pub(crate) token: CancellationToken,
}

impl ConcurrencyGroupHandle {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel()
    }
}

/// Owns a set of worker tasks and child subprocesses, joining (or
/// cancelling) all of them together on scope exit.
///
/// Every command entrypoint owns exactly one top-level group; every child
/// operation (provider list, per-host probe, rsync call) runs in a
/// subordinate group created with `make_concurrency_group`.
pub struct ConcurrencyGroup {
    name: String,
    exit_timeout: Duration,
    token: CancellationToken,
    tasks: Arc<Mutex<JoinSet<Result<(), MngError>>>>,
    silenced: Vec<fn(&MngError) -> bool>,
}

impl ConcurrencyGroup {
    /// Create a new top-level group. `exit_timeout` bounds how long scope
    /// exit waits for workers to finish before they are considered hung
    /// (callers may still choose to await longer by not dropping the group).
    pub fn make(name: impl Into<String>, exit_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            exit_timeout,
            token: CancellationToken::new(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            silenced: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> ConcurrencyGroupHandle {
        ConcurrencyGroupHandle {
            token: self.token.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal cancellation to every worker and child process registered
    /// with this group (and any child groups derived from it).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Register a predicate identifying exceptions that should be swallowed
    /// rather than surfaced in the join outcome (e.g. expected cancellation).
    pub fn silence(&mut self, predicate: fn(&MngError) -> bool) {
        self.silenced.push(predicate);
    }

    /// Create a child group nested in this one: cancelling the parent
    /// cancels the child, but the child can be joined independently.
    pub fn make_concurrency_group(&self, name: impl Into<String>, exit_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            exit_timeout,
            token: self.token.child_token(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            silenced: self.silenced.clone(),
        }
    }

    /// Launch an async worker tracked by this group.
    #[instrument(skip(self, fut), fields(group = %self.name, worker = %name.as_ref().map(str::to_string).unwrap_or_default()))]
    pub async fn start_new_task<F>(&self, name: Option<&str>, is_checked: bool, fut: F)
    where
        F: std::future::Future<Output = Result<(), MngError>> + Send + 'static,
    {
        let _ = name;
        let mut tasks = self.tasks.lock().await;
        tasks.spawn(async move {
            let result = fut.await;
            if is_checked {
                result
            } else {
                Ok(())
            }
        });
    }

    /// Launch a blocking worker (CPU-bound or synchronous I/O) tracked by
    /// this group, via `spawn_blocking`.
    pub async fn start_blocking_task<F>(&self, is_checked: bool, f: F)
    where
        F: FnOnce() -> Result<(), MngError> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        tasks.spawn(async move {
            let result = tokio::task::spawn_blocking(f)
                .await
                .map_err(|e| MngError::Other(anyhow::anyhow!("worker panicked: {e}")))
                .and_then(|r| r);
            if is_checked {
                result
            } else {
                Ok(())
            }
        });
    }

    /// Join all registered workers in completion order, applying the
    /// group's `exit_timeout`. Exceptions from checked workers are
    /// collected into the returned `JoinOutcome` rather than propagated
    /// individually; the caller decides whether to turn that into a single
    /// aggregate error via `JoinOutcome::into_result`.
    pub async fn join(&self) -> JoinOutcome {
        let mut outcome = JoinOutcome::default();
        let mut tasks = self.tasks.lock().await;

        let join_all = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        if !self.silenced.iter().any(|p| p(&e)) {
                            outcome.errors.push(e);
                        }
                    }
                    Err(join_err) => {
                        outcome.errors.push(MngError::Other(anyhow::anyhow!(
                            "worker task failed: {join_err}"
                        )));
                    }
                }
            }
        };

        if tokio::time::timeout(self.exit_timeout, join_all)
            .await
            .is_err()
        {
            warn!(group = %self.name, "timed out waiting for workers to exit, cancelling");
            self.cancel();
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn joins_successful_workers() {
        let group = ConcurrencyGroup::make("test", Duration::from_secs(5));
        group
            .start_new_task(Some("ok"), true, async { Ok(()) })
            .await;
        let outcome = group.join().await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn collects_checked_worker_errors() {
        let group = ConcurrencyGroup::make("test", Duration::from_secs(5));
        group
            .start_new_task(Some("fail"), true, async {
                Err(MngError::UserInput("boom".into()))
            })
            .await;
        let outcome = group.join().await;
        assert!(!outcome.is_ok());
        assert!(outcome.into_result().is_err());
    }

    #[tokio::test]
    async fn unchecked_worker_errors_are_swallowed() {
        let group = ConcurrencyGroup::make("test", Duration::from_secs(5));
        group
            .start_new_task(Some("fail"), false, async {
                Err(MngError::UserInput("boom".into()))
            })
            .await;
        let outcome = group.join().await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn child_group_is_cancelled_with_parent() {
        let parent = ConcurrencyGroup::make("parent", Duration::from_secs(5));
        let child = parent.make_concurrency_group("child", Duration::from_secs(5));
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
