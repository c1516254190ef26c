//! Bounded-parallelism executor layered on a `ConcurrencyGroup`: a semaphore
//! caps concurrent submissions at `max_workers`, exposing
//! `submit(fn) -> Future<T>`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};

use crate::concurrency::ConcurrencyGroup;
use crate::errors::MngError;

pub struct ConcurrencyGroupExecutor {
    group: ConcurrencyGroup,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGroupExecutor {
    pub fn new(parent: &ConcurrencyGroup, name: impl Into<String>, max_workers: usize) -> Self {
        Self {
            group: parent.make_concurrency_group(name, Duration::from_secs(u64::MAX)),
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Submit a future for concurrent execution, bounded by `max_workers`.
    /// Returns a receiver that resolves once the work completes.
    pub async fn submit<F, T>(&self, fut: F) -> oneshot::Receiver<Result<T, MngError>>
    where
        F: Future<Output = Result<T, MngError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let semaphore = self.semaphore.clone();
        self.group
            .start_new_task(None, false, async move {
                let _permit = semaphore.acquire_owned().await;
                let result = fut.await;
                let _ = tx.send(result);
                Ok(())
            })
            .await;
        rx
    }

    /// Wait for every submitted task to finish.
    pub async fn join(&self) {
        let _ = self.group.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounds_concurrency_and_returns_results() {
        let group = ConcurrencyGroup::make("parent", Duration::from_secs(5));
        let executor = ConcurrencyGroupExecutor::new(&group, "exec", 2);

        let mut receivers = Vec::new();
        for i in 0..5 {
            let rx = executor.submit(async move { Ok::<_, MngError>(i * 2) }).await;
            receivers.push(rx);
        }
        executor.join().await;

        let mut results: Vec<i32> = Vec::new();
        for rx in receivers {
            results.push(rx.await.unwrap().unwrap());
        }
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
    }
}
