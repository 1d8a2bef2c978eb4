//! Optional concurrency limit around a backend.
//!
//! Backends are shared by every in-flight request. When a backend is not
//! known to be safe (or cheap) under concurrent invocation, a gate with a
//! limit of 1 serializes access to it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGate {
    semaphore: Option<Arc<Semaphore>>,
    limit: Option<usize>,
}

impl ConcurrencyGate {
    /// `None` admits any number of concurrent calls.
    pub fn new(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => Self {
                semaphore: Some(Arc::new(Semaphore::new(n.max(1)))),
                limit: Some(n.max(1)),
            },
            None => Self::unlimited(),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Run `fut` once a slot is available.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is never closed, so acquire only fails if that changes.
        let _permit = match &self.semaphore {
            Some(semaphore) => semaphore.acquire().await.ok(),
            None => None,
        };
        fut.await
    }
}
