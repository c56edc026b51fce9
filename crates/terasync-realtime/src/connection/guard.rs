//! Per-connection bound on concurrently executing calls.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Limits how many calls of one connection run at once. Calls beyond the
/// limit wait for a permit instead of failing.
#[derive(Debug, Clone)]
pub struct InvocationGuard {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl InvocationGuard {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait for a free slot. `None` only when the guard was shut down.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().acquire_owned().await.ok()
    }

    /// Reject further calls, waking queued ones.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Calls currently executing.
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_excess_calls_queue() {
        let guard = InvocationGuard::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let guard = guard.clone();
            let running = running.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = guard.acquire().await.expect("permit");
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(guard.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiters() {
        let guard = InvocationGuard::new(1);
        let _held = guard.acquire().await.expect("permit");
        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.acquire().await.is_none() })
        };
        guard.shutdown();
        assert!(waiter.await.unwrap());
    }
}
