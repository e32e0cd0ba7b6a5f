//! Fixed-size batch execution for deep fetches.
//!
//! Each batch is issued concurrently and awaited together; the executor then
//! sleeps before the next batch. This is plain fixed-delay rate limiting.

use std::future::Future;
use std::time::Duration;

/// Batch size and inter-batch delay.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub size: usize,
    pub delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            size: 10,
            delay: Duration::from_millis(500),
        }
    }
}

/// Run `task` over `items` batch by batch. Output order matches input order.
pub async fn run_in_batches<T, R, F, Fut>(items: Vec<T>, policy: BatchPolicy, task: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let total = items.len();
    let size = policy.size.max(1);
    let mut out = Vec::with_capacity(total);
    let mut pending = items.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<T> = pending.by_ref().take(size).collect();
        out.extend(futures::future::join_all(batch.into_iter().map(&task)).await);
        tracing::trace!("batch done: {}/{total}", out.len());

        if pending.peek().is_some() && !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }
    out
}
