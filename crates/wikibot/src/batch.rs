//! Bulk-operation schedulers, generic over any asynchronous unit of work.
//!
//! Neither scheduler knows anything about the API client; higher-level bulk
//! operations pass workers that call into it. Worker failures are tallied and
//! logged, never propagated: the caller always gets a final
//! [`BatchSummary`] once every item has settled.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

/// Final accounting of a bulk operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub successes: usize,
    pub failures: usize,
}

/// Run `worker` over `items` with at most `concurrency` invocations in
/// flight.
///
/// Items are dispatched in consecutive groups of `concurrency`: everything in
/// a group fans out at once, and the next group starts only after the whole
/// group has settled. The worker receives each item together with its index
/// in `items`. The `Fut: Future` bound is what makes a non-awaitable worker
/// impossible; there is no runtime check to fail.
pub async fn batch_operation<T, W, Fut, R, E>(
    items: &[T],
    worker: W,
    concurrency: usize,
) -> BatchSummary
where
    W: Fn(&T, usize) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let concurrency = concurrency.max(1);
    let total = items.len();
    let completed = AtomicUsize::new(0);
    let successes = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);

    for (group_index, group) in items.chunks(concurrency).enumerate() {
        let base = group_index * concurrency;
        join_all(group.iter().enumerate().map(|(offset, item)| {
            let work = worker(item, base + offset);
            let completed = &completed;
            let successes = &successes;
            let failures = &failures;
            async move {
                let ok = work.await.is_ok();
                record_settlement(completed, successes, failures, total, ok);
            }
        }))
        .await;
    }

    BatchSummary {
        successes: successes.load(Ordering::Relaxed),
        failures: failures.load(Ordering::Relaxed),
    }
}

/// Run `worker` over `items` strictly one at a time, pausing `delay` between
/// one item settling and the next dispatching. Same tally rules as
/// [`batch_operation`].
pub async fn series_batch_operation<T, W, Fut, R, E>(
    items: &[T],
    worker: W,
    delay: Duration,
) -> BatchSummary
where
    W: Fn(&T, usize) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let total = items.len();
    let completed = AtomicUsize::new(0);
    let successes = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);

    for (index, item) in items.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let ok = worker(item, index).await.is_ok();
        record_settlement(&completed, &successes, &failures, total, ok);
    }

    BatchSummary {
        successes: successes.load(Ordering::Relaxed),
        failures: failures.load(Ordering::Relaxed),
    }
}

fn record_settlement(
    completed: &AtomicUsize,
    successes: &AtomicUsize,
    failures: &AtomicUsize,
    total: usize,
    ok: bool,
) {
    if ok {
        successes.fetch_add(1, Ordering::Relaxed);
    } else {
        failures.fetch_add(1, Ordering::Relaxed);
    }
    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
    let percentage = if total == 0 { 100 } else { done * 100 / total };
    if ok {
        info!(
            completed = done,
            total,
            percentage,
            successes = successes.load(Ordering::Relaxed),
            "batch progress"
        );
    } else {
        warn!(
            completed = done,
            total,
            percentage,
            successes = successes.load(Ordering::Relaxed),
            "batch item failed"
        );
    }
}
