use std::future::Future;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

/// Runs `run_one` over every item with at most `max_parallel` in flight and
/// waits for all of them to settle.
///
/// Never short-circuits: each item's result (success or failure) is returned,
/// in completion order. Callers key results by name, not by position.
pub async fn settle_all<T, R, F, Fut>(items: Vec<T>, max_parallel: usize, run_one: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let sem = Semaphore::new(max_parallel.max(1));
    let sem = &sem;
    let run_one = &run_one;
    let mut futs: FuturesUnordered<_> = FuturesUnordered::new();

    for item in items {
        futs.push(async move {
            // The semaphore is never closed; a failed acquire just runs unbounded.
            let _permit = sem.acquire().await.ok();
            run_one(item).await
        });
    }

    let mut results = Vec::with_capacity(futs.len());
    while let Some(r) = futs.next().await {
        results.push(r);
    }
    results
}
