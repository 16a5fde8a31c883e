use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

/// Runs `perform` over `items` with exactly `concurrency` workers pulling
/// from a queue that holds at most `concurrency` pending items.
///
/// A failing item is logged and counted; it never stops the other workers
/// or the producer. Items are processed exactly once, in no particular
/// order. Returns after every worker has exited.
pub async fn for_each_concurrent<T, F, Fut, E>(
    items: impl IntoIterator<Item = T>,
    concurrency: usize,
    perform: F,
) -> BatchReport
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let (tx, rx) = mpsc::channel::<T>(concurrency);
    let rx = Arc::new(Mutex::new(rx));
    let perform = Arc::new(perform);
    let completed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::with_capacity(concurrency);
    for worker in 0..concurrency {
        let rx = Arc::clone(&rx);
        let perform = Arc::clone(&perform);
        let completed = Arc::clone(&completed);
        let failed = Arc::clone(&failed);
        workers.push(tokio::spawn(async move {
            loop {
                let next = rx.lock().await.recv().await;
                let Some(item) = next else {
                    break;
                };
                match perform(item).await {
                    Ok(()) => {
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(worker, "{err}");
                    }
                }
            }
        }));
    }

    for item in items {
        if tx.send(item).await.is_err() {
            tracing::error!("transfer queue closed early, remaining items skipped");
            break;
        }
    }
    drop(tx);

    for handle in workers {
        if let Err(err) = handle.await {
            tracing::error!("transfer worker panicked: {err}");
        }
    }

    BatchReport {
        completed: completed.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    }
}
