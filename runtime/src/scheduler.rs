//! Periodic worker harness.
//!
//! Every scheduled driver in the system (dispatcher, DLQ monitor, coupon
//! drain, statistics fold, cache warmer, order expiry) runs as a tokio task
//! on an interval with a shared `watch`-channel shutdown, the same shape the
//! dispatcher loop itself uses. Cycle errors are logged; the worker keeps
//! ticking.

use std::future::Future;
use std::time::Duration;
use storefront_core::error::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawn a named periodic worker.
///
/// `task` is invoked once per tick; a failing cycle is logged and the next
/// tick proceeds. The worker exits when `shutdown` flips to `true`.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(worker = name, "worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = task().await {
                        tracing::error!(worker = name, error = %e, "worker cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!(worker = name, "worker stopped");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn worker_ticks_until_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let handle = spawn_periodic(
            "test-worker",
            Duration::from_millis(10),
            shutdown_rx,
            move || {
                let ticks = Arc::clone(&ticks_clone);
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn failing_cycles_do_not_kill_the_worker() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let handle = spawn_periodic(
            "flaky-worker",
            Duration::from_millis(10),
            shutdown_rx,
            move || {
                let ticks = Arc::clone(&ticks_clone);
                async move {
                    let n = ticks.fetch_add(1, Ordering::SeqCst);
                    if n % 2 == 0 {
                        Err(storefront_core::CommerceError::Validation {
                            message: "every other tick fails".to_string(),
                        })
                    } else {
                        Ok(())
                    }
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }
}
