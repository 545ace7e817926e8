//! Deferred execution of retry re-checks.
//!
//! The coordinator never sleeps itself; it asks a [`RetryScheduler`] to run a
//! callback later. Production code uses [`TokioScheduler`]; tests use
//! [`ManualScheduler`] and fire callbacks by hand.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};

/// Work to run once a delay has elapsed.
pub type RetryCallback = Box<dyn FnOnce() + Send + 'static>;

/// Runs callbacks after a delay.
pub trait RetryScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, callback: RetryCallback);
}

/// Name of the worker thread that runs timers scheduled outside a runtime.
pub const TIMER_THREAD_NAME: &str = "faultline-retry";

static TIMER_RUNTIME: OnceLock<Option<Runtime>> = OnceLock::new();

/// A single-worker runtime shared by every timer armed outside tokio.
fn timer_runtime() -> Option<&'static Runtime> {
    TIMER_RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name(TIMER_THREAD_NAME)
                .enable_time()
                .build()
                .map_err(|e| tracing::warn!(error = %e, "Could not start retry timer runtime"))
                .ok()
        })
        .as_ref()
}

/// Sleeps on the current tokio runtime. Outside one, timers share a single
/// background worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl RetryScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: RetryCallback) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => match timer_runtime() {
                Some(runtime) => runtime.handle().clone(),
                None => {
                    tracing::warn!(delay_ms = delay.as_millis() as u64, "Retry re-check dropped");
                    return;
                }
            },
        };
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
    }
}

/// Queues callbacks until a test fires them.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<(Duration, RetryCallback)>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the oldest queued callback. Returns the delay it was scheduled
    /// with, or `None` if the queue was empty.
    pub fn fire_next(&self) -> Option<Duration> {
        let next = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.map(|(delay, callback)| {
            callback();
            delay
        })
    }

    /// Fires callbacks, including ones scheduled while firing, until none
    /// remain. Returns the delays in firing order.
    pub fn run_until_idle(&self) -> Vec<Duration> {
        std::iter::from_fn(|| self.fire_next()).collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn pending_delays(&self) -> Vec<Duration> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(delay, _)| *delay)
            .collect()
    }
}

impl RetryScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: RetryCallback) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back((delay, callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_manual_scheduler_fires_in_order() {
        let scheduler = ManualScheduler::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3u64 {
            let hits = hits.clone();
            scheduler.schedule(
                Duration::from_millis(i * 10),
                Box::new(move || hits.lock().unwrap().push(i)),
            );
        }

        assert_eq!(scheduler.pending(), 3);
        assert_eq!(
            scheduler.pending_delays(),
            vec![
                Duration::from_millis(0),
                Duration::from_millis(10),
                Duration::from_millis(20)
            ]
        );
        assert_eq!(scheduler.fire_next(), Some(Duration::from_millis(0)));
        scheduler.run_until_idle();
        assert_eq!(*hits.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(scheduler.fire_next(), None);
    }

    #[test]
    fn test_callbacks_may_reschedule() {
        let scheduler = Arc::new(ManualScheduler::new());
        let count = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = scheduler.clone();
        let inner_count = count.clone();
        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                inner_count.fetch_add(1, Ordering::SeqCst);
                let again = inner_count.clone();
                inner_scheduler.schedule(
                    Duration::from_millis(10),
                    Box::new(move || {
                        again.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        let delays = scheduler.run_until_idle();
        assert_eq!(
            delays,
            vec![Duration::from_millis(5), Duration::from_millis(10)]
        );
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_timers_outside_runtime_share_one_thread() {
        let (tx, rx) = std::sync::mpsc::channel();
        for i in 0..20u64 {
            let tx = tx.clone();
            TokioScheduler.schedule(
                Duration::from_millis(i % 4),
                Box::new(move || {
                    let current = std::thread::current();
                    let _ = tx.send((current.id(), current.name().map(str::to_string)));
                }),
            );
        }
        drop(tx);

        let fired: Vec<_> = rx.iter().collect();
        assert_eq!(fired.len(), 20);
        let threads: std::collections::HashSet<_> = fired.iter().map(|(id, _)| *id).collect();
        assert_eq!(threads.len(), 1);
        assert_eq!(fired[0].1.as_deref(), Some(TIMER_THREAD_NAME));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_waits_for_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = fired.clone();
        TokioScheduler.schedule(
            Duration::from_secs(5),
            Box::new(move || {
                flag.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
