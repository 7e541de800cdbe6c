//! Background refresh scheduling
//!
//! Keeps a long-lived process fresh across the day boundary without user
//! action. Two advisory mechanisms run inside one task: an hourly polling
//! re-check and a precise one-shot timer that fires at the next midnight in
//! the target timezone and then reschedules itself. Neither is required for
//! correctness (the on-access check in the cache policy is), so a missed
//! tick is harmless.
//!
//! The scheduler is an explicit object with `start`/`stop`, owned by the
//! process root; stopping it cancels both timers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::clock::DayClock;

/// Callback invoked on each trigger; the flag is true for the midnight
/// refresh, which bypasses the freshness check.
pub type RefreshFn = Arc<dyn Fn(bool) -> BoxFuture<'static, ()> + Send + Sync>;

/// Configuration for the background refresh task
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between freshness re-checks
    pub poll_interval: Duration,
    /// Whether background refresh runs at all
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3600), // 1 hour
            enabled: true,
        }
    }
}

/// Handle for the background refresh task
pub struct RefreshScheduler {
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Spawns the background refresh task.
    ///
    /// The poll arm re-evaluates freshness every `poll_interval`; the
    /// midnight arm sleeps until the next day boundary, forces a refresh,
    /// and recomputes the following boundary on the next loop pass. The
    /// clock guarantees a non-zero wait at the boundary itself, so the
    /// midnight arm cannot spin.
    pub fn start(config: SchedulerConfig, clock: DayClock, refresh: RefreshFn) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = if config.enabled {
            Some(tokio::spawn(async move {
                let mut poll = tokio::time::interval(config.poll_interval);
                // Skip the first tick (immediate)
                poll.tick().await;

                loop {
                    let until_midnight = clock
                        .duration_until_next_midnight(Utc::now())
                        .to_std()
                        .unwrap_or(Duration::from_secs(24 * 60 * 60));

                    tokio::select! {
                        _ = poll.tick() => {
                            debug!("periodic freshness re-check");
                            refresh(false).await;
                        }
                        _ = tokio::time::sleep(until_midnight) => {
                            info!(timezone = %clock.timezone(), "day boundary crossed, forcing refresh");
                            refresh(true).await;
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            }))
        } else {
            None
        };

        Self { shutdown_tx, task }
    }

    /// Stops the background task and waits for it to wind down
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_refresh(counter: Arc<AtomicUsize>) -> RefreshFn {
        Arc::new(move |_force| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(3600));
        assert!(config.enabled);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_never_refreshes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::start(
            SchedulerConfig {
                poll_interval: Duration::from_millis(5),
                enabled: false,
            },
            DayClock::eastern(),
            counting_refresh(counter.clone()),
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        scheduler.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_polling_triggers_refresh() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::start(
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                enabled: true,
            },
            DayClock::eastern(),
            counting_refresh(counter.clone()),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop().await;
        assert!(
            counter.load(Ordering::SeqCst) >= 1,
            "polling should have fired at least once"
        );
    }

    #[tokio::test]
    async fn test_stop_cancels_the_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::start(
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                enabled: true,
            },
            DayClock::eastern(),
            counting_refresh(counter.clone()),
        );

        scheduler.stop().await;
        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            counter.load(Ordering::SeqCst),
            after_stop,
            "no refreshes may fire after stop"
        );
    }
}
