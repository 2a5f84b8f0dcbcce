//! Periodic collection scheduling
//!
//! One background task drives the collector. The timer accumulates absolute
//! deadlines (`next = next + interval`) so a slow cycle delays at most its
//! own tick instead of compounding drift; an overdue deadline fires
//! immediately and re-anchors the schedule at the current instant. The wait
//! is interruptible: a shutdown signal wakes it at once, but a cycle already
//! in flight always runs to completion.

use super::Collector;
use crate::health::{components, ComponentHealth, HealthRegistry};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Outcome of one timer wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Fired,
    Cancelled,
}

/// Interruptible timer with drift-corrected absolute deadlines.
#[derive(Debug)]
pub struct PeriodicTimer {
    interval: Duration,
    next: Instant,
}

impl PeriodicTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Compute the next deadline. An overdue deadline is due now and the
    /// schedule re-anchors from the current instant.
    fn advance(&mut self) -> Instant {
        self.next += self.interval;
        let now = Instant::now();
        if self.next <= now {
            self.next = now;
        }
        self.next
    }

    /// Wait for the next deadline or a shutdown signal, whichever is first.
    pub async fn wait_until_next_tick(&mut self, shutdown: &mut watch::Receiver<bool>) -> Tick {
        let deadline = self.advance();
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => Tick::Fired,
            _ = shutdown.changed() => Tick::Cancelled,
        }
    }
}

/// Handle to a running collection loop.
pub struct CollectionHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CollectionHandle {
    /// Signal shutdown and wait for the loop to exit.
    ///
    /// A cycle already in progress finishes first; only the next tick is
    /// suppressed, so shutdown latency is bounded by the cycle duration.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(error) = self.task.await {
            warn!(error = %error, "Collection loop task failed to join");
        }
    }
}

/// Periodic collection loop around a [`Collector`].
pub struct CollectionLoop {
    collector: Collector,
    health: HealthRegistry,
}

impl CollectionLoop {
    pub fn new(collector: Collector, health: HealthRegistry) -> Self {
        Self { collector, health }
    }

    /// Spawn the background loop and return its handle.
    pub fn start(self) -> CollectionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        CollectionHandle { shutdown_tx, task }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.collector.run_interval();
        info!(
            interval_secs = interval.as_secs(),
            "Starting node collection loop"
        );

        // Sampling window starts counting from loop start
        self.collector.reset_sampler(Utc::now().timestamp());

        let mut timer = PeriodicTimer::new(interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            match timer.wait_until_next_tick(&mut shutdown).await {
                Tick::Cancelled => break,
                Tick::Fired => self.run_cycle().await,
            }
        }

        info!("Node collection loop exited");
    }

    /// Run one cycle; a failed cycle is logged and reported, never fatal.
    async fn run_cycle(&mut self) {
        match self.collector.enumerate().await {
            Ok(summary) => {
                info!(
                    pages = summary.pages,
                    nodes = summary.nodes,
                    records = summary.records,
                    transform_errors = summary.transform_errors,
                    "Collection cycle complete"
                );
                self.health
                    .set_component(components::COLLECTOR, ComponentHealth::healthy())
                    .await;
            }
            Err(error) => {
                warn!(error = %error, "Collection cycle failed");
                self.collector.report_exception(&error);
                self.health
                    .set_component(
                        components::COLLECTOR,
                        ComponentHealth::degraded(error.to_string()),
                    )
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn timer_fires_after_the_interval() {
        let (_tx, mut rx) = watch::channel(false);
        let mut timer = PeriodicTimer::new(Duration::from_millis(20));

        let start = Instant::now();
        let tick = timer.wait_until_next_tick(&mut rx).await;
        assert_eq!(tick, Tick::Fired);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn cancellation_wakes_a_long_wait_immediately() {
        let (tx, mut rx) = watch::channel(false);
        let mut timer = PeriodicTimer::new(Duration::from_secs(600));

        let waiter = tokio::spawn(async move { timer.wait_until_next_tick(&mut rx).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let tick = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should be interrupted promptly")
            .unwrap();
        assert_eq!(tick, Tick::Cancelled);
    }

    #[tokio::test]
    async fn overdue_deadline_fires_immediately_and_reanchors() {
        let (_tx, mut rx) = watch::channel(false);
        let mut timer = PeriodicTimer::new(Duration::from_millis(10));

        // Miss several deadlines
        tokio::time::sleep(Duration::from_millis(50)).await;

        let start = Instant::now();
        let tick = timer.wait_until_next_tick(&mut rx).await;
        assert_eq!(tick, Tick::Fired);
        assert!(start.elapsed() < Duration::from_millis(10));

        // The schedule re-anchored, so the following tick waits a full interval
        let start = Instant::now();
        timer.wait_until_next_tick(&mut rx).await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
