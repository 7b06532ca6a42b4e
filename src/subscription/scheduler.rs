//! # Subscription Scheduler
//!
//! One timer polls the native watch for dirty nodes and types. Each tick
//! bumps the update id once, so any number of marks inside one tick fire a
//! listener at most once. The now bucket is fired every
//! `SchedulerConfig::now_every_ticks()` ticks.
//!
//! The timer starts on the first subscription and stops itself once the
//! registry is empty.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;

use super::errors::SubscriptionResult;
use super::record::SubscriptionRecord;
use super::registry::{FireSender, SubscriptionRegistry};
use crate::config::SchedulerConfig;
use crate::observability::{log_event, log_event_with_fields, Event, MetricsRegistry};

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub update_id: u64,
    /// Listeners notified
    pub fired: usize,
    pub now_fired: bool,
}

pub struct SubscriptionScheduler {
    registry: Arc<SubscriptionRegistry>,
    config: SchedulerConfig,
    metrics: Arc<MetricsRegistry>,
    update_id: AtomicU64,
    ticks: AtomicU64,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionScheduler {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        config: SchedulerConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            metrics,
            update_id: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn update_id(&self) -> u64 {
        self.update_id.load(Ordering::SeqCst)
    }

    /// Registers a subscription and starts the timer if it is idle
    pub async fn subscribe(
        self: &Arc<Self>,
        record: SubscriptionRecord,
        sender: FireSender,
    ) -> SubscriptionResult<()> {
        self.registry.add(record, sender).await?;
        self.ensure_started();
        Ok(())
    }

    pub async fn unsubscribe(&self, sub_id: u32) -> SubscriptionResult<()> {
        self.registry.remove(sub_id).await
    }

    /// Runs one poll-and-fire round
    pub async fn tick(&self, now_ms: i64) -> SubscriptionResult<TickReport> {
        let update_id = self.update_id.fetch_add(1, Ordering::SeqCst) + 1;
        let tick_no = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.increment_scheduler_ticks();

        let dirty = self.registry.watch().poll_dirty().await?;
        let mut fired = if dirty.is_empty() {
            0
        } else {
            self.registry.fire_dirty(&dirty, update_id).await
        };

        let now_fired = tick_no % self.config.now_every_ticks() == 0;
        if now_fired {
            fired += self.registry.fire_now(now_ms, update_id).await?;
        }

        Ok(TickReport {
            update_id,
            fired,
            now_fired,
        })
    }

    fn ensure_started(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.run().await });
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        let interval = self.config.interval_ms.to_string();
        log_event_with_fields(Event::SchedulerStarted, &[("interval_ms", interval.as_str())]);
    }

    async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            if self.registry.is_empty().await {
                self.running.store(false, Ordering::SeqCst);
                // A subscriber may have arrived after the emptiness check
                let resumed = !self.registry.is_empty().await
                    && self
                        .running
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok();
                if !resumed {
                    log_event(Event::SchedulerStopped);
                    return;
                }
            }

            if let Err(e) = self.tick(Utc::now().timestamp_millis()).await {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::SchedulerTickFailed,
                    &[("code", e.code()), ("reason", reason.as_str())],
                );
            }
        }
    }

    /// Stops the timer regardless of remaining subscriptions
    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        if self.running.swap(false, Ordering::SeqCst) {
            log_event(Event::SchedulerStopped);
        }
    }
}

impl Drop for SubscriptionScheduler {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}
