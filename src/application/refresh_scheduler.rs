//! Periodic refresh driver
//!
//! Each subscription is its own task with its own interval, so one slow or
//! failing refresh never delays another. Dropping the scheduler aborts every
//! subscription.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// One refreshable resource
#[async_trait]
pub trait RefreshTask: Send + Sync {
    /// Subscription name; subscribing a task with a taken name replaces it
    fn name(&self) -> &str;

    /// Must absorb its own failures
    async fn run(&self);
}

struct Subscription {
    handle: JoinHandle<()>,
    trigger: Arc<Notify>,
}

pub struct RefreshScheduler {
    interval: Duration,
    subscriptions: HashMap<String, Subscription>,
}

impl RefreshScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            subscriptions: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin periodic invocation of every task. Each runs once immediately.
    pub fn start(&mut self, tasks: Vec<Arc<dyn RefreshTask>>) {
        info!("▶️  Starting refresh scheduler ({} tasks, every {:?})", tasks.len(), self.interval);
        for task in tasks {
            self.subscribe(task);
        }
    }

    /// Add a subscription, cancelling any previous one with the same name
    pub fn subscribe(&mut self, task: Arc<dyn RefreshTask>) {
        let name = task.name().to_string();
        self.unsubscribe(&name);

        let trigger = Arc::new(Notify::new());
        let handle = tokio::spawn(run_subscription(task, self.interval, Arc::clone(&trigger)));
        debug!("Subscribed '{}'", name);
        self.subscriptions.insert(name, Subscription { handle, trigger });
    }

    pub fn unsubscribe(&mut self, name: &str) -> bool {
        match self.subscriptions.remove(name) {
            Some(subscription) => {
                subscription.handle.abort();
                debug!("Cancelled '{}'", name);
                true
            }
            None => false,
        }
    }

    /// Run every subscription once now; the periodic cadence is unchanged
    pub fn trigger_now(&self) {
        for subscription in self.subscriptions.values() {
            subscription.trigger.notify_one();
        }
    }

    pub fn trigger(&self, name: &str) -> bool {
        match self.subscriptions.get(name) {
            Some(subscription) => {
                subscription.trigger.notify_one();
                true
            }
            None => false,
        }
    }

    /// Cancel all pending ticks
    pub fn stop(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        for (name, subscription) in self.subscriptions.drain() {
            subscription.handle.abort();
            debug!("Cancelled '{}'", name);
        }
        info!("⏹️  Refresh scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.subscriptions.contains_key(name)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_subscription(task: Arc<dyn RefreshTask>, period: Duration, trigger: Arc<Notify>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => debug!("⏰ Scheduled refresh: {}", task.name()),
            _ = trigger.notified() => debug!("🔄 Manual refresh: {}", task.name()),
        }
        task.run().await;
    }
}
