//! Background badge worker.
//!
//! Periodically reads the outbox length and publishes it for the UI badge.
//! The timer deliberately never triggers a drain — sync cycles are driven by
//! app foreground, pull-to-refresh, and explicit calls only.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::store::MobileStore;

pub struct BadgeWorker {
    store: Arc<MobileStore>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl BadgeWorker {
    pub fn new(store: Arc<MobileStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for requesting graceful shutdown; grab it before `start`.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Spawn the polling loop. Returns the task handle and a receiver that
    /// always holds the latest observed pending-mutation count.
    pub fn start(self) -> (JoinHandle<()>, watch::Receiver<u64>) {
        let (tx, rx) = watch::channel(0u64);

        let handle = tokio::spawn(async move {
            info!("badge worker started");

            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = self.shutdown.notified() => {
                        info!("badge worker received shutdown signal");
                        break;
                    }
                    _ = tick.tick() => {
                        match self.store.pending_count().await {
                            Ok(count) => {
                                debug!(count, "outbox length polled");
                                let _ = tx.send(count);
                            }
                            Err(err) => {
                                warn!(error = %err, "failed to read outbox length");
                            }
                        }
                    }
                }
            }

            info!("badge worker stopped");
        });

        (handle, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutboxMethod;
    use serde_json::json;

    #[tokio::test]
    async fn publishes_count_and_shuts_down() {
        let store = Arc::new(MobileStore::open_in_memory().await.unwrap());
        store
            .enqueue_mutation("/a", OutboxMethod::Post, &json!({}))
            .await
            .unwrap();
        store
            .enqueue_mutation("/b", OutboxMethod::Post, &json!({}))
            .await
            .unwrap();

        let worker = BadgeWorker::new(store.clone(), Duration::from_millis(5));
        let shutdown = worker.shutdown_handle();
        let (handle, mut rx) = worker.start();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 2);

        shutdown.notify_one();
        handle.await.unwrap();
    }
}
