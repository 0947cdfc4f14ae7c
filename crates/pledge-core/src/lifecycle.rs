//! Process lifecycle signals
//!
//! The host (app delegate, service supervisor, test harness) owns a
//! [`LifecycleSignals`] bus and emits events on it. A [`PromiseManager`] subscribes
//! through [`PromiseManager::listen`]; the returned [`LifecycleSubscription`]
//! ends the subscription when shut down or dropped. The listener only holds a
//! weak reference, so it stops once the manager is gone.

use serde::{Deserialize, Serialize};
use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::error::{PledgeError, Result};
use crate::manager::PromiseManager;

/// Event published by the host process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Cold process start
    Startup,
    /// Process became active again after a suspension
    Resumed,
    /// Host-driven periodic maintenance
    Housekeeping,
}

/// Broadcast bus for lifecycle events
#[derive(Debug, Clone)]
pub struct LifecycleSignals {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleSignals {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish `event`; returns how many subscribers received it
    pub fn emit(&self, event: LifecycleEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LifecycleSignals {
    fn default() -> Self {
        Self::new(16)
    }
}

/// Live subscription of a manager to a lifecycle bus
#[derive(Debug)]
pub struct LifecycleSubscription {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LifecycleSubscription {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop listening and wait for the listener to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl PromiseManager {
    /// Subscribe this manager to `signals`.
    ///
    /// `Startup` and `Housekeeping` run the stale sweep, `Resumed` runs
    /// reconciliation. When the configuration sets a sweep interval the listener
    /// also sweeps on that period. Must be called inside a tokio runtime.
    ///
    /// A manager has at most one listener; while one is running this returns
    /// [`PledgeError::AlreadyListening`]. The slot frees once the listener task
    /// exits, so await [`LifecycleSubscription::shutdown`] before listening again.
    pub fn listen(self: &Arc<Self>, signals: &LifecycleSignals) -> Result<LifecycleSubscription> {
        if self
            .listening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PledgeError::AlreadyListening);
        }
        let slot = ListeningSlot(self.listening.clone());

        let weak = Arc::downgrade(self);
        let mut events = signals.subscribe();
        let mut ticker = self
            .config()
            .sweep_interval()
            .filter(|period| !period.is_zero())
            .map(|period| {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let _slot = slot;
            loop {
                let event = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    received = events.recv() => match received {
                        Ok(event) => event,
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "lifecycle listener lagged; reconciling");
                            LifecycleEvent::Resumed
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = next_tick(&mut ticker) => LifecycleEvent::Housekeeping,
                };

                let Some(manager) = weak.upgrade() else {
                    break;
                };
                match tokio::task::spawn_blocking(move || manager.handle_event(event)).await {
                    Ok(Ok(report)) => tracing::debug!(?event, ?report, "lifecycle event handled"),
                    Ok(Err(e)) => tracing::error!(?event, error = %e, "lifecycle event failed"),
                    Err(e) => tracing::error!(?event, error = %e, "lifecycle handler aborted"),
                }
            }
            tracing::debug!("lifecycle listener stopped");
        });

        Ok(LifecycleSubscription {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Releases the manager's listener slot when the listener task ends
struct ListeningSlot(Arc<AtomicBool>);

impl Drop for ListeningSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_emit_without_subscribers() {
        let signals = LifecycleSignals::default();
        assert_eq!(signals.emit(LifecycleEvent::Startup), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let signals = LifecycleSignals::new(4);
        let mut rx = signals.subscribe();
        assert_eq!(signals.subscriber_count(), 1);

        assert_eq!(signals.emit(LifecycleEvent::Resumed), 1);
        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Resumed);
    }

    #[tokio::test]
    async fn test_second_listener_is_refused() {
        let manager = Arc::new(PromiseManager::new(Arc::new(MemoryStore::new())));
        let signals = LifecycleSignals::default();

        let first = manager.listen(&signals).unwrap();
        assert!(matches!(
            manager.listen(&signals),
            Err(PledgeError::AlreadyListening)
        ));
        assert_eq!(signals.subscriber_count(), 1);

        first.shutdown().await;
        let second = manager.listen(&signals).unwrap();
        assert!(second.is_active());
        second.shutdown().await;
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&LifecycleEvent::Housekeeping).unwrap();
        assert_eq!(json, "\"housekeeping\"");
    }
}
