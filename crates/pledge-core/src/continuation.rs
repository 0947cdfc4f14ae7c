//! In-memory continuation handles
//!
//! A handle is the live half of a promise: it carries observers that cannot be
//! persisted. Handles are cheap to clone; clones share one observer list.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::record::Outcome;
use crate::types::{Payload, PromiseId, Rejection};

type FulfilledCallback = Box<dyn FnOnce(&Payload) + Send + 'static>;
type RejectedCallback = Box<dyn FnOnce(&Rejection) + Send + 'static>;
type SettledCallback = Box<dyn FnOnce(&Outcome) + Send + 'static>;

enum Observer {
    Fulfilled(FulfilledCallback),
    Rejected(RejectedCallback),
    Settled(SettledCallback),
}

struct HandleState {
    outcome: Option<Outcome>,
    observers: Vec<Observer>,
    /// Set while the resolving thread drains `observers`; late attachments queue
    /// behind the ones already running
    delivering: bool,
}

struct HandleInner {
    id: PromiseId,
    state: Mutex<HandleState>,
}

/// Live continuation bound to one promise id
#[derive(Clone)]
pub struct ContinuationHandle {
    inner: Arc<HandleInner>,
}

impl ContinuationHandle {
    pub(crate) fn pending(id: PromiseId) -> Self {
        Self::with_outcome(id, None)
    }

    pub(crate) fn settled(id: PromiseId, outcome: Outcome) -> Self {
        Self::with_outcome(id, Some(outcome))
    }

    fn with_outcome(id: PromiseId, outcome: Option<Outcome>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                state: Mutex::new(HandleState {
                    outcome,
                    observers: Vec::new(),
                    delivering: false,
                }),
            }),
        }
    }

    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// Terminal outcome if already delivered
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.state.lock().outcome.clone()
    }

    /// True when both values refer to the same underlying continuation
    pub fn same_as(&self, other: &ContinuationHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `callback` once if the promise is fulfilled.
    /// Fires immediately when the handle is already fulfilled.
    pub fn on_fulfilled<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&Payload) + Send + 'static,
    {
        self.attach(Observer::Fulfilled(Box::new(callback)));
        self
    }

    /// Run `callback` once if the promise is rejected.
    pub fn on_rejected<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&Rejection) + Send + 'static,
    {
        self.attach(Observer::Rejected(Box::new(callback)));
        self
    }

    /// Run `callback` once with whichever outcome arrives.
    pub fn on_settled<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        self.attach(Observer::Settled(Box::new(callback)));
        self
    }

    /// Await the terminal outcome.
    pub async fn wait(&self) -> Outcome {
        let (tx, rx) = oneshot::channel();
        self.on_settled(move |outcome| {
            let _ = tx.send(outcome.clone());
        });

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::rejected(Rejection::abandoned(format!(
                "continuation {} dropped before delivery",
                self.inner.id
            ))),
        }
    }

    /// Deliver the terminal outcome. Returns false if one was already delivered.
    ///
    /// Observers run in attachment order. One attached while delivery is under
    /// way (from inside an observer or from another thread) is queued and run
    /// by this call after the ones before it.
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        let mut batch = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            state.delivering = true;
            std::mem::take(&mut state.observers)
        };

        loop {
            for observer in batch {
                self.fire(observer, &outcome);
            }

            let mut state = self.inner.state.lock();
            if state.observers.is_empty() {
                state.delivering = false;
                return true;
            }
            batch = std::mem::take(&mut state.observers);
        }
    }

    fn attach(&self, observer: Observer) {
        let outcome = {
            let mut state = self.inner.state.lock();
            match state.outcome.clone() {
                Some(outcome) if !state.delivering => outcome,
                _ => {
                    state.observers.push(observer);
                    return;
                }
            }
        };

        self.fire(observer, &outcome);
    }

    fn fire(&self, observer: Observer, outcome: &Outcome) {
        let result = catch_unwind(AssertUnwindSafe(|| match (observer, outcome) {
            (Observer::Fulfilled(cb), Outcome::Fulfilled(payload)) => cb(payload),
            (Observer::Rejected(cb), Outcome::Rejected { error, .. }) => cb(error),
            (Observer::Settled(cb), outcome) => cb(outcome),
            _ => {}
        }));

        if result.is_err() {
            tracing::warn!(promise = %self.inner.id, "continuation observer panicked; continuing delivery");
        }
    }
}

impl std::fmt::Debug for ContinuationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ContinuationHandle")
            .field("id", &self.inner.id)
            .field("outcome", &state.outcome)
            .field("observers", &state.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_observers_fire_in_attachment_order() {
        let handle = ContinuationHandle::pending(PromiseId::generate());
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            handle.on_fulfilled(move |_| log.lock().push(i));
        }
        let rejected = log.clone();
        handle.on_rejected(move |_| rejected.lock().push(99));

        assert!(handle.resolve(Outcome::Fulfilled(Payload::Unit)));
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_observer_attached_during_delivery_runs_last() {
        let handle = ContinuationHandle::pending(PromiseId::generate());
        let order = Arc::new(Mutex::new(Vec::new()));

        let (inner, log) = (handle.clone(), order.clone());
        handle.on_fulfilled(move |_| {
            log.lock().push("a");
            let log = log.clone();
            inner.on_fulfilled(move |_| log.lock().push("c"));
        });
        let log = order.clone();
        handle.on_fulfilled(move |_| log.lock().push("b"));

        assert!(handle.resolve(Outcome::Fulfilled(Payload::Unit)));
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cross_thread_attach_during_delivery_is_queued() {
        use std::sync::mpsc;

        let handle = ContinuationHandle::pending(PromiseId::generate());
        let order = Arc::new(Mutex::new(Vec::new()));
        let (started_tx, started_rx) = mpsc::channel();
        let (attached_tx, attached_rx) = mpsc::channel::<()>();

        let log = order.clone();
        handle.on_fulfilled(move |_| {
            log.lock().push("a");
            started_tx.send(()).unwrap();
            attached_rx.recv().unwrap();
        });
        let log = order.clone();
        handle.on_fulfilled(move |_| log.lock().push("b"));

        let resolver = handle.clone();
        let delivery =
            std::thread::spawn(move || resolver.resolve(Outcome::Fulfilled(Payload::Unit)));

        started_rx.recv().unwrap();
        let log = order.clone();
        handle.on_fulfilled(move |_| log.lock().push("c"));
        // still queued: the resolving thread has not run it yet
        assert_eq!(*order.lock(), vec!["a"]);
        attached_tx.send(()).unwrap();

        assert!(delivery.join().unwrap());
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_late_observer_fires_immediately() {
        let handle = ContinuationHandle::settled(
            PromiseId::generate(),
            Outcome::rejected(Rejection::timeout("stale")),
        );
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        handle.on_rejected(move |error| {
            assert_eq!(error.message, "stale");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolve_is_one_shot() {
        let handle = ContinuationHandle::pending(PromiseId::generate());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        handle.on_settled(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.resolve(Outcome::Fulfilled(Payload::Int(1))));
        assert!(!handle.resolve(Outcome::Fulfilled(Payload::Int(2))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(handle.outcome(), Some(Outcome::Fulfilled(Payload::Int(1))));
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let handle = ContinuationHandle::pending(PromiseId::generate());
        let hits = Arc::new(AtomicUsize::new(0));

        handle.on_fulfilled(|_| panic!("observer bug"));
        let counter = hits.clone();
        handle.on_fulfilled(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.resolve(Outcome::Fulfilled(Payload::Unit));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_observers() {
        let handle = ContinuationHandle::pending(PromiseId::generate());
        let clone = handle.clone();
        assert!(handle.same_as(&clone));

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        clone.on_fulfilled(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.resolve(Outcome::Fulfilled(Payload::Unit));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(clone.is_resolved());
    }

    #[tokio::test]
    async fn test_wait_returns_outcome() {
        let handle = ContinuationHandle::pending(PromiseId::generate());
        let resolver = handle.clone();
        tokio::spawn(async move {
            resolver.resolve(Outcome::Fulfilled("pong".into()));
        });

        let outcome = handle.wait().await;
        assert_eq!(outcome.payload().and_then(Payload::as_text), Some("pong"));
    }
}
