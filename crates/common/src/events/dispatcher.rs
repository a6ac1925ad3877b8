use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;

use super::{Event, EventKind, Observer};

/// Events queued per observer before the oldest start being dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Subscription {
    /// `None` subscribes to every kind.
    kinds: Option<HashSet<EventKind>>,
    observer: Weak<dyn Observer>,
    tx: flume::Sender<Event>,
    // second handle on the queue, used to evict the oldest entry
    rx: flume::Receiver<Event>,
}

impl Subscription {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }

    fn add_kinds(&mut self, kinds: &[EventKind]) {
        if kinds.is_empty() {
            self.kinds = None;
        } else if let Some(existing) = &mut self.kinds {
            existing.extend(kinds.iter().copied());
        }
    }
}

/// Fans events out to observers.
///
/// Each observer gets a bounded queue drained by its own worker task, so
/// deliveries to one observer are FIFO and never concurrent. Observers are
/// held weakly: once the caller drops its `Arc`, the worker exits and the
/// subscription is forgotten.
#[derive(Debug)]
pub struct Dispatcher {
    capacity: usize,
    subscriptions: Mutex<HashMap<usize, Subscription>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn key(observer: &Arc<dyn Observer>) -> usize {
    Arc::as_ptr(observer) as *const () as usize
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe `observer` to `kinds`, or to everything when `kinds` is
    /// empty. Registering again widens the existing subscription.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, observer: &Arc<dyn Observer>, kinds: &[EventKind]) {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|_, sub| sub.observer.strong_count() > 0);

        if let Some(existing) = subscriptions.get_mut(&key(observer)) {
            existing.add_kinds(kinds);
            return;
        }

        let (tx, rx) = flume::bounded(self.capacity);
        let weak = Arc::downgrade(observer);
        tokio::spawn(deliver(weak.clone(), rx.clone()));

        let kinds = if kinds.is_empty() {
            None
        } else {
            Some(kinds.iter().copied().collect())
        };
        subscriptions.insert(
            key(observer),
            Subscription {
                kinds,
                observer: weak,
                tx,
                rx,
            },
        );
    }

    /// Drop the subscription of `observer`. Unknown observers are ignored.
    pub fn unregister(&self, observer: &Arc<dyn Observer>) {
        self.subscriptions.lock().remove(&key(observer));
    }

    /// Queue `event` for every interested observer. Never blocks.
    pub fn dispatch(&self, event: Event) {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|_, sub| {
            if sub.observer.strong_count() == 0 {
                return false;
            }
            if !sub.wants(event.kind) {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(flume::TrySendError::Full(event)) => {
                    if let Ok(dropped) = sub.rx.try_recv() {
                        tracing::warn!(
                            kind = %dropped.kind,
                            path = %dropped.path,
                            "observer queue full, dropping oldest event"
                        );
                    }
                    // the worker may have drained in between, either way
                    // at most one event is lost
                    let _ = sub.tx.try_send(event);
                    true
                }
                Err(flume::TrySendError::Disconnected(_)) => false,
            }
        });
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions
            .lock()
            .values()
            .filter(|sub| sub.observer.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn deliver(observer: Weak<dyn Observer>, rx: flume::Receiver<Event>) {
    while let Ok(event) = rx.recv_async().await {
        let Some(observer) = observer.upgrade() else {
            break;
        };
        match AssertUnwindSafe(observer.on_event(&event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(kind = %event.kind, path = %event.path, error = %e, "observer failed")
            }
            Err(_) => {
                tracing::error!(kind = %event.kind, path = %event.path, "observer panicked")
            }
        }
    }
}
