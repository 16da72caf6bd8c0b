//! Subscriber registry and snapshot fan-out.
//!
//! Each broadcast iterates over a snapshot of the registry taken when the
//! broadcast starts. Observers registered mid-broadcast do not see the
//! in-flight frame. Observers removed mid-broadcast are skipped if their turn
//! has not come yet.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::SystemState;

/// Callback invoked with every delivered state.
pub type StateCallback = Arc<dyn Fn(&SystemState) + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Clone)]
enum Sink {
    Callback(StateCallback),
    Channel(mpsc::UnboundedSender<SystemState>),
}

#[derive(Clone)]
struct Entry {
    handle: SubscriptionHandle,
    active: Arc<AtomicBool>,
    sink: Sink,
}

/// Shared set of observers. Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    entries: Arc<Mutex<Vec<Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback observer.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionHandle
    where
        F: Fn(&SystemState) + Send + Sync + 'static,
    {
        self.insert(Sink::Callback(Arc::new(observer)))
    }

    /// Register an observer that receives states on an unbounded channel.
    ///
    /// Dropping the receiver unsubscribes on the next broadcast. The channel
    /// never applies backpressure: a receiver that is kept but not drained
    /// buffers every frame. Use [`subscribe`](Self::subscribe) to keep only
    /// what the observer needs.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<SystemState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.insert(Sink::Channel(tx)), rx)
    }

    /// Remove an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|entry| entry.handle == handle) {
            Some(index) => {
                let entry = entries.swap_remove(index);
                entry.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Remove every observer.
    pub fn clear(&self) {
        let drained: Vec<Entry> = self.lock().drain(..).collect();
        for entry in drained {
            entry.active.store(false, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `state` to the current observers. Returns how many received it.
    ///
    /// A panicking callback is logged and counted as undelivered; the
    /// remaining observers still get the frame.
    pub fn broadcast(&self, state: &SystemState) -> usize {
        let snapshot: Vec<Entry> = self.lock().clone();
        let mut delivered = 0usize;
        let mut closed = Vec::new();

        for entry in snapshot {
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            match &entry.sink {
                Sink::Callback(callback) => {
                    if catch_unwind(AssertUnwindSafe(|| callback(state))).is_ok() {
                        delivered += 1;
                    } else {
                        warn!(
                            "subscription {} panicked on {} frame",
                            entry.handle.id(),
                            state.status
                        );
                    }
                }
                Sink::Channel(tx) => {
                    if tx.send(state.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        closed.push(entry.handle);
                    }
                }
            }
        }

        for handle in closed {
            debug!("dropping subscription {} with closed receiver", handle.id());
            self.unsubscribe(handle);
        }
        delivered
    }

    fn insert(&self, sink: Sink) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Entry {
            handle,
            active: Arc::new(AtomicBool::new(true)),
            sink,
        });
        handle
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
