//! View subscribers.
//!
//! A mounted subscriber owns a derived snapshot that is recomputed from the
//! store whenever a matching change, a focus signal or a visibility signal
//! arrives. Snapshots are never written back.

use crate::collections::Records;
use crate::keys::KeyFilter;
use crate::notifier::{Context, ListenerId, Signal, Trigger};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::debug;

/// A derived view over the record collections.
pub trait View: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Keys whose change makes the snapshot stale.
    fn filter(&self) -> KeyFilter;

    fn load(&self, records: &Records) -> Self::Output;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Uninitialized,
    Loading,
    Ready,
    Refreshing,
}

struct Shared<V: View> {
    view: V,
    records: Records,
    state: Mutex<SubscriberState>,
    /// Latest load and the ticket it was started with.
    snapshot: Mutex<Option<(u64, V::Output)>>,
    tickets: AtomicU64,
    mounted: AtomicBool,
    version: watch::Sender<u64>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V: View> Shared<V> {
    /// Loads run concurrently when triggers arrive from different threads.
    /// A load that finishes after a later-started one is discarded.
    fn refresh(&self) {
        let ticket = {
            let mut state = locked(&self.state);
            *state = match *state {
                SubscriberState::Uninitialized | SubscriberState::Loading => {
                    SubscriberState::Loading
                }
                SubscriberState::Ready | SubscriberState::Refreshing => {
                    SubscriberState::Refreshing
                }
            };
            self.tickets.fetch_add(1, Ordering::SeqCst) + 1
        };

        let output = self.view.load(&self.records);
        {
            let mut snapshot = locked(&self.snapshot);
            if snapshot.as_ref().is_some_and(|(newest, _)| *newest > ticket) {
                debug!(view = self.view.name(), ticket, "stale load dropped");
                return;
            }
            *snapshot = Some((ticket, output));
        }
        {
            let mut state = locked(&self.state);
            if self.tickets.load(Ordering::SeqCst) == ticket {
                *state = SubscriberState::Ready;
            }
        }
        self.version.send_modify(|version| *version += 1);
        debug!(view = self.view.name(), "view refreshed");
    }
}

/// An unmounted subscriber.
pub struct Subscriber<V: View> {
    shared: Arc<Shared<V>>,
}

impl<V: View> Subscriber<V> {
    pub fn new(context: &Context, view: V) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                view,
                records: Records::new(context.clone()),
                state: Mutex::new(SubscriberState::Uninitialized),
                snapshot: Mutex::new(None),
                tickets: AtomicU64::new(0),
                mounted: AtomicBool::new(false),
                version,
            }),
        }
    }

    pub fn state(&self) -> SubscriberState {
        *locked(&self.shared.state)
    }

    /// Reads the initial snapshot, then registers the storage, focus and
    /// visibility triggers.
    pub fn mount(self) -> Mounted<V> {
        let shared = self.shared;
        shared.mounted.store(true, Ordering::SeqCst);
        shared.refresh();

        let context = shared.records.context().clone();
        let triggers = [
            Trigger::Storage(shared.view.filter()),
            Trigger::Focus,
            Trigger::Visibility,
        ];
        let listeners = triggers.map(|trigger| {
            let weak: Weak<Shared<V>> = Arc::downgrade(&shared);
            context.add_listener(
                trigger,
                Arc::new(move |_: &Signal| {
                    if let Some(shared) = weak.upgrade() {
                        if shared.mounted.load(Ordering::SeqCst) {
                            shared.refresh();
                        }
                    }
                }),
            )
        });
        debug!(view = shared.view.name(), "view mounted");

        Mounted {
            shared,
            context,
            listeners,
        }
    }
}

/// A mounted subscriber. Dropping it unmounts: all three registrations are
/// removed and late callbacks are ignored.
pub struct Mounted<V: View> {
    shared: Arc<Shared<V>>,
    context: Context,
    listeners: [ListenerId; 3],
}

impl<V: View> Mounted<V> {
    pub fn state(&self) -> SubscriberState {
        *locked(&self.shared.state)
    }

    /// The latest snapshot. Always present once mounted.
    pub fn current(&self) -> V::Output {
        match locked(&self.shared.snapshot).as_ref() {
            Some((_, output)) => output.clone(),
            None => self.shared.view.load(&self.shared.records),
        }
    }

    /// Number of completed loads, starting at 1 after mount.
    pub fn version(&self) -> u64 {
        *self.shared.version.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.shared.version.subscribe()
    }
}

impl<V: View> Drop for Mounted<V> {
    fn drop(&mut self) {
        self.shared.mounted.store(false, Ordering::SeqCst);
        for id in self.listeners {
            self.context.remove_listener(id);
        }
        debug!(view = self.shared.view.name(), "view unmounted");
    }
}
