//! Change notification between browsing contexts.
//!
//! A [`ChangeBus`] is shared by every context of one origin and owns the
//! store. Each [`Context`] keeps its own listener registry. Mutations go
//! through [`Context::commit`], which writes and then publishes exactly once:
//! listeners of the committing context run before `commit` returns, every
//! other context receives the event through the bus and dispatches it when
//! its pump runs.

use crate::keys::KeyFilter;
use crate::store::{KeyValueStore, SharedStore, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Origin of synthetic events that do not come from any context.
    pub const EXTERNAL: ContextId = ContextId(0);
}

/// "Key changed" signal. `key: None` means the whole store may have changed.
///
/// The payload is a hint; receivers re-read the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
    pub new_value: Option<String>,
    pub origin: ContextId,
}

impl StorageEvent {
    pub fn cleared(origin: ContextId) -> Self {
        Self {
            key: None,
            new_value: None,
            origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Storage(StorageEvent),
    Focus,
    Visible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Storage(KeyFilter),
    Focus,
    Visibility,
}

impl Trigger {
    fn accepts(&self, signal: &Signal) -> bool {
        match (self, signal) {
            (Trigger::Storage(filter), Signal::Storage(event)) => {
                filter.matches(event.key.as_deref())
            }
            (Trigger::Focus, Signal::Focus) => true,
            (Trigger::Visibility, Signal::Visible) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Callback = Arc<dyn Fn(&Signal) + Send + Sync>;

struct Listener {
    id: ListenerId,
    trigger: Trigger,
    callback: Callback,
}

pub struct ChangeBus {
    store: SharedStore,
    sender: broadcast::Sender<StorageEvent>,
    next_context: AtomicU64,
}

impl ChangeBus {
    pub fn new(store: SharedStore) -> Arc<Self> {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Arc::new(Self {
            store,
            sender,
            next_context: AtomicU64::new(1),
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Receiver seeing every event, including the committing context's own.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }

    pub fn open_context(self: &Arc<Self>) -> Context {
        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
        debug!(context = id.0, "context opened");
        Context {
            inner: Arc::new(ContextInner {
                id,
                bus: Arc::clone(self),
                listeners: Mutex::new(Vec::new()),
                receiver: Mutex::new(Some(self.sender.subscribe())),
                pump: Mutex::new(None),
                next_listener: AtomicU64::new(1),
                visible: AtomicBool::new(true),
            }),
        }
    }

    fn broadcast(&self, event: StorageEvent) {
        // No receivers is not an error: nobody else is open.
        let _ = self.sender.send(event);
    }
}

/// One browsing context (tab). Cloning yields another handle to the same
/// context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: ContextId,
    bus: Arc<ChangeBus>,
    listeners: Mutex<Vec<Listener>>,
    receiver: Mutex<Option<broadcast::Receiver<StorageEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    next_listener: AtomicU64,
    visible: AtomicBool,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ContextInner {
    fn dispatch(&self, signal: &Signal) -> usize {
        // Collect first so callbacks may commit or (de)register freely.
        let callbacks: Vec<Callback> = locked(&self.listeners)
            .iter()
            .filter(|listener| listener.trigger.accepts(signal))
            .map(|listener| Arc::clone(&listener.callback))
            .collect();
        for callback in &callbacks {
            callback(signal);
        }
        callbacks.len()
    }

    fn receive(&self, event: StorageEvent) {
        if event.origin == self.id {
            return;
        }
        self.dispatch(&Signal::Storage(event));
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Some(handle) = locked(&self.pump).take() {
            handle.abort();
        }
    }
}

impl Context {
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn store(&self) -> &SharedStore {
        self.inner.bus.store()
    }

    pub fn add_listener(&self, trigger: Trigger, callback: Callback) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        locked(&self.inner.listeners).push(Listener {
            id,
            trigger,
            callback,
        });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = locked(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        locked(&self.inner.listeners).len()
    }

    /// The single mutation entry point: read-modify-write `key`, then
    /// publish once if anything was written.
    pub fn commit(&self, key: &str, mut f: impl FnMut(Option<&str>) -> Write) -> Write {
        let write = self.store().update(key, &mut f);
        let new_value = match &write {
            Write::Keep => return write,
            Write::Set(value) => Some(value.clone()),
            Write::Remove => None,
        };
        self.publish(StorageEvent {
            key: Some(key.to_string()),
            new_value,
            origin: self.inner.id,
        });
        write
    }

    pub fn set(&self, key: &str, value: String) {
        self.commit(key, |_| Write::Set(value.clone()));
    }

    /// Removing a missing key publishes nothing.
    pub fn remove(&self, key: &str) -> bool {
        let write = self.commit(key, |current| match current {
            Some(_) => Write::Remove,
            None => Write::Keep,
        });
        write == Write::Remove
    }

    /// Removes every key and publishes a single store-wide event. Clearing an
    /// empty store publishes nothing.
    pub fn clear(&self) -> bool {
        if !self.store().clear() {
            return false;
        }
        self.publish(StorageEvent::cleared(self.inner.id));
        true
    }

    fn publish(&self, event: StorageEvent) {
        debug!(context = self.inner.id.0, key = ?event.key, "publishing change");
        self.inner.dispatch(&Signal::Storage(event.clone()));
        self.inner.bus.broadcast(event);
    }

    pub fn focus(&self) {
        self.inner.dispatch(&Signal::Focus);
    }

    /// Becoming visible after being hidden fires the visibility trigger.
    pub fn set_visible(&self, visible: bool) {
        let was_visible = self.inner.visible.swap(visible, Ordering::SeqCst);
        if visible && !was_visible {
            self.inner.dispatch(&Signal::Visible);
        }
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::SeqCst)
    }

    /// Dispatches every event other contexts published since the last drain.
    /// Returns the number of events received; a no-op once a pump runs.
    pub fn drain_remote(&self) -> usize {
        let mut received = Vec::new();
        {
            let mut guard = locked(&self.inner.receiver);
            let Some(receiver) = guard.as_mut() else {
                return 0;
            };
            loop {
                match receiver.try_recv() {
                    Ok(event) => received.push(event),
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!(context = self.inner.id.0, skipped, "change bus lagged");
                        received.push(StorageEvent::cleared(ContextId::EXTERNAL));
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }
        let count = received.len();
        for event in received {
            self.inner.receive(event);
        }
        count
    }

    /// Delivers remote events as they arrive on a tokio task. Returns `false`
    /// if a pump is already running.
    pub fn spawn_pump(&self) -> bool {
        let Some(mut receiver) = locked(&self.inner.receiver).take() else {
            return false;
        };
        let weak: Weak<ContextInner> = Arc::downgrade(&self.inner);
        let id = self.inner.id;
        let handle = tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(context = id.0, skipped, "change bus lagged");
                        StorageEvent::cleared(ContextId::EXTERNAL)
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.receive(event);
            }
            debug!(context = id.0, "pump stopped");
        });
        *locked(&self.inner.pump) = Some(handle);
        true
    }
}
