use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of a read-modify-write step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Keep,
    Set(String),
    Remove,
}

/// Origin-scoped string key/value storage shared by every context.
///
/// Operations are synchronous. Writers are not coordinated beyond the
/// per-call lock: the last `set` for a key wins.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> bool;

    fn keys(&self) -> Vec<String>;

    /// Drops every key at once. Returns whether anything was removed.
    fn clear(&self) -> bool;

    /// Reads the current value and applies `f` without releasing the store
    /// in between. Returns the write that was applied.
    fn update(&self, key: &str, f: &mut dyn FnMut(Option<&str>) -> Write) -> Write;

    fn snapshot(&self) -> BTreeMap<String, String>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(self)
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    fn keys(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    fn clear(&self) -> bool {
        let removed = std::mem::take(&mut *self.entries());
        !removed.is_empty()
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(Option<&str>) -> Write) -> Write {
        let mut entries = self.entries();
        let write = f(entries.get(key).map(String::as_str));
        match &write {
            Write::Keep => {}
            Write::Set(value) => {
                entries.insert(key.to_string(), value.clone());
            }
            Write::Remove => {
                entries.remove(key);
            }
        }
        write
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries().clone()
    }
}
