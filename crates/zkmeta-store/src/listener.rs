//! Metadata store listeners
//!
//! Listeners hear about entries added, updated or removed by any process,
//! once the change reaches this process's watch cache.

use parking_lot::RwLock;
use std::sync::Arc;

/// Observer of metadata changes. All callbacks default to no-ops.
///
/// Callbacks run while the store reconciles its overlay; they must not call
/// back into the store or block for long.
pub trait MetadataStoreListener: Send + Sync {
    /// A new key was added
    fn on_add(&self, _key: &str, _value: &str) {}

    /// A key was removed; `old_value` is its last value
    fn on_remove(&self, _key: &str, _old_value: &str) {}

    /// An existing key changed
    fn on_update(&self, _key: &str, _new_value: &str) {}
}

/// Copy-on-write set of registered listeners.
///
/// Dispatch iterates a snapshot, so listeners may be added or removed from
/// inside a callback.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Arc<Vec<Arc<dyn MetadataStoreListener>>>>,
}

fn same_listener(a: &Arc<dyn MetadataStoreListener>, b: &Arc<dyn MetadataStoreListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&self, listener: Arc<dyn MetadataStoreListener>) {
        let mut guard = self.listeners.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Unregister a listener by identity; returns whether it was registered
    pub fn remove(&self, listener: &Arc<dyn MetadataStoreListener>) -> bool {
        let mut guard = self.listeners.write();
        let Some(pos) = guard.iter().position(|l| same_listener(l, listener)) else {
            return false;
        };
        let mut next: Vec<_> = guard.iter().cloned().collect();
        next.remove(pos);
        *guard = Arc::new(next);
        true
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current listeners, unaffected by later registrations
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn MetadataStoreListener>>> {
        Arc::clone(&self.listeners.read())
    }

    pub fn dispatch_add(&self, key: &str, value: &str) {
        for listener in self.snapshot().iter() {
            listener.on_add(key, value);
        }
    }

    pub fn dispatch_update(&self, key: &str, value: &str) {
        for listener in self.snapshot().iter() {
            listener.on_update(key, value);
        }
    }

    pub fn dispatch_remove(&self, key: &str, old_value: &str) {
        for listener in self.snapshot().iter() {
            listener.on_remove(key, old_value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    impl MetadataStoreListener for Recording {
        fn on_add(&self, key: &str, value: &str) {
            self.calls.lock().push(format!("add {key}={value}"));
        }

        fn on_remove(&self, key: &str, old_value: &str) {
            self.calls.lock().push(format!("remove {key}={old_value}"));
        }
    }

    struct Silent;

    impl MetadataStoreListener for Silent {}

    #[test]
    fn test_add_remove_by_identity() {
        let set = ListenerSet::new();
        let a: Arc<dyn MetadataStoreListener> = Arc::new(Silent);
        let b: Arc<dyn MetadataStoreListener> = Arc::new(Silent);

        set.add(a.clone());
        set.add(b.clone());
        assert_eq!(set.len(), 2);

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert_eq!(set.len(), 1);
        assert!(same_listener(&set.snapshot()[0], &b));
    }

    #[test]
    fn test_dispatch_uses_defaults() {
        let set = ListenerSet::new();
        let recording = Arc::new(Recording::default());
        set.add(recording.clone());
        set.add(Arc::new(Silent));

        set.dispatch_add("k", "v");
        set.dispatch_update("k", "w");
        set.dispatch_remove("k", "w");

        assert_eq!(*recording.calls.lock(), vec!["add k=v", "remove k=w"]);
    }

    #[test]
    fn test_snapshot_is_stable() {
        let set = ListenerSet::new();
        set.add(Arc::new(Silent));
        let snapshot = set.snapshot();
        set.add(Arc::new(Silent));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(set.len(), 2);
    }

    struct SelfRemoving {
        set: Arc<ListenerSet>,
        me: Mutex<Option<Arc<dyn MetadataStoreListener>>>,
    }

    impl MetadataStoreListener for SelfRemoving {
        fn on_add(&self, _key: &str, _value: &str) {
            if let Some(me) = self.me.lock().take() {
                self.set.remove(&me);
            }
        }
    }

    #[test]
    fn test_remove_during_dispatch() {
        let set = Arc::new(ListenerSet::new());
        let listener = Arc::new(SelfRemoving {
            set: set.clone(),
            me: Mutex::new(None),
        });
        let as_dyn: Arc<dyn MetadataStoreListener> = listener.clone();
        *listener.me.lock() = Some(as_dyn.clone());
        set.add(as_dyn);

        set.dispatch_add("k", "v");
        assert!(set.is_empty());
    }
}
