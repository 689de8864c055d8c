//! Ordered observer set.

use std::sync::Arc;

use crate::ports::{MemoryObserver, QuantumMemory};

/// Observers notified on expiration, in insertion order.
///
/// Identity is the `Arc` allocation, so attaching the same handle twice is a
/// no-op.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn MemoryObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, observer: Arc<dyn MemoryObserver>) {
        if !self.contains(&observer) {
            self.observers.push(observer);
        }
    }

    /// Idempotent.
    pub fn detach(&mut self, observer: &Arc<dyn MemoryObserver>) {
        self.observers.retain(|o| !Arc::ptr_eq(o, observer));
    }

    pub fn contains(&self, observer: &Arc<dyn MemoryObserver>) -> bool {
        self.observers.iter().any(|o| Arc::ptr_eq(o, observer))
    }

    pub fn notify(&self, memory: &dyn QuantumMemory) {
        for observer in &self.observers {
            observer.memory_expire(memory);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntanglementPeer;
    use parking_lot::Mutex;
    use shared_types::{Picoseconds, QstateKey};

    struct Named(&'static str);

    impl QuantumMemory for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn fidelity(&self) -> f64 {
            0.0
        }
        fn raw_fidelity(&self) -> f64 {
            0.0
        }
        fn entangled_memory(&self) -> Option<&EntanglementPeer> {
            None
        }
        fn qstate_key(&self) -> Option<QstateKey> {
            None
        }
        fn expire_time(&self) -> Option<Picoseconds> {
            None
        }
    }

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MemoryObserver for Recorder {
        fn memory_expire(&self, memory: &dyn QuantumMemory) {
            self.log.lock().push(format!("{}:{}", self.tag, memory.name()));
        }
    }

    #[test]
    fn test_notify_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = ObserverSet::new();
        for tag in ["first", "second", "third"] {
            set.attach(Arc::new(Recorder {
                tag,
                log: log.clone(),
            }));
        }

        set.notify(&Named("m0"));
        assert_eq!(*log.lock(), vec!["first:m0", "second:m0", "third:m0"]);
    }

    #[test]
    fn test_attach_and_detach_are_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let observer: Arc<dyn MemoryObserver> = Arc::new(Recorder { tag: "a", log });
        let mut set = ObserverSet::new();

        set.attach(observer.clone());
        set.attach(observer.clone());
        assert_eq!(set.len(), 1);

        set.detach(&observer);
        set.detach(&observer);
        assert!(set.is_empty());
    }
}
