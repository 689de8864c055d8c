//! Fixed-size aggregate of single-atom memories.

use std::ops::{Index, IndexMut};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::QuantumRegister;
use tracing::{debug, trace};

use crate::domain::{Memory, MemoryConfig, MemoryParam};
use crate::error::MemoryError;
use crate::ports::{EventAction, MemoryObserver, PhotonReceiver, QuantumMemory, SimContext};

/// First observer of every memory in the array; forwards expirations to the
/// array's owner (typically a node).
#[derive(Default)]
struct ExpiryRelay {
    owner: RwLock<Option<Arc<dyn MemoryObserver>>>,
}

impl MemoryObserver for ExpiryRelay {
    fn memory_expire(&self, memory: &dyn QuantumMemory) {
        // Clone out so the owner may re-enter `set_owner`.
        let owner = self.owner.read().clone();
        match owner {
            Some(owner) => owner.memory_expire(memory),
            None => trace!(memory = memory.name(), "expiration with no array owner"),
        }
    }
}

/// Ordered collection of memories sharing one set of physical parameters.
pub struct MemoryArray {
    name: String,
    memories: Vec<Memory>,
    relay: Arc<ExpiryRelay>,
}

impl MemoryArray {
    /// Create `num_memories` memories named `"{name}[{i}]"`.
    pub fn new(
        name: impl Into<String>,
        num_memories: usize,
        config: &MemoryConfig,
        register: &mut dyn QuantumRegister,
    ) -> Result<Self, MemoryError> {
        let name = name.into();
        let relay = Arc::new(ExpiryRelay::default());

        let mut memories = Vec::with_capacity(num_memories);
        for i in 0..num_memories {
            let mut memory = Memory::new(format!("{name}[{i}]"), config, register)?;
            memory.attach(relay.clone());
            memory.set_memory_array(name.as_str());
            memories.push(memory);
        }

        debug!(array = %name, size = num_memories, "memory array created");
        Ok(Self {
            name,
            memories,
            relay,
        })
    }

    /// Entity receiving every member's expiration.
    pub fn set_owner(&self, owner: Arc<dyn MemoryObserver>) {
        *self.relay.owner.write() = Some(owner);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Memory> {
        self.memories.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Memory> {
        self.memories.get_mut(index)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Memory> {
        self.memories.iter_mut().find(|m| m.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Memory> {
        self.memories.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Memory> {
        self.memories.iter_mut()
    }

    /// Apply one parameter override to every memory. Nothing is written if
    /// the value is out of range.
    pub fn update_memory_params(&mut self, param: MemoryParam) -> Result<(), MemoryError> {
        param.validate(&self.name)?;
        for memory in &mut self.memories {
            memory.update_param(param)?;
        }
        debug!(array = %self.name, param = param.name(), value = param.value(), "bulk update");
        Ok(())
    }

    pub fn add_receiver(&mut self, receiver: Arc<dyn PhotonReceiver>) {
        for memory in &mut self.memories {
            memory.add_receiver(Arc::clone(&receiver));
        }
    }

    /// Route a fired event to the member it targets.
    pub fn handle_event(
        &mut self,
        action: &EventAction,
        ctx: &mut SimContext<'_>,
    ) -> Result<bool, MemoryError> {
        let Some(target) = action.target() else {
            return Ok(false);
        };
        match self.find_mut(target) {
            Some(memory) => memory.handle_event(action, ctx),
            None => Ok(false),
        }
    }
}

impl Index<usize> for MemoryArray {
    type Output = Memory;

    fn index(&self, index: usize) -> &Memory {
        &self.memories[index]
    }
}

impl IndexMut<usize> for MemoryArray {
    fn index_mut(&mut self, index: usize) -> &mut Memory {
        &mut self.memories[index]
    }
}

impl<'a> IntoIterator for &'a MemoryArray {
    type Item = &'a Memory;
    type IntoIter = std::slice::Iter<'a, Memory>;

    fn into_iter(self) -> Self::IntoIter {
        self.memories.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTimeline;
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared_types::{KetRegister, Photon};

    #[derive(Default)]
    struct Node {
        expired: Mutex<Vec<String>>,
    }

    impl MemoryObserver for Node {
        fn memory_expire(&self, memory: &dyn QuantumMemory) {
            self.expired.lock().push(memory.name().to_string());
        }
    }

    struct Discard;

    impl PhotonReceiver for Discard {
        fn get(&self, _photon: Photon, _destination: &str) {}
    }

    #[test]
    fn test_members_are_named_by_index() {
        let mut register = KetRegister::new();
        let array =
            MemoryArray::new("alice.memo", 3, &MemoryConfig::default(), &mut register).unwrap();

        assert_eq!(array.len(), 3);
        assert_eq!(array[2].name(), "alice.memo[2]");
        assert_eq!(array[0].memory_array(), Some("alice.memo"));
        assert_eq!(register.len(), 3);
    }

    #[test]
    fn test_expiration_reaches_owner() {
        let mut timeline = InMemoryTimeline::new();
        let mut register = KetRegister::new();
        let mut rng = StdRng::seed_from_u64(5);

        let mut array =
            MemoryArray::new("alice.memo", 2, &MemoryConfig::default(), &mut register).unwrap();
        let node = Arc::new(Node::default());
        array.set_owner(node.clone());

        let mut ctx = SimContext::new(&mut timeline, &mut register, &mut rng);
        array[1].expire(&mut ctx).unwrap();

        assert_eq!(*node.expired.lock(), vec!["alice.memo[1]".to_string()]);
    }

    #[test]
    fn test_bulk_update_is_all_or_nothing() {
        let mut register = KetRegister::new();
        let mut array =
            MemoryArray::new("a", 4, &MemoryConfig::default(), &mut register).unwrap();

        array
            .update_memory_params(MemoryParam::from_name("coherence_time", 0.5).unwrap())
            .unwrap();
        assert!(array.iter().all(|m| m.coherence_time() == 0.5));

        assert!(array
            .update_memory_params(MemoryParam::RawFidelity(1.1))
            .is_err());
        assert!(array.iter().all(|m| m.raw_fidelity() == 0.85));
    }

    #[test]
    fn test_bulk_receiver_registration() {
        let mut timeline = InMemoryTimeline::new();
        let mut register = KetRegister::new();
        let mut rng = StdRng::seed_from_u64(5);

        let mut array =
            MemoryArray::new("a", 2, &MemoryConfig::default(), &mut register).unwrap();
        array.add_receiver(Arc::new(Discard));

        let mut ctx = SimContext::new(&mut timeline, &mut register, &mut rng);
        for memory in array.iter_mut() {
            assert!(memory.excite("b", &mut ctx).unwrap().is_some());
        }
    }

    #[test]
    fn test_handle_event_routes_by_name() {
        let mut timeline = InMemoryTimeline::new();
        let mut register = KetRegister::new();
        let mut rng = StdRng::seed_from_u64(5);

        let mut array =
            MemoryArray::new("a", 2, &MemoryConfig::default(), &mut register).unwrap();
        let node = Arc::new(Node::default());
        array.set_owner(node.clone());

        let mut ctx = SimContext::new(&mut timeline, &mut register, &mut rng);
        let hit = EventAction::Expire {
            memory: "a[0]".to_string(),
        };
        let miss = EventAction::Expire {
            memory: "b[0]".to_string(),
        };
        assert!(array.handle_event(&hit, &mut ctx).unwrap());
        assert!(!array.handle_event(&miss, &mut ctx).unwrap());
        assert_eq!(node.expired.lock().len(), 1);
    }
}
