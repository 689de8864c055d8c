//! # Expiration Flow Tests (qn-01)
//!
//! Drives single-atom memories through the timeline end to end: a state
//! write schedules expiration, the event fires, in-flight photons are
//! invalidated and every observer hears about it exactly once.

use std::sync::Arc;

use num_complex::Complex64;
use parking_lot::Mutex;
use qn_01_quantum_memory::{
    InMemoryTimeline, Memory, MemoryArray, MemoryConfig, MemoryObserver, PhotonReceiver,
    QuantumMemory, SimContext, Timeline,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared_types::{zero_ket, KetRegister, Photon, QuantumRegister};

// =============================================================================
// TEST HELPERS
// =============================================================================

struct Sim {
    timeline: InMemoryTimeline,
    register: KetRegister,
    rng: StdRng,
}

impl Sim {
    fn new() -> Self {
        Self {
            timeline: InMemoryTimeline::new(),
            register: KetRegister::with_seed(11),
            rng: StdRng::seed_from_u64(11),
        }
    }

    fn ctx(&mut self) -> SimContext<'_> {
        SimContext::new(&mut self.timeline, &mut self.register, &mut self.rng)
    }

    /// Fire every pending event up to and including `until`.
    fn run_until(&mut self, until: u64, memory: &mut Memory) -> usize {
        let mut fired = 0;
        while self.timeline.peek_time().is_some_and(|t| t <= until) {
            let Some((_, _, action)) = self.timeline.pop_next() else {
                break;
            };
            let mut ctx = self.ctx();
            if !action.deliver() {
                memory.handle_event(&action, &mut ctx).unwrap();
            }
            fired += 1;
        }
        self.timeline.advance_to(until);
        fired
    }
}

#[derive(Default)]
struct CountingObserver {
    calls: Mutex<Vec<String>>,
}

impl MemoryObserver for CountingObserver {
    fn memory_expire(&self, memory: &dyn QuantumMemory) {
        self.calls.lock().push(memory.name().to_string());
    }
}

#[derive(Default)]
struct Channel {
    photons: Mutex<Vec<Photon>>,
}

impl PhotonReceiver for Channel {
    fn get(&self, photon: Photon, _destination: &str) {
        self.photons.lock().push(photon);
    }
}

fn excited() -> Vec<Complex64> {
    vec![Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)]
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_update_state_expires_after_coherence_time() {
    let mut sim = Sim::new();
    let config = MemoryConfig::default()
        .with_coherence_time(1e-6)
        .with_frequency(0.0);
    let mut memory = Memory::new("alice.memo[0]", &config, &mut sim.register).unwrap();

    let channel = Arc::new(Channel::default());
    memory.add_receiver(channel.clone());
    let first = Arc::new(CountingObserver::default());
    let second = Arc::new(CountingObserver::default());
    memory.attach(first.clone());
    memory.attach(second.clone());

    memory.update_state(&excited(), &mut sim.ctx()).unwrap();
    assert_eq!(memory.get_expire_time(), Some(1_000_000));

    let photon = memory.excite("bob", &mut sim.ctx()).unwrap().unwrap();
    assert!(!photon.is_null());
    assert_eq!(memory.next_excite_time(), 0);

    assert_eq!(sim.run_until(999_999, &mut memory), 0);
    assert!(first.calls.lock().is_empty());

    assert_eq!(sim.run_until(1_000_001, &mut memory), 1);

    assert!(photon.is_null());
    assert!(channel.photons.lock()[0].is_null());
    assert_eq!(*first.calls.lock(), vec!["alice.memo[0]".to_string()]);
    assert_eq!(*second.calls.lock(), vec!["alice.memo[0]".to_string()]);
    assert!(memory.get_expire_time().is_none());
    assert_eq!(sim.timeline.pending(), 0);
    assert_eq!(
        sim.register.get(memory.qstate_key()).unwrap().amplitudes,
        zero_ket()
    );
}

#[test]
fn test_detached_observer_is_not_notified() {
    let mut sim = Sim::new();
    let config = MemoryConfig::default().with_coherence_time(1e-9);
    let mut memory = Memory::new("m", &config, &mut sim.register).unwrap();

    let kept = Arc::new(CountingObserver::default());
    let dropped: Arc<dyn MemoryObserver> = Arc::new(CountingObserver::default());
    memory.attach(kept.clone());
    memory.attach(dropped.clone());
    memory.detach(&dropped);
    memory.detach(&dropped);

    memory.update_state(&excited(), &mut sim.ctx()).unwrap();
    sim.run_until(10_000, &mut memory);

    assert_eq!(kept.calls.lock().len(), 1);
    assert_eq!(memory.observer_count(), 1);
}

#[test]
fn test_rewrite_before_expiry_fires_once_at_new_time() {
    let mut sim = Sim::new();
    let config = MemoryConfig::default().with_coherence_time(1e-6);
    let mut memory = Memory::new("m", &config, &mut sim.register).unwrap();
    let observer = Arc::new(CountingObserver::default());
    memory.attach(observer.clone());

    memory.update_state(&excited(), &mut sim.ctx()).unwrap();
    sim.run_until(600_000, &mut memory);
    memory.update_state(&excited(), &mut sim.ctx()).unwrap();

    assert_eq!(sim.timeline.pending(), 1);
    assert_eq!(memory.get_expire_time(), Some(1_600_000));

    assert_eq!(sim.run_until(1_500_000, &mut memory), 0);
    assert_eq!(sim.run_until(2_000_000, &mut memory), 1);
    assert_eq!(observer.calls.lock().len(), 1);
}

#[test]
fn test_partner_alignment_moves_pending_event() {
    let mut sim = Sim::new();
    let config = MemoryConfig::default().with_coherence_time(1e-6);
    let mut memory = Memory::new("m", &config, &mut sim.register).unwrap();

    memory.update_state(&excited(), &mut sim.ctx()).unwrap();
    memory.update_expire_time(400_000, &mut sim.ctx());

    assert_eq!(sim.timeline.pending(), 1);
    assert_eq!(memory.get_expire_time(), Some(400_000));
    assert_eq!(sim.timeline.now(), 0);
    assert_eq!(sim.run_until(400_000, &mut memory), 1);
}

#[test]
fn test_array_member_expiry_reaches_node() {
    let mut sim = Sim::new();
    let config = MemoryConfig::default().with_coherence_time(1e-6);
    let mut array = MemoryArray::new("alice.memo", 3, &config, &mut sim.register).unwrap();
    let node = Arc::new(CountingObserver::default());
    array.set_owner(node.clone());

    array[2].update_state(&excited(), &mut sim.ctx()).unwrap();

    let (_, time, action) = sim.timeline.pop_next().unwrap();
    assert_eq!(time, 1_000_000);
    let mut ctx = sim.ctx();
    assert!(array.handle_event(&action, &mut ctx).unwrap());

    assert_eq!(*node.calls.lock(), vec!["alice.memo[2]".to_string()]);
}
