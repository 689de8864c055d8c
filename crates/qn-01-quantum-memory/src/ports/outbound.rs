//! Outbound Ports (Driven Ports)
//!
//! These traits define what a memory needs from the simulation around it:
//! an event kernel, a quantum register (from `shared-types`), a photon
//! receiver and expiration observers.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use shared_types::{Photon, Picoseconds, QstateKey, QuantumRegister};

use crate::domain::EntanglementPeer;

/// Handle of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

/// What should happen when a scheduled event fires.
///
/// Memory-targeted actions name the memory; the kernel routes them back to
/// `handle_event` on the owning entity. Photon deliveries carry their receiver.
#[derive(Clone)]
pub enum EventAction {
    /// Memory expiration.
    Expire { memory: String },
    /// AFC preparation completes.
    PrepareAfc { memory: String },
    /// Fixed-delay AFC re-emission.
    Retrieve { memory: String, destination: String },
    /// Hand a re-emitted photon to a receiver.
    DeliverPhoton {
        receiver: Arc<dyn PhotonReceiver>,
        photon: Photon,
        destination: String,
    },
}

impl EventAction {
    /// Name of the memory this action targets, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Expire { memory }
            | Self::PrepareAfc { memory }
            | Self::Retrieve { memory, .. } => Some(memory),
            Self::DeliverPhoton { .. } => None,
        }
    }

    /// Perform a photon delivery. Returns false for memory-targeted actions.
    pub fn deliver(&self) -> bool {
        match self {
            Self::DeliverPhoton {
                receiver,
                photon,
                destination,
            } => {
                receiver.get(photon.clone(), destination);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expire { memory } => f.debug_struct("Expire").field("memory", memory).finish(),
            Self::PrepareAfc { memory } => {
                f.debug_struct("PrepareAfc").field("memory", memory).finish()
            }
            Self::Retrieve {
                memory,
                destination,
            } => f
                .debug_struct("Retrieve")
                .field("memory", memory)
                .field("destination", destination)
                .finish(),
            Self::DeliverPhoton {
                photon,
                destination,
                ..
            } => f
                .debug_struct("DeliverPhoton")
                .field("photon", photon)
                .field("destination", destination)
                .finish_non_exhaustive(),
        }
    }
}

/// Discrete-event kernel (Driven Port).
///
/// The memory layer only schedules, moves and cancels events; it never
/// runs the queue itself.
pub trait Timeline {
    /// Current simulation time.
    fn now(&self) -> Picoseconds;

    /// Schedule `action` at absolute `time`.
    fn schedule(&mut self, time: Picoseconds, action: EventAction) -> EventId;

    /// Cancel a pending event. Unknown or already-fired ids are ignored.
    fn remove_event(&mut self, id: EventId);

    /// Move a pending event to `time`.
    fn update_event_time(&mut self, id: EventId, time: Picoseconds);

    /// Firing time of a pending event.
    fn event_time(&self, id: EventId) -> Option<Picoseconds>;
}

/// Downstream optical entity (BSM device, optical channel, node).
pub trait PhotonReceiver: Send + Sync {
    fn get(&self, photon: Photon, destination: &str);
}

/// Read-only view of a memory handed to observers.
pub trait QuantumMemory {
    fn name(&self) -> &str;

    /// Current fidelity (0 until a state is written).
    fn fidelity(&self) -> f64;

    fn raw_fidelity(&self) -> f64;

    fn entangled_memory(&self) -> Option<&EntanglementPeer>;

    /// Register key, for memories that own one.
    fn qstate_key(&self) -> Option<QstateKey>;

    /// Time of the pending expiration event, if any.
    fn expire_time(&self) -> Option<Picoseconds>;
}

/// Entanglement protocol or aggregator notified on expiration.
pub trait MemoryObserver: Send + Sync {
    fn memory_expire(&self, memory: &dyn QuantumMemory);
}

/// Collaborators available to a memory during one callback.
pub struct SimContext<'a> {
    pub timeline: &'a mut dyn Timeline,
    pub register: &'a mut dyn QuantumRegister,
    pub rng: &'a mut dyn RngCore,
}

impl<'a> SimContext<'a> {
    pub fn new(
        timeline: &'a mut dyn Timeline,
        register: &'a mut dyn QuantumRegister,
        rng: &'a mut dyn RngCore,
    ) -> Self {
        Self {
            timeline,
            register,
            rng,
        }
    }

    pub fn now(&self) -> Picoseconds {
        self.timeline.now()
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        use rand::Rng;
        self.rng.gen::<f64>()
    }
}
