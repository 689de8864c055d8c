//! Ports Layer
//!
//! Defines the interfaces (traits) for the collaborators a memory drives:
//! - `Timeline` - the discrete-event kernel
//! - `PhotonReceiver` - where emitted photons go
//! - `MemoryObserver` - protocols notified on expiration

pub mod outbound;

pub use outbound::{
    EventAction, EventId, MemoryObserver, PhotonReceiver, QuantumMemory, SimContext, Timeline,
};
