//! # QN-01 Quantum Memory
//!
//! Physical quantum-memory models driven by a discrete-event timeline.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Memory state machines, no I/O
//!   - `Memory`: Single-atom memory (excite, expire, reset, update_state)
//!   - `AbsorptiveMemory`: AFC / AFC-spinwave ensemble memory
//!   - `MemoryArray`: Fixed-size aggregator with typed bulk updates
//!   - `DecaySampler`: Fixed or truncated-normal coherence time
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `Timeline`: Event kernel (driven port)
//!   - `PhotonReceiver`, `MemoryObserver`: Downstream collaborators
//!   - `QuantumMemory`: Read view handed to observers
//!
//! - **Adapters Layer** (`adapters/`)
//!   - `InMemoryTimeline`: Ordered event store for tests and embedding
//!
//! ## Execution Model
//!
//! Every operation runs synchronously inside one timeline callback. Delays
//! are modelled by scheduling a future `EventAction`; the kernel hands the
//! action back to `handle_event` when it fires.
//!
//! ## Invariants
//!
//! - **INVARIANT-1**: A memory owns exactly one register key for its lifetime
//!   (single-atom memories only).
//! - **INVARIANT-2**: At most one expiration event is pending per memory;
//!   scheduling a new one cancels the previous one.
//! - **INVARIANT-3**: AFC operations require a prepared comb.
//!
//! ## Usage Example
//!
//! ```ignore
//! use qn_01_quantum_memory::{InMemoryTimeline, Memory, MemoryConfig, SimContext};
//! use shared_types::KetRegister;
//!
//! let mut timeline = InMemoryTimeline::new();
//! let mut register = KetRegister::new();
//! let mut rng = rand::thread_rng();
//!
//! let mut memory = Memory::new("alice.memo[0]", &MemoryConfig::default(), &mut register)?;
//! let mut ctx = SimContext::new(&mut timeline, &mut register, &mut rng);
//! memory.update_state(&plus_state, &mut ctx)?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use adapters::InMemoryTimeline;
pub use domain::{
    Absorption, AbsorptiveMemory, AbsorptiveMemoryConfig, DecaySampler, Emission,
    EmissionEfficiency, EntanglementPeer, ExpirationSlot, Memory, MemoryArray, MemoryConfig,
    MemoryParam, ObserverSet, StoredPhoton,
};
pub use error::MemoryError;
pub use ports::{
    EventAction, EventId, MemoryObserver, PhotonReceiver, QuantumMemory, SimContext, Timeline,
};
