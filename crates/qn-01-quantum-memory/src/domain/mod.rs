//! Domain Layer - Memory state machines
//!
//! This layer contains:
//! - Single-atom memory (`Memory`)
//! - AFC / AFC-spinwave ensemble memory (`AbsorptiveMemory`)
//! - Memory aggregation (`MemoryArray`)
//! - Coherence-time sampling, expiration and observer bookkeeping
//!
//! RULES:
//! - No I/O operations
//! - No async code
//! - Every delay is a scheduled `EventAction`

pub mod absorptive;
pub mod array;
pub mod config;
pub mod decay;
pub mod entanglement;
pub mod expiration;
pub mod memory;
pub mod observers;

pub use absorptive::{Absorption, AbsorptiveMemory, Emission, StoredPhoton};
pub use array::MemoryArray;
pub use config::{AbsorptiveMemoryConfig, EmissionEfficiency, MemoryConfig, MemoryParam};
pub use decay::DecaySampler;
pub use entanglement::EntanglementPeer;
pub use expiration::{ExpirationHandle, ExpirationSlot};
pub use memory::Memory;
pub use observers::ObserverSet;
