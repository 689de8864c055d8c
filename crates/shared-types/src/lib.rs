//! # Shared Types Crate
//!
//! This crate contains the value objects and the quantum register contract
//! shared by the memory models (`qn-01`) and the state manager (`qn-02`).
//!
//! ## Design Principles
//!
//! - **Key-Based Contract**: Memories and the state manager only reach the
//!   quantum engine through `QuantumRegister`, addressing states by key.
//! - **Shared Photon Identity**: A `Photon` is a cheap handle; every clone
//!   observes the same `is_null` flag so emitted photons can be invalidated
//!   after they leave the memory.
//! - **Single Key Owner**: A key belongs to exactly one memory for its whole
//!   lifetime. The register never hands the same key out twice.

pub mod circuit;
pub mod entities;
pub mod errors;
pub mod register;

pub use circuit::{Circuit, Gate};
pub use entities::*;
pub use errors::*;
pub use register::{KetRegister, MeasurementMap, QuantumRegister};
