//! # Error Types
//!
//! Defines error types used across crates.

use thiserror::Error;

use crate::entities::QstateKey;

/// Errors raised by a quantum register (local engine or remote stub).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegisterError {
    /// Key was never allocated, or was already removed.
    #[error("Unknown register key: {0}")]
    UnknownKey(QstateKey),

    /// Amplitude vector does not match the number of keys.
    #[error("Amplitude length mismatch: {keys} keys need {expected} amplitudes, got {actual}")]
    AmplitudeLength {
        keys: usize,
        expected: usize,
        actual: usize,
    },

    /// Amplitudes do not describe a normalized state.
    #[error("State is not normalized: squared norm {norm}")]
    NotNormalized { norm: f64 },

    /// Circuit width does not match the number of keys supplied.
    #[error("Circuit size mismatch: circuit has {circuit} qubits, {keys} keys supplied")]
    CircuitSize { circuit: usize, keys: usize },

    /// Gate or measurement addresses a qubit outside the circuit.
    #[error("Qubit index {index} out of range for circuit of size {size}")]
    QubitOutOfRange { index: usize, size: usize },

    /// Same key passed twice in one call.
    #[error("Duplicate register key: {0}")]
    DuplicateKey(QstateKey),

    /// Remote register failed (transport or server-side).
    #[error("Remote register error: {0}")]
    Remote(String),
}
