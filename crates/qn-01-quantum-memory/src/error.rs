//! Error types for the Quantum Memory subsystem
//!
//! Every variant is a precondition violation or a collaborator failure.
//! Probabilistic losses (failed absorption, failed emission, photons outside
//! the absorption window) are data, never errors.

use shared_types::{QstateKey, RegisterError};
use thiserror::Error;

/// Errors that can occur in the Quantum Memory subsystem
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Invalid {parameter} for memory {memory}: {value} ({reason})")]
    InvalidParameter {
        memory: String,
        parameter: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Unknown memory parameter: {0}")]
    UnknownParameter(String),

    #[error("AFC of memory {memory} is not prepared yet (during {operation})")]
    NotPrepared {
        memory: String,
        operation: &'static str,
    },

    #[error("AFC of memory {memory} has already been prepared")]
    AlreadyPrepared { memory: String },

    #[error("AFC memory {memory} can only have normal order of re-emission")]
    ReversedEmissionUnsupported { memory: String },

    #[error("Memory {memory} has no registered receiver")]
    NoReceiver { memory: String },

    #[error("Measurement of memory {memory} returned no outcome for key {key}")]
    MissingMeasurement { memory: String, key: QstateKey },

    #[error("Register error in memory {memory}: {source}")]
    Register {
        memory: String,
        #[source]
        source: RegisterError,
    },
}

impl MemoryError {
    /// Wrap a register failure with the name of the memory that hit it.
    pub(crate) fn register(memory: &str) -> impl FnOnce(RegisterError) -> Self + '_ {
        move |source| Self::Register {
            memory: memory.to_string(),
            source,
        }
    }
}
