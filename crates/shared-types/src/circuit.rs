//! # Circuit Value Object
//!
//! A circuit is an ordered list of single-qubit gates followed by
//! computational-basis measurements. Qubit indices are local to the circuit;
//! the register maps index `i` to the `i`-th key passed to `run_circuit`.

use serde::{Deserialize, Serialize};

/// Single-qubit gate applied to a circuit-local qubit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate", content = "qubit", rename_all = "lowercase")]
pub enum Gate {
    H(usize),
    X(usize),
    Z(usize),
}

impl Gate {
    pub fn qubit(&self) -> usize {
        match *self {
            Gate::H(q) | Gate::X(q) | Gate::Z(q) => q,
        }
    }
}

/// Gate sequence plus the ordered list of measured qubits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    size: usize,
    gates: Vec<Gate>,
    measured_qubits: Vec<usize>,
}

impl Circuit {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            gates: Vec::new(),
            measured_qubits: Vec::new(),
        }
    }

    pub fn h(&mut self, qubit: usize) -> &mut Self {
        self.gates.push(Gate::H(qubit));
        self
    }

    pub fn x(&mut self, qubit: usize) -> &mut Self {
        self.gates.push(Gate::X(qubit));
        self
    }

    pub fn z(&mut self, qubit: usize) -> &mut Self {
        self.gates.push(Gate::Z(qubit));
        self
    }

    pub fn measure(&mut self, qubit: usize) -> &mut Self {
        self.measured_qubits.push(qubit);
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn measured_qubits(&self) -> &[usize] {
        &self.measured_qubits
    }
}
