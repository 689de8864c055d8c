//! # Quantum Register Port
//!
//! The key-based contract used by memories (directly or through the state
//! manager client) and hosted by the state manager server.
//!
//! `KetRegister` is the in-process adapter: a ket-vector register that keeps
//! joint states shared between all keys they describe, applies the small gate
//! set of `Circuit`, and measures in the computational basis with collapse.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::FRAC_1_SQRT_2;
use std::sync::Arc;

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::circuit::{Circuit, Gate};
use crate::entities::{zero_ket, Amplitude, KetState, QstateKey};
use crate::errors::RegisterError;

/// Measurement outcomes keyed by register key.
pub type MeasurementMap = BTreeMap<QstateKey, u8>;

/// Allowed deviation of the squared norm from 1.
const NORM_TOLERANCE: f64 = 1e-6;

/// Quantum register (Driven Port).
///
/// All methods take `&mut self` so that remote implementations can drive
/// their connection without interior mutability.
pub trait QuantumRegister {
    /// Allocate a fresh key, initialized to `amplitudes` or |0>.
    fn new_state(&mut self, amplitudes: Option<&[Amplitude]>) -> Result<QstateKey, RegisterError>;

    /// Current state containing `key`.
    fn get(&mut self, key: QstateKey) -> Result<KetState, RegisterError>;

    /// Overwrite `keys` with a joint pure state.
    fn set(&mut self, keys: &[QstateKey], amplitudes: &[Amplitude]) -> Result<(), RegisterError>;

    /// Execute `circuit` with qubit `i` bound to `keys[i]`.
    ///
    /// Returns one entry per measured qubit; empty if nothing was measured.
    fn run_circuit(
        &mut self,
        circuit: &Circuit,
        keys: &[QstateKey],
    ) -> Result<MeasurementMap, RegisterError>;

    /// Release `key`.
    fn remove(&mut self, key: QstateKey) -> Result<(), RegisterError>;
}

/// In-process ket-vector register.
pub struct KetRegister {
    states: HashMap<QstateKey, Arc<KetState>>,
    least_available: QstateKey,
    rng: StdRng,
}

impl KetRegister {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic measurement sampling, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            states: HashMap::new(),
            least_available: 0,
            rng,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, key: QstateKey) -> bool {
        self.states.contains_key(&key)
    }

    /// Measure `key` out of a joint state so that no other key's state still
    /// lists it. Single-key states are left untouched.
    fn split_out(&mut self, key: QstateKey) {
        let Some(state) = self.states.get(&key).cloned() else {
            return;
        };
        let Some(pos) = state.keys.iter().position(|k| *k == key) else {
            return;
        };
        if state.keys.len() < 2 {
            return;
        }

        let n = state.keys.len();
        let prob_zero = probability_of_zero(&state.amplitudes, n, pos);
        let bit = if self.rng.gen::<f64>() < prob_zero { 0 } else { 1 };
        let amplitudes = collapse(&state.amplitudes, n, pos, bit);

        let mut rest = state.keys.clone();
        rest.remove(pos);
        self.states.remove(&key);
        self.store(KetState::new(rest, amplitudes));
        trace!(key, bit, "split key out of joint state");
    }

    fn store(&mut self, state: KetState) {
        let state = Arc::new(state);
        for key in &state.keys {
            self.least_available = self.least_available.max(key + 1);
            self.states.insert(*key, Arc::clone(&state));
        }
    }
}

impl Default for KetRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantumRegister for KetRegister {
    fn new_state(&mut self, amplitudes: Option<&[Amplitude]>) -> Result<QstateKey, RegisterError> {
        let amplitudes = match amplitudes {
            Some(amps) => amps.to_vec(),
            None => zero_ket(),
        };

        let mut key = self.least_available;
        while self.states.contains_key(&key) {
            key += 1;
        }

        validate_state(&[key], &amplitudes)?;
        self.store(KetState::new(vec![key], amplitudes));
        trace!(key, "allocated register key");
        Ok(key)
    }

    fn get(&mut self, key: QstateKey) -> Result<KetState, RegisterError> {
        self.states
            .get(&key)
            .map(|state| state.as_ref().clone())
            .ok_or(RegisterError::UnknownKey(key))
    }

    fn set(&mut self, keys: &[QstateKey], amplitudes: &[Amplitude]) -> Result<(), RegisterError> {
        validate_state(keys, amplitudes)?;
        for key in keys {
            self.split_out(*key);
        }
        self.store(KetState::new(keys.to_vec(), amplitudes.to_vec()));
        Ok(())
    }

    fn run_circuit(
        &mut self,
        circuit: &Circuit,
        keys: &[QstateKey],
    ) -> Result<MeasurementMap, RegisterError> {
        validate_circuit(circuit, keys)?;

        // Build the joint state over every key touched (plus their partners).
        let mut all_keys: Vec<QstateKey> = Vec::new();
        let mut amplitudes = vec![Complex64::new(1.0, 0.0)];
        for key in keys {
            if all_keys.contains(key) {
                continue;
            }
            let state = self
                .states
                .get(key)
                .cloned()
                .ok_or(RegisterError::UnknownKey(*key))?;
            amplitudes = kron(&amplitudes, &state.amplitudes);
            all_keys.extend_from_slice(&state.keys);
        }

        for gate in circuit.gates() {
            let pos = position_of(&all_keys, keys[gate.qubit()])?;
            apply_gate(&mut amplitudes, all_keys.len(), pos, *gate);
        }

        let mut results = MeasurementMap::new();
        for &qubit in circuit.measured_qubits() {
            let key = keys[qubit];
            let pos = position_of(&all_keys, key)?;
            let n = all_keys.len();

            let prob_zero = probability_of_zero(&amplitudes, n, pos);
            let bit = if self.rng.gen::<f64>() < prob_zero { 0 } else { 1 };

            amplitudes = collapse(&amplitudes, n, pos, bit);
            all_keys.remove(pos);

            let measured = if bit == 0 {
                zero_ket()
            } else {
                vec![Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)]
            };
            self.store(KetState::new(vec![key], measured));
            results.insert(key, bit);
        }

        if !all_keys.is_empty() {
            self.store(KetState::new(all_keys, amplitudes));
        }

        Ok(results)
    }

    fn remove(&mut self, key: QstateKey) -> Result<(), RegisterError> {
        self.split_out(key);
        self.states
            .remove(&key)
            .map(|_| ())
            .ok_or(RegisterError::UnknownKey(key))
    }
}

fn validate_state(keys: &[QstateKey], amplitudes: &[Amplitude]) -> Result<(), RegisterError> {
    for (i, key) in keys.iter().enumerate() {
        if keys[..i].contains(key) {
            return Err(RegisterError::DuplicateKey(*key));
        }
    }

    let expected = 1usize << keys.len();
    if amplitudes.len() != expected {
        return Err(RegisterError::AmplitudeLength {
            keys: keys.len(),
            expected,
            actual: amplitudes.len(),
        });
    }

    let norm: f64 = amplitudes.iter().map(|a| a.norm_sqr()).sum();
    if (norm - 1.0).abs() > NORM_TOLERANCE {
        return Err(RegisterError::NotNormalized { norm });
    }
    Ok(())
}

fn validate_circuit(circuit: &Circuit, keys: &[QstateKey]) -> Result<(), RegisterError> {
    if circuit.size() != keys.len() {
        return Err(RegisterError::CircuitSize {
            circuit: circuit.size(),
            keys: keys.len(),
        });
    }
    for (i, key) in keys.iter().enumerate() {
        if keys[..i].contains(key) {
            return Err(RegisterError::DuplicateKey(*key));
        }
    }

    let indices = circuit
        .gates()
        .iter()
        .map(Gate::qubit)
        .chain(circuit.measured_qubits().iter().copied());
    for index in indices {
        if index >= circuit.size() {
            return Err(RegisterError::QubitOutOfRange {
                index,
                size: circuit.size(),
            });
        }
    }
    Ok(())
}

fn position_of(keys: &[QstateKey], key: QstateKey) -> Result<usize, RegisterError> {
    keys.iter()
        .position(|k| *k == key)
        .ok_or(RegisterError::UnknownKey(key))
}

fn kron(a: &[Amplitude], b: &[Amplitude]) -> Vec<Amplitude> {
    a.iter()
        .flat_map(|x| b.iter().map(move |y| x * y))
        .collect()
}

/// Bit mask of qubit `pos` in an `n`-qubit basis index (qubit 0 is the MSB).
fn qubit_mask(n: usize, pos: usize) -> usize {
    1 << (n - 1 - pos)
}

fn apply_gate(amplitudes: &mut [Amplitude], n: usize, pos: usize, gate: Gate) {
    let zero = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);
    let h = Complex64::new(FRAC_1_SQRT_2, 0.0);
    let m = match gate {
        Gate::H(_) => [[h, h], [h, -h]],
        Gate::X(_) => [[zero, one], [one, zero]],
        Gate::Z(_) => [[one, zero], [zero, -one]],
    };

    let mask = qubit_mask(n, pos);
    for i in 0..amplitudes.len() {
        if i & mask != 0 {
            continue;
        }
        let j = i | mask;
        let (a, b) = (amplitudes[i], amplitudes[j]);
        amplitudes[i] = m[0][0] * a + m[0][1] * b;
        amplitudes[j] = m[1][0] * a + m[1][1] * b;
    }
}

fn probability_of_zero(amplitudes: &[Amplitude], n: usize, pos: usize) -> f64 {
    let mask = qubit_mask(n, pos);
    amplitudes
        .iter()
        .enumerate()
        .filter(|(i, _)| i & mask == 0)
        .map(|(_, a)| a.norm_sqr())
        .sum()
}

/// Project qubit `pos` onto `bit` and drop it from the state.
fn collapse(amplitudes: &[Amplitude], n: usize, pos: usize, bit: u8) -> Vec<Amplitude> {
    let mask = qubit_mask(n, pos);
    let wanted = if bit == 0 { 0 } else { mask };
    let kept: Vec<Amplitude> = amplitudes
        .iter()
        .enumerate()
        .filter(|(i, _)| i & mask == wanted)
        .map(|(_, a)| *a)
        .collect();

    let norm = kept.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        kept.into_iter().map(|a| a / norm).collect()
    } else {
        kept
    }
}
