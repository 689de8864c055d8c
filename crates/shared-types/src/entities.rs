//! # Core Domain Entities
//!
//! Defines the simulation value objects shared across crates.
//!
//! ## Clusters
//!
//! - **Time & Keys**: `Picoseconds`, `QstateKey`
//! - **Quantum State**: `KetState`, `Amplitude`
//! - **Optics**: `Photon`, `PhotonEncoding`

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

// =============================================================================
// CLUSTER A: TIME & KEYS
// =============================================================================

/// Simulation time, in picoseconds.
pub type Picoseconds = u64;

/// Number of picoseconds in one second.
pub const PICOSECONDS_PER_SECOND: f64 = 1e12;

/// Opaque handle identifying one quantum degree of freedom in a register.
pub type QstateKey = u64;

/// A single complex amplitude in the Z basis.
pub type Amplitude = Complex64;

/// Convert a duration in seconds to whole picoseconds (rounded).
///
/// Negative inputs saturate to zero.
pub fn seconds_to_picoseconds(seconds: f64) -> Picoseconds {
    let ps = (seconds * PICOSECONDS_PER_SECOND).round();
    if ps <= 0.0 {
        0
    } else {
        ps as Picoseconds
    }
}

/// The definite |0> amplitude vector.
pub fn zero_ket() -> Vec<Amplitude> {
    vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)]
}

// =============================================================================
// CLUSTER B: QUANTUM STATE
// =============================================================================

/// A pure state over one or more register keys.
///
/// Amplitudes are ordered with `keys[0]` as the most significant qubit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KetState {
    /// Keys jointly described by this state.
    pub keys: Vec<QstateKey>,
    /// `2^keys.len()` amplitudes.
    pub amplitudes: Vec<Amplitude>,
}

impl KetState {
    pub fn new(keys: Vec<QstateKey>, amplitudes: Vec<Amplitude>) -> Self {
        Self { keys, amplitudes }
    }

    /// Number of qubits in the state.
    pub fn num_qubits(&self) -> usize {
        self.keys.len()
    }
}

// =============================================================================
// CLUSTER C: OPTICS
// =============================================================================

/// Encoding carried by a photon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum PhotonEncoding {
    /// Emitted by a single-atom memory; `memory` names the emitter.
    SingleAtom { memory: String },
    /// Polarization qubit.
    Polarization,
    /// Time-bin qubit.
    TimeBin,
}

struct PhotonInner {
    name: String,
    wavelength: f64,
    location: Option<String>,
    encoding: PhotonEncoding,
    is_null: AtomicBool,
}

/// Handle to a simulated photon.
///
/// Cloning shares identity: marking one clone null marks all of them. This is
/// how a memory invalidates a photon that is already in flight.
#[derive(Clone)]
pub struct Photon {
    inner: Arc<PhotonInner>,
}

impl Photon {
    pub fn new(name: impl Into<String>, wavelength: f64, encoding: PhotonEncoding) -> Self {
        Self {
            inner: Arc::new(PhotonInner {
                name: name.into(),
                wavelength,
                location: None,
                encoding,
                is_null: AtomicBool::new(false),
            }),
        }
    }

    /// Create a photon whose location is the named entity.
    pub fn with_location(
        name: impl Into<String>,
        wavelength: f64,
        location: impl Into<String>,
        encoding: PhotonEncoding,
    ) -> Self {
        Self {
            inner: Arc::new(PhotonInner {
                name: name.into(),
                wavelength,
                location: Some(location.into()),
                encoding,
                is_null: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Wavelength in nanometers.
    pub fn wavelength(&self) -> f64 {
        self.inner.wavelength
    }

    pub fn location(&self) -> Option<&str> {
        self.inner.location.as_deref()
    }

    pub fn encoding(&self) -> &PhotonEncoding {
        &self.inner.encoding
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_null.load(Ordering::Acquire)
    }

    /// Mark the photon (and every clone of it) as carrying no excitation.
    pub fn set_null(&self) {
        self.inner.is_null.store(true, Ordering::Release);
    }

    /// True if both handles refer to the same photon.
    pub fn same_as(&self, other: &Photon) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Photon {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Photon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Photon")
            .field("name", &self.inner.name)
            .field("wavelength", &self.inner.wavelength)
            .field("location", &self.inner.location)
            .field("encoding", &self.inner.encoding)
            .field("is_null", &self.is_null())
            .finish()
    }
}
