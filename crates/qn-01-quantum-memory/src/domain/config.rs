//! Memory configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use qn_01_quantum_memory::domain::MemoryConfig;
//!
//! let config = MemoryConfig::default()
//!     .with_coherence_time(1e-3)
//!     .with_coherence_time_stdev(1e-4);
//! config.validate("alice.memo")?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared_types::Picoseconds;

use crate::domain::DecaySampler;
use crate::error::MemoryError;

fn check_probability(memory: &str, parameter: &'static str, value: f64) -> Result<(), MemoryError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MemoryError::InvalidParameter {
            memory: memory.to_string(),
            parameter,
            value,
            reason: "must lie in [0, 1]",
        })
    }
}

fn check_non_negative(
    memory: &str,
    parameter: &'static str,
    value: f64,
) -> Result<(), MemoryError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(MemoryError::InvalidParameter {
            memory: memory.to_string(),
            parameter,
            value,
            reason: "must be finite and non-negative",
        })
    }
}

// =============================================================================
// SINGLE-ATOM MEMORY
// =============================================================================

/// Physical parameters shared by every single-atom memory of an array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Raw fidelity written on successful entanglement (0 to 1)
    pub fidelity: f64,
    /// Maximum excitation frequency (Hz); 0 disables the rate limit
    pub frequency: f64,
    /// Probability of emitting a photon when excited (0 to 1)
    pub efficiency: f64,
    /// Average usable lifetime (s); <= 0 never expires
    pub coherence_time: f64,
    /// Standard deviation of the coherence time (s); 0 is deterministic
    pub coherence_time_stdev: f64,
    /// Wavelength of emitted photons (nm)
    pub wavelength: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            fidelity: 0.85,
            frequency: 80e6,
            efficiency: 1.0,
            coherence_time: -1.0,
            coherence_time_stdev: 0.0,
            wavelength: 500.0,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self, memory: &str) -> Result<(), MemoryError> {
        check_probability(memory, "fidelity", self.fidelity)?;
        check_probability(memory, "efficiency", self.efficiency)?;
        check_non_negative(memory, "frequency", self.frequency)?;
        check_non_negative(memory, "coherence_time_stdev", self.coherence_time_stdev)?;
        Ok(())
    }

    /// Sampler for the time between a state write and its expiration.
    pub fn decay_sampler(&self) -> DecaySampler {
        DecaySampler::new(self.coherence_time, self.coherence_time_stdev)
    }

    pub fn with_fidelity(mut self, fidelity: f64) -> Self {
        self.fidelity = fidelity;
        self
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_efficiency(mut self, efficiency: f64) -> Self {
        self.efficiency = efficiency;
        self
    }

    pub fn with_coherence_time(mut self, seconds: f64) -> Self {
        self.coherence_time = seconds;
        self
    }

    pub fn with_coherence_time_stdev(mut self, seconds: f64) -> Self {
        self.coherence_time_stdev = seconds;
        self
    }

    pub fn with_wavelength(mut self, nanometers: f64) -> Self {
        self.wavelength = nanometers;
        self
    }
}

/// A single tunable memory parameter, for bulk updates from scenario files.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MemoryParam {
    RawFidelity(f64),
    Frequency(f64),
    Efficiency(f64),
    CoherenceTime(f64),
    CoherenceTimeStdev(f64),
    Wavelength(f64),
}

impl MemoryParam {
    /// Parse a `name = value` override.
    ///
    /// Accepts the field names used by scenario files (`fidelity` is an
    /// alias of `raw_fidelity`).
    pub fn from_name(name: &str, value: f64) -> Result<Self, MemoryError> {
        match name {
            "raw_fidelity" | "fidelity" => Ok(Self::RawFidelity(value)),
            "frequency" => Ok(Self::Frequency(value)),
            "efficiency" => Ok(Self::Efficiency(value)),
            "coherence_time" => Ok(Self::CoherenceTime(value)),
            "coherence_time_stdev" => Ok(Self::CoherenceTimeStdev(value)),
            "wavelength" => Ok(Self::Wavelength(value)),
            other => Err(MemoryError::UnknownParameter(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RawFidelity(_) => "raw_fidelity",
            Self::Frequency(_) => "frequency",
            Self::Efficiency(_) => "efficiency",
            Self::CoherenceTime(_) => "coherence_time",
            Self::CoherenceTimeStdev(_) => "coherence_time_stdev",
            Self::Wavelength(_) => "wavelength",
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Self::RawFidelity(v)
            | Self::Frequency(v)
            | Self::Efficiency(v)
            | Self::CoherenceTime(v)
            | Self::CoherenceTimeStdev(v)
            | Self::Wavelength(v) => v,
        }
    }

    /// Range check applied before the value is written.
    pub fn validate(&self, memory: &str) -> Result<(), MemoryError> {
        match *self {
            Self::RawFidelity(v) | Self::Efficiency(v) => check_probability(memory, self.name(), v),
            Self::Frequency(v) | Self::CoherenceTimeStdev(v) => {
                check_non_negative(memory, self.name(), v)
            }
            Self::CoherenceTime(_) | Self::Wavelength(_) => Ok(()),
        }
    }
}

// =============================================================================
// ABSORPTIVE MEMORY
// =============================================================================

/// Emission probability as a function of storage time (ps).
#[derive(Clone)]
pub struct EmissionEfficiency(Arc<dyn Fn(f64) -> f64 + Send + Sync>);

impl EmissionEfficiency {
    /// Same probability regardless of storage time.
    pub fn constant(probability: f64) -> Self {
        Self(Arc::new(move |_: f64| probability))
    }

    pub fn from_fn(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Probability of re-emission after `store_time` picoseconds.
    pub fn at(&self, store_time: f64) -> f64 {
        (self.0)(store_time)
    }
}

impl Default for EmissionEfficiency {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

impl fmt::Debug for EmissionEfficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EmissionEfficiency(..)")
    }
}

/// AFC / AFC-spinwave memory parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsorptiveMemoryConfig {
    /// Raw fidelity (0 to 1)
    pub fidelity: f64,
    /// Total AFC bandwidth (Hz); sets the temporal mode bin
    pub frequency: f64,
    /// Probability of absorbing a resonant photon (0 to 1)
    pub absorption_efficiency: f64,
    /// Re-emission probability versus storage time
    #[serde(skip)]
    pub efficiency: EmissionEfficiency,
    /// Number of temporal modes
    pub mode_number: usize,
    /// Average usable lifetime of the comb (s); <= 0 never expires
    pub afc_lifetime: f64,
    /// Resonant wavelength (nm)
    pub wavelength: f64,
    /// Fidelity penalty for multi-photon occupancy of one mode
    pub overlap_error: f64,
    /// Time to prepare the comb (ps)
    pub prepare_time: Picoseconds,
    pub is_spinwave: bool,
    /// Reverse re-emission order (spinwave only)
    pub is_reversed: bool,
    /// Fixed re-emission destination, overriding the caller's
    pub destination: Option<String>,
}

impl Default for AbsorptiveMemoryConfig {
    fn default() -> Self {
        Self {
            fidelity: 0.85,
            frequency: 80e6,
            absorption_efficiency: 1.0,
            efficiency: EmissionEfficiency::default(),
            mode_number: 50,
            afc_lifetime: -1.0,
            wavelength: 500.0,
            overlap_error: 0.0,
            prepare_time: 0,
            is_spinwave: false,
            is_reversed: false,
            destination: None,
        }
    }
}

impl AbsorptiveMemoryConfig {
    /// Reversed order on a plain AFC is accepted here and rejected at
    /// retrieval, where the re-emission order actually matters.
    pub fn validate(&self, memory: &str) -> Result<(), MemoryError> {
        check_probability(memory, "fidelity", self.fidelity)?;
        check_probability(memory, "absorption_efficiency", self.absorption_efficiency)?;
        check_probability(memory, "overlap_error", self.overlap_error)?;

        if !(self.frequency > 0.0 && self.frequency.is_finite()) {
            return Err(MemoryError::InvalidParameter {
                memory: memory.to_string(),
                parameter: "frequency",
                value: self.frequency,
                reason: "AFC bandwidth must be positive",
            });
        }

        if self.mode_number == 0 {
            return Err(MemoryError::InvalidParameter {
                memory: memory.to_string(),
                parameter: "mode_number",
                value: 0.0,
                reason: "at least one temporal mode is required",
            });
        }

        Ok(())
    }

    /// Length of one temporal mode (ps).
    pub fn mode_bin(&self) -> f64 {
        1e12 / self.frequency
    }

    /// AFC rephasing time (ps).
    pub fn total_time(&self) -> f64 {
        self.mode_number as f64 * self.mode_bin()
    }
}
