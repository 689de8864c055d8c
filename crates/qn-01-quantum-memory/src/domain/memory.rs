//! Single-atom quantum memory.
//!
//! The quantum state lives in the register under the memory's key; this type
//! only tracks the classical bookkeeping around it (fidelity, entanglement
//! partner, excitation rate limit, pending expiration).

use std::sync::{Arc, OnceLock};

use quantum_telemetry::memory_span;
use shared_types::{
    seconds_to_picoseconds, zero_ket, Amplitude, Circuit, Photon, PhotonEncoding, Picoseconds,
    QstateKey, QuantumRegister,
};
use tracing::{debug, trace};

use crate::domain::{
    DecaySampler, EntanglementPeer, ExpirationSlot, MemoryConfig, MemoryParam, ObserverSet,
};
use crate::error::MemoryError;
use crate::ports::{EventAction, MemoryObserver, PhotonReceiver, QuantumMemory, SimContext};

/// One-qubit circuit measuring qubit 0.
fn measurement_circuit() -> &'static Circuit {
    static CIRCUIT: OnceLock<Circuit> = OnceLock::new();
    CIRCUIT.get_or_init(|| {
        let mut circuit = Circuit::new(1);
        circuit.measure(0);
        circuit
    })
}

/// Individual single-atom memory.
pub struct Memory {
    name: String,
    memory_array: Option<String>,

    raw_fidelity: f64,
    frequency: f64,
    efficiency: f64,
    coherence_time: f64,
    coherence_time_stdev: f64,
    wavelength: f64,
    decay: DecaySampler,

    fidelity: f64,
    qstate_key: QstateKey,
    encoding: PhotonEncoding,
    /// Detector index of the last BSM result.
    previous_bsm: Option<u8>,
    entangled_memory: Option<EntanglementPeer>,
    expiration: ExpirationSlot,
    excited_photon: Option<Photon>,
    next_excite_time: Picoseconds,

    observers: ObserverSet,
    receivers: Vec<Arc<dyn PhotonReceiver>>,
}

impl Memory {
    /// Validate `config` and allocate the memory's register key.
    pub fn new(
        name: impl Into<String>,
        config: &MemoryConfig,
        register: &mut dyn QuantumRegister,
    ) -> Result<Self, MemoryError> {
        let name = name.into();
        config.validate(&name)?;
        let qstate_key = register
            .new_state(None)
            .map_err(MemoryError::register(&name))?;

        debug!(memory = %name, key = qstate_key, "memory created");

        Ok(Self {
            encoding: PhotonEncoding::SingleAtom {
                memory: name.clone(),
            },
            name,
            memory_array: None,
            raw_fidelity: config.fidelity,
            frequency: config.frequency,
            efficiency: config.efficiency,
            coherence_time: config.coherence_time,
            coherence_time_stdev: config.coherence_time_stdev,
            wavelength: config.wavelength,
            decay: config.decay_sampler(),
            fidelity: 0.0,
            qstate_key,
            previous_bsm: None,
            entangled_memory: None,
            expiration: ExpirationSlot::new(),
            excited_photon: None,
            next_excite_time: 0,
            observers: ObserverSet::new(),
            receivers: Vec::new(),
        })
    }

    /// Memory whose coherence period is drawn per write from a truncated
    /// normal around `config.coherence_time`.
    pub fn with_random_coherence_time(
        name: impl Into<String>,
        config: &MemoryConfig,
        coherence_time_stdev: f64,
        register: &mut dyn QuantumRegister,
    ) -> Result<Self, MemoryError> {
        let config = config
            .clone()
            .with_coherence_time_stdev(coherence_time_stdev);
        Self::new(name, &config, register)
    }

    // =========================================================================
    // PHOTON EMISSION
    // =========================================================================

    /// Excite the memory and possibly emit a photon toward `destination`.
    ///
    /// Does nothing before `next_excite_time`. The photon is null when the
    /// measured state is |0>; null photons are always forwarded, real ones
    /// only with probability `efficiency`.
    pub fn excite(
        &mut self,
        destination: &str,
        ctx: &mut SimContext<'_>,
    ) -> Result<Option<Photon>, MemoryError> {
        let now = ctx.now();
        if now < self.next_excite_time {
            trace!(memory = %self.name, now, next = self.next_excite_time, "excite ignored");
            return Ok(None);
        }

        let receiver = self
            .receivers
            .first()
            .cloned()
            .ok_or_else(|| MemoryError::NoReceiver {
                memory: self.name.clone(),
            })?;

        let outcome = ctx
            .register
            .run_circuit(measurement_circuit(), &[self.qstate_key])
            .map_err(MemoryError::register(&self.name))?
            .get(&self.qstate_key)
            .copied()
            .ok_or_else(|| MemoryError::MissingMeasurement {
                memory: self.name.clone(),
                key: self.qstate_key,
            })?;

        let photon = Photon::with_location(
            self.name.as_str(),
            self.wavelength,
            self.name.as_str(),
            self.encoding.clone(),
        );
        if outcome == 0 {
            photon.set_null();
        }

        if self.frequency > 0.0 {
            self.next_excite_time = now + seconds_to_picoseconds(1.0 / self.frequency);
        }

        if outcome == 0 || ctx.uniform() < self.efficiency {
            receiver.get(photon.clone(), destination);
            self.excited_photon = Some(photon.clone());
            return Ok(Some(photon));
        }

        Ok(None)
    }

    // =========================================================================
    // STATE LIFECYCLE
    // =========================================================================

    /// Null any in-flight photon, reset and notify observers.
    pub fn expire(&mut self, ctx: &mut SimContext<'_>) -> Result<(), MemoryError> {
        let _span = memory_span!("expire", memory = %self.name).entered();
        if let Some(photon) = self.excited_photon.take() {
            photon.set_null();
        }

        self.reset(ctx)?;
        debug!(memory = %self.name, observers = self.observers.len(), "memory expired");
        self.observers.notify(&*self);
        Ok(())
    }

    /// Return to |0> with no entanglement and no pending expiration.
    pub fn reset(&mut self, ctx: &mut SimContext<'_>) -> Result<(), MemoryError> {
        self.fidelity = 0.0;
        ctx.register
            .set(&[self.qstate_key], &zero_ket())
            .map_err(MemoryError::register(&self.name))?;
        self.entangled_memory = None;
        self.expiration.cancel(ctx.timeline);
        Ok(())
    }

    /// Overwrite the stored state with an arbitrary pure state.
    ///
    /// Clears the last BSM result and the entanglement partner, and
    /// (re)schedules expiration when the memory has a finite coherence time.
    pub fn update_state(
        &mut self,
        state: &[Amplitude],
        ctx: &mut SimContext<'_>,
    ) -> Result<(), MemoryError> {
        ctx.register
            .set(&[self.qstate_key], state)
            .map_err(MemoryError::register(&self.name))?;
        self.previous_bsm = None;
        self.entangled_memory = None;

        if self.coherence_time > 0.0 {
            self.schedule_expiration(ctx);
        }
        Ok(())
    }

    // =========================================================================
    // EXPIRATION
    // =========================================================================

    /// Replace the pending expiration with one a sampled coherence period
    /// from now.
    pub fn schedule_expiration(&mut self, ctx: &mut SimContext<'_>) {
        let period = self.decay.sample(ctx.rng);
        let time = ctx.now() + seconds_to_picoseconds(period);
        self.expiration.schedule(ctx.timeline, &self.name, time);
    }

    /// Align expiration with an entangled partner. `time` is clamped to now.
    pub fn update_expire_time(&mut self, time: Picoseconds, ctx: &mut SimContext<'_>) {
        self.expiration.update(ctx.timeline, &self.name, time);
    }

    pub fn get_expire_time(&self) -> Option<Picoseconds> {
        self.expiration.expire_time()
    }

    /// Expiration time in picoseconds, `f64::INFINITY` if none is pending.
    pub fn expire_time_or_inf(&self) -> f64 {
        self.get_expire_time().map_or(f64::INFINITY, |t| t as f64)
    }

    /// Route a fired event. Returns false if the event is not for this memory.
    pub fn handle_event(
        &mut self,
        action: &EventAction,
        ctx: &mut SimContext<'_>,
    ) -> Result<bool, MemoryError> {
        match action {
            EventAction::Expire { memory } if *memory == self.name => {
                self.expiration.fired();
                self.expire(ctx)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // =========================================================================
    // WIRING
    // =========================================================================

    pub fn attach(&mut self, observer: Arc<dyn MemoryObserver>) {
        self.observers.attach(observer);
    }

    pub fn detach(&mut self, observer: &Arc<dyn MemoryObserver>) {
        self.observers.detach(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn add_receiver(&mut self, receiver: Arc<dyn PhotonReceiver>) {
        self.receivers.push(receiver);
    }

    pub fn set_memory_array(&mut self, array: impl Into<String>) {
        self.memory_array = Some(array.into());
    }

    pub fn memory_array(&self) -> Option<&str> {
        self.memory_array.as_deref()
    }

    /// Apply one typed parameter override.
    pub fn update_param(&mut self, param: MemoryParam) -> Result<(), MemoryError> {
        param.validate(&self.name)?;
        match param {
            MemoryParam::RawFidelity(v) => self.raw_fidelity = v,
            MemoryParam::Frequency(v) => self.frequency = v,
            MemoryParam::Efficiency(v) => self.efficiency = v,
            MemoryParam::Wavelength(v) => self.wavelength = v,
            MemoryParam::CoherenceTime(v) => {
                self.coherence_time = v;
                self.decay = DecaySampler::new(v, self.coherence_time_stdev);
            }
            MemoryParam::CoherenceTimeStdev(v) => {
                self.coherence_time_stdev = v;
                self.decay = DecaySampler::new(self.coherence_time, v);
            }
        }
        Ok(())
    }

    // =========================================================================
    // PROTOCOL WRITE PATHS
    // =========================================================================

    pub fn set_fidelity(&mut self, fidelity: f64) {
        self.fidelity = fidelity;
    }

    pub fn set_entangled(&mut self, peer: Option<EntanglementPeer>) {
        self.entangled_memory = peer;
    }

    pub fn set_previous_bsm(&mut self, detector: Option<u8>) {
        self.previous_bsm = detector;
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fidelity(&self) -> f64 {
        self.fidelity
    }

    pub fn raw_fidelity(&self) -> f64 {
        self.raw_fidelity
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn coherence_time(&self) -> f64 {
        self.coherence_time
    }

    pub fn coherence_time_stdev(&self) -> f64 {
        self.coherence_time_stdev
    }

    /// True when expiration times are sampled rather than fixed.
    pub fn random_coherence_time(&self) -> bool {
        self.decay.is_random()
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn qstate_key(&self) -> QstateKey {
        self.qstate_key
    }

    pub fn encoding(&self) -> &PhotonEncoding {
        &self.encoding
    }

    pub fn entangled_memory(&self) -> Option<&EntanglementPeer> {
        self.entangled_memory.as_ref()
    }

    pub fn previous_bsm(&self) -> Option<u8> {
        self.previous_bsm
    }

    pub fn next_excite_time(&self) -> Picoseconds {
        self.next_excite_time
    }

    pub fn excited_photon(&self) -> Option<&Photon> {
        self.excited_photon.as_ref()
    }
}

impl QuantumMemory for Memory {
    fn name(&self) -> &str {
        &self.name
    }

    fn fidelity(&self) -> f64 {
        self.fidelity
    }

    fn raw_fidelity(&self) -> f64 {
        self.raw_fidelity
    }

    fn entangled_memory(&self) -> Option<&EntanglementPeer> {
        self.entangled_memory.as_ref()
    }

    fn qstate_key(&self) -> Option<QstateKey> {
        Some(self.qstate_key)
    }

    fn expire_time(&self) -> Option<Picoseconds> {
        self.expiration.expire_time()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("name", &self.name)
            .field("qstate_key", &self.qstate_key)
            .field("fidelity", &self.fidelity)
            .field("entangled_memory", &self.entangled_memory)
            .field("expire_time", &self.expiration.expire_time())
            .finish_non_exhaustive()
    }
}
