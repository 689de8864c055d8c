//! Atomic-ensemble absorptive memory (AFC and AFC-spinwave).
//!
//! Photons are stored in temporal modes of width `mode_bin` counted from the
//! first absorption. A plain AFC re-emits everything deterministically one
//! rephasing time (`total_time`) after the first absorption; a spinwave
//! memory waits for an explicit `retrieve`, optionally in reversed order.
//!
//! The comb must be prepared (which takes `prepare_time`) before any photon
//! operation. Retrieval and expiration both drain the whole ensemble.

use std::sync::Arc;

use quantum_telemetry::memory_span;
use shared_types::{seconds_to_picoseconds, Photon, Picoseconds, QstateKey};
use tracing::{debug, trace, warn};

use crate::domain::{AbsorptiveMemoryConfig, EntanglementPeer, ExpirationSlot, ObserverSet};
use crate::error::MemoryError;
use crate::ports::{
    EventAction, EventId, MemoryObserver, PhotonReceiver, QuantumMemory, SimContext,
};

/// Occupant of one temporal mode.
#[derive(Clone, Debug)]
pub struct StoredPhoton {
    pub photon: Photon,
    /// Offset from the first absorption (ps).
    pub absorb_time: f64,
    /// Photons that landed in this mode.
    pub multiplicity: u32,
    /// Set once a second photon overlaps the mode.
    pub degraded: bool,
}

/// Outcome of offering a photon to the memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Absorption {
    /// Off-resonance or lost to absorption inefficiency.
    NotAbsorbed,
    /// Absorbed outside the comb's temporal window.
    OutOfWindow,
    /// First photon in mode `index`.
    Stored { index: usize },
    /// Joined an occupied mode.
    Overlapped { index: usize, multiplicity: u32 },
}

/// A re-emission scheduled by `retrieve`.
#[derive(Clone, Debug)]
pub struct Emission {
    pub photon: Photon,
    pub destination: String,
    /// Delay after the retrieval (ps).
    pub emit_time: f64,
    pub delivery_time: Picoseconds,
    pub event: EventId,
}

/// AFC(-spinwave) ensemble memory.
pub struct AbsorptiveMemory {
    name: String,
    memory_array: Option<String>,
    config: AbsorptiveMemoryConfig,
    mode_bin: f64,
    total_time: f64,

    fidelity: f64,
    is_prepared: bool,
    photon_counter: u64,
    absorb_start_time: Picoseconds,
    stored_photons: Vec<Option<StoredPhoton>>,
    excited_photons: Vec<Photon>,
    previous_bsm: Option<u8>,
    entangled_memory: Option<EntanglementPeer>,
    expiration: ExpirationSlot,
    /// Automatic rephasing retrieval of a plain AFC.
    retrieve_event: Option<EventId>,

    observers: ObserverSet,
    receivers: Vec<Arc<dyn PhotonReceiver>>,
}

impl AbsorptiveMemory {
    pub fn new(
        name: impl Into<String>,
        config: AbsorptiveMemoryConfig,
    ) -> Result<Self, MemoryError> {
        let name = name.into();
        config.validate(&name)?;

        debug!(
            memory = %name,
            modes = config.mode_number,
            spinwave = config.is_spinwave,
            "absorptive memory created"
        );

        Ok(Self {
            mode_bin: config.mode_bin(),
            total_time: config.total_time(),
            stored_photons: vec![None; config.mode_number],
            config,
            name,
            memory_array: None,
            fidelity: 0.0,
            is_prepared: false,
            photon_counter: 0,
            absorb_start_time: 0,
            excited_photons: Vec::new(),
            previous_bsm: None,
            entangled_memory: None,
            expiration: ExpirationSlot::new(),
            retrieve_event: None,
            observers: ObserverSet::new(),
            receivers: Vec::new(),
        })
    }

    // =========================================================================
    // PREPARATION
    // =========================================================================

    /// Start preparing the comb; it becomes usable after `prepare_time`.
    pub fn prepare(&mut self, ctx: &mut SimContext<'_>) -> EventId {
        let time = ctx.now() + self.config.prepare_time;
        trace!(memory = %self.name, time, "AFC preparation scheduled");
        ctx.timeline.schedule(
            time,
            EventAction::PrepareAfc {
                memory: self.name.clone(),
            },
        )
    }

    /// Completion of `prepare`. Fails if the comb is already prepared.
    pub fn prepare_afc(&mut self, ctx: &mut SimContext<'_>) -> Result<(), MemoryError> {
        if self.is_prepared {
            return Err(MemoryError::AlreadyPrepared {
                memory: self.name.clone(),
            });
        }

        self.is_prepared = true;
        debug!(memory = %self.name, now = ctx.now(), "AFC prepared");

        if self.config.afc_lifetime > 0.0 {
            self.schedule_expiration(ctx);
        }
        Ok(())
    }

    // =========================================================================
    // ABSORPTION / RE-EMISSION
    // =========================================================================

    /// Offer a photon to the memory.
    pub fn get(
        &mut self,
        photon: Photon,
        ctx: &mut SimContext<'_>,
    ) -> Result<Absorption, MemoryError> {
        self.require_prepared("get")?;

        #[allow(clippy::float_cmp)]
        let resonant = photon.wavelength() == self.config.wavelength;
        if !resonant || ctx.uniform() >= self.config.absorption_efficiency {
            return Ok(Absorption::NotAbsorbed);
        }

        let now = ctx.now();
        self.photon_counter += 1;

        if self.photon_counter == 1 {
            self.absorb_start_time = now;
            if !self.config.is_spinwave {
                let time = now + self.total_time.round() as Picoseconds;
                let id = ctx.timeline.schedule(
                    time,
                    EventAction::Retrieve {
                        memory: self.name.clone(),
                        destination: String::new(),
                    },
                );
                self.retrieve_event = Some(id);
            }
        }

        let absorb_time = now.saturating_sub(self.absorb_start_time) as f64;
        let index = (absorb_time / self.mode_bin).floor() as usize;
        let Some(slot) = self.stored_photons.get_mut(index) else {
            trace!(memory = %self.name, index, "photon outside AFC window");
            return Ok(Absorption::OutOfWindow);
        };

        // One photon object per mode; later arrivals only degrade it.
        if let Some(stored) = slot.as_mut() {
            stored.multiplicity += 1;
            stored.degraded = true;
            return Ok(Absorption::Overlapped {
                index,
                multiplicity: stored.multiplicity,
            });
        }

        *slot = Some(StoredPhoton {
            photon: photon.clone(),
            absorb_time,
            multiplicity: 1,
            degraded: false,
        });
        self.excited_photons.push(photon);
        Ok(Absorption::Stored { index })
    }

    /// Delay between retrieval and re-emission for a photon absorbed at
    /// offset `absorb_time`.
    pub fn emission_offset(&self, absorb_time: f64) -> Result<f64, MemoryError> {
        if !self.config.is_reversed {
            return Ok(absorb_time);
        }
        if !self.config.is_spinwave {
            return Err(MemoryError::ReversedEmissionUnsupported {
                memory: self.name.clone(),
            });
        }
        Ok(self.total_time - self.mode_bin - absorb_time)
    }

    /// Re-emit every stored photon toward the receiver.
    ///
    /// Each occupied mode survives with probability `efficiency(store_time)`.
    /// Storage is cleared afterwards whatever the draws.
    pub fn retrieve(
        &mut self,
        destination: &str,
        ctx: &mut SimContext<'_>,
    ) -> Result<Vec<Emission>, MemoryError> {
        let _span = memory_span!("retrieve", memory = %self.name).entered();
        self.require_prepared("retrieve")?;
        if self.excited_photons.is_empty() {
            return Ok(Vec::new());
        }
        if self.config.is_reversed && !self.config.is_spinwave {
            return Err(MemoryError::ReversedEmissionUnsupported {
                memory: self.name.clone(),
            });
        }
        let receiver = self
            .receivers
            .first()
            .cloned()
            .ok_or_else(|| MemoryError::NoReceiver {
                memory: self.name.clone(),
            })?;

        let now = ctx.now();
        let store_time = now as f64 - self.absorb_start_time as f64 - self.total_time;
        let probability = self.config.efficiency.at(store_time);
        let destination = self
            .config
            .destination
            .clone()
            .unwrap_or_else(|| destination.to_string());

        let mut emissions = Vec::new();
        for stored in self.stored_photons.iter().flatten() {
            if ctx.uniform() >= probability {
                continue;
            }
            let emit_time = self.emission_offset(stored.absorb_time)?;
            let delivery_time = now + emit_time.max(0.0).round() as Picoseconds;
            let event = ctx.timeline.schedule(
                delivery_time,
                EventAction::DeliverPhoton {
                    receiver: Arc::clone(&receiver),
                    photon: stored.photon.clone(),
                    destination: destination.clone(),
                },
            );
            emissions.push(Emission {
                photon: stored.photon.clone(),
                destination: destination.clone(),
                emit_time,
                delivery_time,
                event,
            });
        }

        debug!(
            memory = %self.name,
            stored = self.excited_photons.len(),
            emitted = emissions.len(),
            "AFC retrieval"
        );

        if let Some(id) = self.retrieve_event.take() {
            ctx.timeline.remove_event(id);
        }
        self.clear_storage();
        Ok(emissions)
    }

    // =========================================================================
    // STATE LIFECYCLE
    // =========================================================================

    /// Null every stored photon, reset and notify observers.
    pub fn expire(&mut self, ctx: &mut SimContext<'_>) -> Result<(), MemoryError> {
        let _span = memory_span!("expire", memory = %self.name).entered();
        self.require_prepared("expire")?;

        for photon in &self.excited_photons {
            photon.set_null();
        }

        self.reset(ctx);
        debug!(memory = %self.name, observers = self.observers.len(), "AFC expired");
        self.observers.notify(&*self);
        Ok(())
    }

    /// Drop all storage and return to the unprepared state.
    pub fn reset(&mut self, ctx: &mut SimContext<'_>) {
        self.clear_storage();
        self.is_prepared = false;
        if let Some(id) = self.retrieve_event.take() {
            ctx.timeline.remove_event(id);
        }
        self.expiration.cancel(ctx.timeline);
    }

    fn clear_storage(&mut self) {
        self.fidelity = 0.0;
        self.entangled_memory = None;
        self.photon_counter = 0;
        self.absorb_start_time = 0;
        self.excited_photons.clear();
        self.stored_photons.iter_mut().for_each(|slot| *slot = None);
    }

    fn require_prepared(&self, operation: &'static str) -> Result<(), MemoryError> {
        if self.is_prepared {
            Ok(())
        } else {
            warn!(memory = %self.name, operation, "AFC used before preparation");
            Err(MemoryError::NotPrepared {
                memory: self.name.clone(),
                operation,
            })
        }
    }

    // =========================================================================
    // EXPIRATION
    // =========================================================================

    pub fn schedule_expiration(&mut self, ctx: &mut SimContext<'_>) {
        let time = ctx.now() + seconds_to_picoseconds(self.config.afc_lifetime);
        self.expiration.schedule(ctx.timeline, &self.name, time);
    }

    pub fn update_expire_time(&mut self, time: Picoseconds, ctx: &mut SimContext<'_>) {
        self.expiration.update(ctx.timeline, &self.name, time);
    }

    pub fn get_expire_time(&self) -> Option<Picoseconds> {
        self.expiration.expire_time()
    }

    pub fn expire_time_or_inf(&self) -> f64 {
        self.get_expire_time().map_or(f64::INFINITY, |t| t as f64)
    }

    /// Route a fired event. Returns false if the event is not for this memory.
    pub fn handle_event(
        &mut self,
        action: &EventAction,
        ctx: &mut SimContext<'_>,
    ) -> Result<bool, MemoryError> {
        if action.target() != Some(self.name.as_str()) {
            return Ok(false);
        }
        match action {
            EventAction::Expire { .. } => {
                self.expiration.fired();
                self.expire(ctx)?;
            }
            EventAction::PrepareAfc { .. } => self.prepare_afc(ctx)?,
            EventAction::Retrieve { destination, .. } => {
                self.retrieve_event = None;
                self.retrieve(destination, ctx)?;
            }
            EventAction::DeliverPhoton { .. } => return Ok(false),
        }
        Ok(true)
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

    pub fn add_receiver(&mut self, receiver: Arc<dyn PhotonReceiver>) {
        self.receivers.push(receiver);
    }

    pub fn set_memory_array(&mut self, array: impl Into<String>) {
        self.memory_array = Some(array.into());
    }

    pub fn memory_array(&self) -> Option<&str> {
        self.memory_array.as_deref()
    }

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

    pub fn config(&self) -> &AbsorptiveMemoryConfig {
        &self.config
    }

    pub fn is_prepared(&self) -> bool {
        self.is_prepared
    }

    pub fn photon_counter(&self) -> u64 {
        self.photon_counter
    }

    pub fn absorb_start_time(&self) -> Picoseconds {
        self.absorb_start_time
    }

    pub fn mode_bin(&self) -> f64 {
        self.mode_bin
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn stored_photons(&self) -> &[Option<StoredPhoton>] {
        &self.stored_photons
    }

    pub fn excited_photons(&self) -> &[Photon] {
        &self.excited_photons
    }

    pub fn previous_bsm(&self) -> Option<u8> {
        self.previous_bsm
    }
}

impl QuantumMemory for AbsorptiveMemory {
    fn name(&self) -> &str {
        &self.name
    }

    fn fidelity(&self) -> f64 {
        self.fidelity
    }

    fn raw_fidelity(&self) -> f64 {
        self.config.fidelity
    }

    fn entangled_memory(&self) -> Option<&EntanglementPeer> {
        self.entangled_memory.as_ref()
    }

    fn qstate_key(&self) -> Option<QstateKey> {
        None
    }

    fn expire_time(&self) -> Option<Picoseconds> {
        self.expiration.expire_time()
    }
}

impl std::fmt::Debug for AbsorptiveMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbsorptiveMemory")
            .field("name", &self.name)
            .field("is_prepared", &self.is_prepared)
            .field("photon_counter", &self.photon_counter)
            .field("stored", &self.excited_photons.len())
            .finish_non_exhaustive()
    }
}
