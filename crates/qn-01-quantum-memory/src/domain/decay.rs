//! Coherence-time sampling.
//!
//! A memory draws the lifetime of every freshly written state from its
//! sampler. The truncated-normal variant models batch-to-batch spread in
//! physical coherence; the window is skewed right, from 5% to 20x the mean.

use rand::RngCore;
use rand_distr::{Distribution, Normal};

/// Lower truncation bound as a fraction of the mean.
const LOWER_FRACTION: f64 = 0.05;
/// Upper truncation bound as a multiple of the mean.
const UPPER_FACTOR: f64 = 20.0;
/// Rejection attempts before falling back to clamping.
const MAX_ATTEMPTS: usize = 1024;

/// Strategy producing a coherence period in seconds.
#[derive(Clone, Debug)]
pub enum DecaySampler {
    Fixed {
        coherence_time: f64,
    },
    TruncatedNormal {
        coherence_time: f64,
        stdev: f64,
        normal: Normal<f64>,
    },
}

impl DecaySampler {
    /// Random only when both `stdev` and `coherence_time` are positive.
    pub fn new(coherence_time: f64, stdev: f64) -> Self {
        if stdev > 0.0 && coherence_time > 0.0 {
            if let Ok(normal) = Normal::new(coherence_time, stdev) {
                return Self::TruncatedNormal {
                    coherence_time,
                    stdev,
                    normal,
                };
            }
        }
        Self::Fixed { coherence_time }
    }

    pub fn is_random(&self) -> bool {
        matches!(self, Self::TruncatedNormal { .. })
    }

    /// Mean coherence time (s).
    pub fn coherence_time(&self) -> f64 {
        match *self {
            Self::Fixed { coherence_time } | Self::TruncatedNormal { coherence_time, .. } => {
                coherence_time
            }
        }
    }

    pub fn stdev(&self) -> f64 {
        match *self {
            Self::Fixed { .. } => 0.0,
            Self::TruncatedNormal { stdev, .. } => stdev,
        }
    }

    /// Draw one coherence period (s).
    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        match self {
            Self::Fixed { coherence_time } => *coherence_time,
            Self::TruncatedNormal {
                coherence_time,
                normal,
                ..
            } => {
                let lower = LOWER_FRACTION * coherence_time;
                let upper = UPPER_FACTOR * coherence_time;
                let mut draw = *coherence_time;
                for _ in 0..MAX_ATTEMPTS {
                    draw = normal.sample(rng);
                    if (lower..=upper).contains(&draw) {
                        return draw;
                    }
                }
                draw.clamp(lower, upper)
            }
        }
    }
}
