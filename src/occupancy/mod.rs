//! Distance-to-occupancy classification.
//!
//! A reading is usable only when it is flagged valid and lies in
//! `(0, max_range_cm]`; anything else classifies as `Unknown` so a faulty
//! sensor can never make a bay look free.

use crate::registry::Occupancy;
use crate::sensor::DistanceSample;

pub mod sampler;

pub use sampler::{Debouncer, OccupancySampler};

#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyConfig {
    /// Distance (cm) at or below which a bay counts as occupied.
    pub occupied_threshold_cm: f32,
    /// Longest distance the sensor reports reliably.
    pub max_range_cm: f32,
    /// Consecutive agreeing polls required before a verdict is committed.
    pub debounce_samples: u8,
    /// Raw readings taken per poll and reduced by median.
    pub samples_per_poll: u8,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            occupied_threshold_cm: 20.0,
            max_range_cm: 400.0,
            debounce_samples: 3,
            samples_per_poll: 1,
        }
    }
}

impl OccupancyConfig {
    pub fn is_valid(&self, sample: DistanceSample) -> bool {
        sample.valid
            && sample.centimeters.is_finite()
            && sample.centimeters > 0.0
            && sample.centimeters <= self.max_range_cm
    }

    pub fn classify_distance(&self, centimeters: f32) -> Occupancy {
        if centimeters <= self.occupied_threshold_cm {
            Occupancy::Occupied
        } else {
            Occupancy::Free
        }
    }

    pub fn classify(&self, sample: DistanceSample) -> Occupancy {
        if !self.is_valid(sample) {
            return Occupancy::Unknown;
        }
        self.classify_distance(sample.centimeters)
    }
}

/// Median of the valid samples, or `None` when none are valid.
pub fn median_distance(config: &OccupancyConfig, samples: &[DistanceSample]) -> Option<f32> {
    let mut valid: Vec<f32> = samples
        .iter()
        .filter(|sample| config.is_valid(**sample))
        .map(|sample| sample.centimeters)
        .collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(|a, b| a.total_cmp(b));
    Some(valid[valid.len() / 2])
}
