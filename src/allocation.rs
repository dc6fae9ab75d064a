//! Bay allocation policies.
//!
//! A policy only reads the registry. The sequencer asks it for a bay when a
//! vehicle arrives and treats `None` as "lot full".

use crate::error::AppError;
use crate::registry::{BayIndex, BayRegistry, Occupancy};

pub trait AllocationPolicy: Send + std::fmt::Debug {
    fn choose_bay(&mut self, registry: &BayRegistry) -> Option<BayIndex>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    FirstFree,
    RoundRobin,
}

impl PolicyKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "first_free" => Some(Self::FirstFree),
            "round_robin" => Some(Self::RoundRobin),
            _ => None,
        }
    }

    pub fn build(self) -> Box<dyn AllocationPolicy> {
        match self {
            PolicyKind::FirstFree => Box::new(FirstFree),
            PolicyKind::RoundRobin => Box::new(RoundRobin::default()),
        }
    }
}

/// Lowest free index wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFree;

impl AllocationPolicy for FirstFree {
    fn choose_bay(&mut self, registry: &BayRegistry) -> Option<BayIndex> {
        registry.first_free()
    }

    fn name(&self) -> &'static str {
        "first_free"
    }
}

/// Rotates through bays, starting the search after the last bay handed out.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    next: usize,
}

impl AllocationPolicy for RoundRobin {
    fn choose_bay(&mut self, registry: &BayRegistry) -> Option<BayIndex> {
        let count = registry.len();
        let chosen = (0..count)
            .map(|offset| (self.next + offset) % count)
            .filter_map(|raw| registry.bay_index(raw))
            .find(|index| registry.occupancy(*index) == Some(Occupancy::Free))?;
        self.next = (chosen.get() + 1) % count;
        Some(chosen)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Ask the policy for a bay, mapping "nothing free" to the allocation error.
pub fn allocate(
    policy: &mut dyn AllocationPolicy,
    registry: &BayRegistry,
) -> Result<BayIndex, AppError> {
    policy
        .choose_bay(registry)
        .ok_or(AppError::AllocationExhausted)
}
