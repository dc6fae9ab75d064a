use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub mod timer;

use timer::TimerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occupancy {
    Free,
    Occupied,
    Unknown,
}

impl Occupancy {
    pub fn as_str(self) -> &'static str {
        match self {
            Occupancy::Free => "FREE",
            Occupancy::Occupied => "OCCUPIED",
            Occupancy::Unknown => "UNKNOWN",
        }
    }
}

/// Validated bay index. Only a [`BayRegistry`] hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BayIndex(usize);

impl BayIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BayIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the current occupancy episode began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeOrigin {
    /// Waved in by an entry session; only an exit session ends it.
    Session,
    /// Found occupied by the sampler with no session involved.
    Sensed,
}

#[derive(Debug, Clone)]
pub struct Bay {
    index: BayIndex,
    occupancy: Occupancy,
    angle: i32,
    origin: Option<EpisodeOrigin>,
    timer: TimerRecord,
}

impl Bay {
    pub fn index(&self) -> BayIndex {
        self.index
    }

    pub fn occupancy(&self) -> Occupancy {
        self.occupancy
    }

    pub fn angle(&self) -> i32 {
        self.angle
    }

    pub fn origin(&self) -> Option<EpisodeOrigin> {
        self.origin
    }

    pub fn timer(&self) -> &TimerRecord {
        &self.timer
    }
}

#[derive(Debug, Clone)]
pub struct BayRegistry {
    bays: Vec<Bay>,
}

impl BayRegistry {
    /// Build the registry from the platform angle of each bay.
    pub fn new(angles: &[i32]) -> Result<Self, AppError> {
        if angles.is_empty() {
            return Err(AppError::InvalidConfig("at least one bay is required".into()));
        }
        let mut seen = HashSet::with_capacity(angles.len());
        if let Some(dup) = angles.iter().find(|angle| !seen.insert(**angle)) {
            return Err(AppError::InvalidConfig(format!(
                "platform angle {dup} assigned to more than one bay"
            )));
        }

        let bays = angles
            .iter()
            .enumerate()
            .map(|(index, angle)| Bay {
                index: BayIndex(index),
                occupancy: Occupancy::Unknown,
                angle: *angle,
                origin: None,
                timer: TimerRecord::new(),
            })
            .collect();
        Ok(Self { bays })
    }

    pub fn len(&self) -> usize {
        self.bays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bays.is_empty()
    }

    pub fn bay_index(&self, raw: usize) -> Option<BayIndex> {
        (raw < self.bays.len()).then_some(BayIndex(raw))
    }

    pub fn indices(&self) -> impl Iterator<Item = BayIndex> + '_ {
        self.bays.iter().map(|bay| bay.index)
    }

    pub fn bays(&self) -> &[Bay] {
        &self.bays
    }

    pub fn bay(&self, index: BayIndex) -> Option<&Bay> {
        self.bays.get(index.0)
    }

    pub fn occupancy(&self, index: BayIndex) -> Option<Occupancy> {
        self.bay(index).map(Bay::occupancy)
    }

    pub fn angle(&self, index: BayIndex) -> Option<i32> {
        self.bay(index).map(Bay::angle)
    }

    pub fn free_count(&self) -> usize {
        self.bays
            .iter()
            .filter(|bay| bay.occupancy == Occupancy::Free)
            .count()
    }

    /// Mark the bay occupied and start its timer. Silently ignores an index
    /// that does not belong to this registry.
    pub fn occupy(&mut self, index: BayIndex, origin: EpisodeOrigin, now_ms: u64) {
        let Some(bay) = self.bays.get_mut(index.0) else {
            debug!(bay = index.0, "occupy ignored for unknown bay");
            return;
        };
        if bay.origin.is_none() {
            bay.origin = Some(origin);
        }
        bay.occupancy = Occupancy::Occupied;
        bay.timer.start(now_ms);
    }

    /// Mark the bay free, stop its timer and return the episode's duration in
    /// whole seconds.
    pub fn release(&mut self, index: BayIndex, now_ms: u64) -> u64 {
        let Some(bay) = self.bays.get_mut(index.0) else {
            debug!(bay = index.0, "release ignored for unknown bay");
            return 0;
        };
        bay.occupancy = Occupancy::Free;
        bay.origin = None;
        bay.timer.stop(now_ms);
        bay.timer.elapsed_secs(now_ms)
    }

    /// Record a sensor-derived Free/Unknown verdict for a bay that has no
    /// active occupancy episode. Bays with a running episode are left alone.
    pub fn set_sensed(&mut self, index: BayIndex, occupancy: Occupancy) {
        let Some(bay) = self.bays.get_mut(index.0) else {
            return;
        };
        if bay.origin.is_some() || occupancy == Occupancy::Occupied {
            return;
        }
        bay.occupancy = occupancy;
    }

    pub fn first_free(&self) -> Option<BayIndex> {
        self.bays
            .iter()
            .find(|bay| bay.occupancy == Occupancy::Free)
            .map(|bay| bay.index)
    }

    /// Live elapsed seconds while running, otherwise the last recorded
    /// duration. Zero for an index outside the registry.
    pub fn duration_seconds(&self, raw: usize, now_ms: u64) -> u64 {
        self.bays
            .get(raw)
            .map(|bay| bay.timer.elapsed_secs(now_ms))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(states: &[Occupancy]) -> BayRegistry {
        let angles: Vec<i32> = (0..states.len() as i32).map(|i| 30 + i * 60).collect();
        let mut registry = BayRegistry::new(&angles).expect("valid angles");
        for (raw, state) in states.iter().enumerate() {
            let index = registry.bay_index(raw).expect("index in range");
            match state {
                Occupancy::Occupied => registry.occupy(index, EpisodeOrigin::Session, 0),
                other => registry.set_sensed(index, *other),
            }
        }
        registry
    }

    #[test]
    fn new_registry_starts_unknown() -> Result<(), AppError> {
        let registry = BayRegistry::new(&[30, 90, 150])?;

        assert_eq!(registry.len(), 3);
        assert!(registry.bays().iter().all(|bay| bay.occupancy() == Occupancy::Unknown));
        assert_eq!(registry.first_free(), None);
        Ok(())
    }

    #[test]
    fn duplicate_angles_are_rejected() {
        let result = BayRegistry::new(&[30, 90, 30]);

        assert!(matches!(result, Err(AppError::InvalidConfig(_))));
    }

    #[test]
    fn bay_index_is_bounds_checked() -> Result<(), AppError> {
        let registry = BayRegistry::new(&[30, 90])?;

        assert!(registry.bay_index(1).is_some());
        assert!(registry.bay_index(2).is_none());
        Ok(())
    }

    #[test]
    fn first_free_returns_lowest_free_index() {
        let registry = registry_with(&[Occupancy::Occupied, Occupancy::Free, Occupancy::Free]);

        assert_eq!(registry.first_free().map(BayIndex::get), Some(1));
        assert_eq!(registry.free_count(), 2);
    }

    #[test]
    fn occupy_then_release_reports_floored_seconds() -> Result<(), AppError> {
        let mut registry = BayRegistry::new(&[30, 90, 150])?;
        let bay = registry.bay_index(2).ok_or(AppError::InvalidBay(2))?;

        registry.occupy(bay, EpisodeOrigin::Session, 10_000);
        assert_eq!(registry.duration_seconds(2, 12_500), 2);

        let elapsed = registry.release(bay, 17_999);

        assert_eq!(elapsed, 7);
        assert_eq!(registry.occupancy(bay), Some(Occupancy::Free));
        assert_eq!(registry.duration_seconds(2, 60_000), 7);
        Ok(())
    }

    #[test]
    fn second_occupy_keeps_first_start() -> Result<(), AppError> {
        let mut registry = BayRegistry::new(&[30])?;
        let bay = registry.bay_index(0).ok_or(AppError::InvalidBay(0))?;

        registry.occupy(bay, EpisodeOrigin::Session, 1_000);
        registry.occupy(bay, EpisodeOrigin::Sensed, 5_000);

        let record = registry.bay(bay).map(|b| *b.timer());
        assert_eq!(record.map(|t| t.start_ms()), Some(1_000));
        assert_eq!(
            registry.bay(bay).and_then(Bay::origin),
            Some(EpisodeOrigin::Session)
        );
        Ok(())
    }

    #[test]
    fn sensed_verdicts_do_not_touch_active_episodes() -> Result<(), AppError> {
        let mut registry = BayRegistry::new(&[30])?;
        let bay = registry.bay_index(0).ok_or(AppError::InvalidBay(0))?;
        registry.occupy(bay, EpisodeOrigin::Session, 0);

        registry.set_sensed(bay, Occupancy::Free);
        registry.set_sensed(bay, Occupancy::Unknown);

        assert_eq!(registry.occupancy(bay), Some(Occupancy::Occupied));
        Ok(())
    }

    #[test]
    fn duration_for_unknown_index_is_zero() -> Result<(), AppError> {
        let registry = BayRegistry::new(&[30])?;

        assert_eq!(registry.duration_seconds(9, 1_000), 0);
        Ok(())
    }

    #[test]
    fn foreign_index_is_ignored() -> Result<(), AppError> {
        let big = BayRegistry::new(&[10, 20, 30, 40])?;
        let foreign = big.bay_index(3).ok_or(AppError::InvalidBay(3))?;
        let mut small = BayRegistry::new(&[10])?;

        small.occupy(foreign, EpisodeOrigin::Session, 0);

        assert_eq!(small.release(foreign, 1_000), 0);
        assert_eq!(small.free_count(), 0);
        Ok(())
    }
}
