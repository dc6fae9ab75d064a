use crate::occupancy::{OccupancyConfig, median_distance};
use crate::registry::{BayIndex, Occupancy};
use crate::sensor::{DistanceSample, DistanceSensor};
use tracing::{debug, warn};

/// Commits a verdict only after `required` consecutive identical raw
/// verdicts. Starts out `Unknown`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    required: u8,
    committed: Occupancy,
    candidate: Option<Occupancy>,
    streak: u8,
}

impl Debouncer {
    pub fn new(required: u8) -> Self {
        Self {
            required: required.max(1),
            committed: Occupancy::Unknown,
            candidate: None,
            streak: 0,
        }
    }

    pub fn committed(&self) -> Occupancy {
        self.committed
    }

    /// Feed one raw verdict. Returns the new verdict when it gets committed.
    pub fn observe(&mut self, raw: Occupancy) -> Option<Occupancy> {
        if raw == self.committed {
            self.candidate = None;
            self.streak = 0;
            return None;
        }

        if self.candidate == Some(raw) {
            self.streak = self.streak.saturating_add(1);
        } else {
            // A differing verdict (including Unknown) discards the streak.
            self.candidate = Some(raw);
            self.streak = 1;
        }

        if self.streak < self.required {
            return None;
        }
        self.committed = raw;
        self.candidate = None;
        self.streak = 0;
        Some(raw)
    }
}

#[derive(Debug, Clone)]
pub struct OccupancySampler {
    config: OccupancyConfig,
    debouncers: Vec<Debouncer>,
}

impl OccupancySampler {
    pub fn new(config: OccupancyConfig, bay_count: usize) -> Self {
        let debouncers = (0..bay_count)
            .map(|_| Debouncer::new(config.debounce_samples))
            .collect();
        Self { config, debouncers }
    }

    pub fn config(&self) -> &OccupancyConfig {
        &self.config
    }

    /// Committed verdict for a bay.
    pub fn verdict(&self, bay: BayIndex) -> Occupancy {
        self.debouncers
            .get(bay.get())
            .map(Debouncer::committed)
            .unwrap_or(Occupancy::Unknown)
    }

    /// Take this poll's readings for a bay and reduce them to a raw verdict.
    pub fn read_raw(&self, bay: BayIndex, sensor: &mut dyn DistanceSensor) -> Occupancy {
        let count = usize::from(self.config.samples_per_poll.max(1));
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            match sensor.read_distance(bay.get()) {
                Ok(sample) => samples.push(sample),
                Err(err) => {
                    warn!(bay = bay.get(), error = %err, "Failed to read distance");
                    samples.push(DistanceSample::no_echo());
                }
            }
        }

        match median_distance(&self.config, &samples) {
            Some(distance) => self.config.classify_distance(distance),
            None => {
                debug!(bay = bay.get(), "No valid distance reading this poll");
                Occupancy::Unknown
            }
        }
    }

    /// Sample one bay and return its committed (debounced) verdict.
    pub fn sample(&mut self, bay: BayIndex, sensor: &mut dyn DistanceSensor) -> Occupancy {
        let raw = self.read_raw(bay, sensor);
        self.observe(bay, raw);
        self.verdict(bay)
    }

    /// Feed a raw verdict. Returns the new committed verdict on a change.
    pub fn observe(&mut self, bay: BayIndex, raw: Occupancy) -> Option<Occupancy> {
        let debouncer = self.debouncers.get_mut(bay.get())?;
        let committed = debouncer.observe(raw)?;
        if committed == Occupancy::Unknown {
            warn!(bay = bay.get(), "Bay sensor fault, occupancy unknown");
        } else {
            debug!(bay = bay.get(), occupancy = ?committed, "Bay occupancy committed");
        }
        Some(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BayRegistry;
    use crate::sensor::mock::{MockDistanceBank, MockReading};

    fn first_bay() -> BayIndex {
        BayRegistry::new(&[0])
            .expect("registry")
            .bay_index(0)
            .expect("bay 0")
    }

    #[test]
    fn commit_requires_k_consecutive_samples() {
        let mut debouncer = Debouncer::new(3);

        assert_eq!(debouncer.observe(Occupancy::Free), None);
        assert_eq!(debouncer.observe(Occupancy::Free), None);
        assert_eq!(debouncer.observe(Occupancy::Free), Some(Occupancy::Free));
        assert_eq!(debouncer.committed(), Occupancy::Free);
    }

    #[test]
    fn single_noisy_sample_never_flips_state() {
        let mut debouncer = Debouncer::new(3);
        for _ in 0..3 {
            debouncer.observe(Occupancy::Free);
        }

        let noise = [
            Occupancy::Occupied,
            Occupancy::Free,
            Occupancy::Occupied,
            Occupancy::Unknown,
            Occupancy::Free,
            Occupancy::Occupied,
            Occupancy::Occupied,
            Occupancy::Free,
        ];
        for raw in noise {
            assert_eq!(debouncer.observe(raw), None);
        }
        assert_eq!(debouncer.committed(), Occupancy::Free);
    }

    #[test]
    fn unknown_sample_discards_streak() {
        let mut debouncer = Debouncer::new(3);
        for _ in 0..3 {
            debouncer.observe(Occupancy::Free);
        }

        debouncer.observe(Occupancy::Occupied);
        debouncer.observe(Occupancy::Occupied);
        debouncer.observe(Occupancy::Unknown);
        assert_eq!(debouncer.observe(Occupancy::Occupied), None);
        assert_eq!(debouncer.observe(Occupancy::Occupied), None);
        assert_eq!(
            debouncer.observe(Occupancy::Occupied),
            Some(Occupancy::Occupied)
        );
    }

    #[test]
    fn sustained_invalid_readings_commit_unknown() {
        let mut debouncer = Debouncer::new(2);
        debouncer.observe(Occupancy::Occupied);
        debouncer.observe(Occupancy::Occupied);

        assert_eq!(debouncer.observe(Occupancy::Unknown), None);
        assert_eq!(
            debouncer.observe(Occupancy::Unknown),
            Some(Occupancy::Unknown)
        );
    }

    #[test]
    fn all_invalid_samples_stay_unknown() {
        let bay = first_bay();
        let mut sampler = OccupancySampler::new(OccupancyConfig::default(), 1);
        let mut bank = MockDistanceBank::new(vec![MockReading::NoEcho]);
        bank.queue(0, &[MockReading::Fail, MockReading::Distance(900.0)]);

        for _ in 0..20 {
            assert_eq!(sampler.sample(bay, &mut bank), Occupancy::Unknown);
        }
    }

    #[test]
    fn sampler_uses_median_of_poll() {
        let bay = first_bay();
        let config = OccupancyConfig {
            samples_per_poll: 3,
            debounce_samples: 1,
            ..OccupancyConfig::default()
        };
        let mut sampler = OccupancySampler::new(config, 1);
        let mut bank = MockDistanceBank::new(vec![MockReading::Distance(150.0)]);
        bank.queue(
            0,
            &[
                MockReading::Distance(10.0),
                MockReading::NoEcho,
                MockReading::Distance(12.0),
            ],
        );

        assert_eq!(sampler.sample(bay, &mut bank), Occupancy::Occupied);
        assert_eq!(sampler.sample(bay, &mut bank), Occupancy::Free);
    }
}
