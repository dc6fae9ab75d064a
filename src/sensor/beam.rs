//! Break-beam trip detection.
//!
//! A trip fires once per continuous break, after the beam has stayed broken
//! for the debounce window. The detector re-arms when the beam clears.

#[derive(Debug, Clone)]
pub struct BeamTrigger {
    debounce_ms: u64,
    broken_since: Option<u64>,
    fired: bool,
}

impl BeamTrigger {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            broken_since: None,
            fired: false,
        }
    }

    /// Feed one poll of the beam. Returns true on the poll where the trip is
    /// recognized.
    pub fn update(&mut self, broken: bool, now_ms: u64) -> bool {
        if !broken {
            self.broken_since = None;
            self.fired = false;
            return false;
        }

        let since = *self.broken_since.get_or_insert(now_ms);
        if self.fired || now_ms.saturating_sub(since) < self.debounce_ms {
            return false;
        }
        self.fired = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_fires_once_per_continuous_break() {
        let mut trigger = BeamTrigger::new(50);

        assert!(!trigger.update(true, 0));
        assert!(!trigger.update(true, 40));
        assert!(trigger.update(true, 60));
        assert!(!trigger.update(true, 100));
        assert!(!trigger.update(true, 500));
    }

    #[test]
    fn short_glitch_is_ignored() {
        let mut trigger = BeamTrigger::new(50);

        assert!(!trigger.update(true, 0));
        assert!(!trigger.update(false, 20));
        assert!(!trigger.update(true, 30));
        assert!(!trigger.update(true, 70));
        assert!(trigger.update(true, 80));
    }

    #[test]
    fn clearing_rearms_trigger() {
        let mut trigger = BeamTrigger::new(0);

        assert!(trigger.update(true, 0));
        assert!(!trigger.update(true, 10));
        assert!(!trigger.update(false, 20));
        assert!(trigger.update(true, 30));
    }
}
