use crate::error::AppError;
use crate::sensor::{BeamSensor, DistanceSample, DistanceSensor, Gate};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockReading {
    Distance(f32),
    NoEcho,
    Fail,
}

impl MockReading {
    fn into_result(self, bay: usize) -> Result<DistanceSample, AppError> {
        match self {
            MockReading::Distance(cm) => Ok(DistanceSample::valid(cm)),
            MockReading::NoEcho => Ok(DistanceSample::no_echo()),
            MockReading::Fail => Err(AppError::SensorFault {
                bay,
                reason: "mock read failed".to_string(),
            }),
        }
    }
}

#[derive(Debug)]
struct BayScript {
    steady: MockReading,
    queued: VecDeque<MockReading>,
}

/// Distance sensors for every bay. Clones share the same readings, so a test
/// can keep a handle after moving one into the control loop.
#[derive(Debug, Clone)]
pub struct MockDistanceBank {
    bays: Arc<Mutex<Vec<BayScript>>>,
}

impl MockDistanceBank {
    pub fn new(steady: Vec<MockReading>) -> Self {
        let bays = steady
            .into_iter()
            .map(|steady| BayScript {
                steady,
                queued: VecDeque::new(),
            })
            .collect();
        Self {
            bays: Arc::new(Mutex::new(bays)),
        }
    }

    /// All bays report the same steady distance.
    pub fn uniform(count: usize, reading: MockReading) -> Self {
        Self::new(vec![reading; count])
    }

    /// Change the reading a bay returns once its queue is drained.
    pub fn set_steady(&self, bay: usize, reading: MockReading) {
        if let Ok(mut bays) = self.bays.lock()
            && let Some(script) = bays.get_mut(bay)
        {
            script.steady = reading;
        }
    }

    /// Queue one-off readings returned before the steady value.
    pub fn queue(&self, bay: usize, readings: &[MockReading]) {
        if let Ok(mut bays) = self.bays.lock()
            && let Some(script) = bays.get_mut(bay)
        {
            script.queued.extend(readings.iter().copied());
        }
    }
}

impl DistanceSensor for MockDistanceBank {
    fn read_distance(&mut self, bay: usize) -> Result<DistanceSample, AppError> {
        let mut bays = self.bays.lock().map_err(|_| AppError::SensorFault {
            bay,
            reason: "mock lock poisoned".to_string(),
        })?;
        let script = bays.get_mut(bay).ok_or(AppError::InvalidBay(bay))?;
        let reading = script.queued.pop_front().unwrap_or(script.steady);
        reading.into_result(bay)
    }
}

#[derive(Debug, Default)]
struct BeamLevels {
    entry: bool,
    exit: bool,
    fail: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockBeams {
    levels: Arc<Mutex<BeamLevels>>,
}

impl MockBeams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, gate: Gate, broken: bool) {
        if let Ok(mut levels) = self.levels.lock() {
            match gate {
                Gate::Entry => levels.entry = broken,
                Gate::Exit => levels.exit = broken,
            }
        }
    }

    pub fn set_failing(&self, fail: bool) {
        if let Ok(mut levels) = self.levels.lock() {
            levels.fail = fail;
        }
    }
}

impl BeamSensor for MockBeams {
    fn read_beam(&mut self, gate: Gate) -> Result<bool, AppError> {
        let levels = self
            .levels
            .lock()
            .map_err(|_| AppError::SensorFault {
                bay: 0,
                reason: "mock beam lock poisoned".to_string(),
            })?;
        if levels.fail {
            return Err(AppError::SensorFault {
                bay: 0,
                reason: format!("mock {} beam failed", gate.as_str()),
            });
        }
        Ok(match gate {
            Gate::Entry => levels.entry,
            Gate::Exit => levels.exit,
        })
    }
}
