use crate::actuator::{
    BarrierActuator, BarrierPosition, IndicatorOutput, IndicatorState, PlatformActuator,
    TextDisplay,
};
use crate::error::AppError;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(inner: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    inner
        .lock()
        .map_err(|_| AppError::ActuatorFault("mock lock poisoned".to_string()))
}

#[derive(Debug, Default)]
struct PlatformLog {
    angles: Vec<i32>,
    fail: bool,
    stalled: bool,
}

/// Records every commanded angle. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    inner: Arc<Mutex<PlatformLog>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every command, as if no actuator were attached.
    pub fn failing() -> Self {
        let platform = Self::default();
        platform.set_failing(true);
        platform
    }

    pub fn set_failing(&self, fail: bool) {
        if let Ok(mut log) = lock(&self.inner) {
            log.fail = fail;
        }
    }

    /// Accept commands but never report the platform as settled.
    pub fn set_stalled(&self, stalled: bool) {
        if let Ok(mut log) = lock(&self.inner) {
            log.stalled = stalled;
        }
    }

    pub fn angles(&self) -> Vec<i32> {
        lock(&self.inner)
            .map(|log| log.angles.clone())
            .unwrap_or_default()
    }

    pub fn last_angle(&self) -> Option<i32> {
        lock(&self.inner)
            .ok()
            .and_then(|log| log.angles.last().copied())
    }
}

impl PlatformActuator for MockPlatform {
    fn rotate_to(&mut self, angle: i32) -> Result<(), AppError> {
        let mut log = lock(&self.inner)?;
        if log.fail {
            return Err(AppError::ActuatorFault(
                "mock platform not attached".to_string(),
            ));
        }
        log.angles.push(angle);
        Ok(())
    }

    fn is_settled(&self) -> bool {
        lock(&self.inner).map(|log| !log.stalled).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct BarrierLog {
    positions: Vec<BarrierPosition>,
    fail_open: bool,
    fail_close: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockBarrier {
    inner: Arc<Mutex<BarrierLog>>,
}

impl MockBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_open(&self, fail: bool) {
        if let Ok(mut log) = lock(&self.inner) {
            log.fail_open = fail;
        }
    }

    pub fn set_fail_close(&self, fail: bool) {
        if let Ok(mut log) = lock(&self.inner) {
            log.fail_close = fail;
        }
    }

    pub fn positions(&self) -> Vec<BarrierPosition> {
        lock(&self.inner)
            .map(|log| log.positions.clone())
            .unwrap_or_default()
    }

    pub fn position(&self) -> BarrierPosition {
        lock(&self.inner)
            .ok()
            .and_then(|log| log.positions.last().copied())
            .unwrap_or(BarrierPosition::Closed)
    }
}

impl BarrierActuator for MockBarrier {
    fn set_barrier(&mut self, position: BarrierPosition) -> Result<(), AppError> {
        let mut log = lock(&self.inner)?;
        let fail = match position {
            BarrierPosition::Open => log.fail_open,
            BarrierPosition::Closed => log.fail_close,
        };
        if fail {
            return Err(AppError::ActuatorFault(format!(
                "mock barrier refused {position:?}"
            )));
        }
        log.positions.push(position);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MockIndicators {
    states: Arc<Mutex<Vec<IndicatorState>>>,
}

impl MockIndicators {
    pub fn new(count: usize) -> Self {
        Self {
            states: Arc::new(Mutex::new(vec![IndicatorState::Off; count])),
        }
    }

    pub fn states(&self) -> Vec<IndicatorState> {
        lock(&self.states).map(|s| s.clone()).unwrap_or_default()
    }
}

impl IndicatorOutput for MockIndicators {
    fn set_indicator(&mut self, bay: usize, state: IndicatorState) -> Result<(), AppError> {
        let mut states = lock(&self.states)?;
        let slot = states.get_mut(bay).ok_or(AppError::InvalidBay(bay))?;
        *slot = state;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDisplay {
    frames: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Vec<String> {
        lock(&self.frames)
            .ok()
            .and_then(|frames| frames.last().cloned())
            .unwrap_or_default()
    }

    pub fn frame_count(&self) -> usize {
        lock(&self.frames).map(|frames| frames.len()).unwrap_or(0)
    }
}

impl TextDisplay for MockDisplay {
    fn show(&mut self, lines: &[String]) -> Result<(), AppError> {
        lock(&self.frames)?.push(lines.to_vec());
        Ok(())
    }
}
