//! Simulated installation for running the binary without hardware.
//!
//! All peripheral handles share one world. Vehicles arrive on a fixed
//! interval, park in the bay the platform faces once the barrier opens, and
//! leave after their dwell time, most recently parked first.

use crate::actuator::{
    BarrierActuator, BarrierPosition, IndicatorOutput, IndicatorState, PlatformActuator,
    TextDisplay,
};
use crate::control::{Clock, Peripherals};
use crate::error::AppError;
use crate::sensor::{BeamSensor, DistanceSample, DistanceSensor, Gate};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const PARKED_CM: f32 = 8.0;
const EMPTY_CM: f32 = 180.0;
const BEAM_BREAK_MS: u64 = 300;
const PLATFORM_TRAVEL_MS: u64 = 600;
const GIVE_UP_MS: u64 = 10_000;
const QUIET_MS: u64 = 6_000;

#[derive(Debug)]
struct World {
    angles: Vec<i32>,
    parked_at: Vec<Option<u64>>,
    /// Parked bays, most recent last.
    parking_order: Vec<usize>,
    platform_angle: Option<i32>,
    platform_moving_until: u64,
    barrier: BarrierPosition,
    waiting_since: Option<u64>,
    entry_beam_until: u64,
    exit_beam_until: u64,
    quiet_until: u64,
    next_arrival_ms: u64,
    arrival_interval_ms: u64,
    dwell_ms: u64,
    indicators: Vec<IndicatorState>,
}

impl World {
    fn tick(&mut self, now_ms: u64) {
        if let Some(since) = self.waiting_since
            && now_ms.saturating_sub(since) >= GIVE_UP_MS
        {
            info!("Simulated vehicle gave up waiting at the entry");
            self.waiting_since = None;
        }

        // One vehicle movement at a time, with room for the gate to cycle.
        if self.waiting_since.is_some()
            || self.barrier == BarrierPosition::Open
            || now_ms < self.quiet_until
        {
            return;
        }

        if let Some(&bay) = self.parking_order.last()
            && let Some(Some(parked_at)) = self.parked_at.get(bay)
            && now_ms.saturating_sub(*parked_at) >= self.dwell_ms
        {
            info!(bay, "Simulated vehicle leaving");
            self.parking_order.pop();
            self.parked_at[bay] = None;
            self.exit_beam_until = now_ms.saturating_add(BEAM_BREAK_MS);
            self.quiet_until = now_ms.saturating_add(QUIET_MS);
            return;
        }

        if now_ms >= self.next_arrival_ms && self.parked_at.iter().any(Option::is_none) {
            info!("Simulated vehicle arrived at the entry");
            self.next_arrival_ms = now_ms.saturating_add(self.arrival_interval_ms);
            self.waiting_since = Some(now_ms);
            self.entry_beam_until = now_ms.saturating_add(BEAM_BREAK_MS);
            self.quiet_until = now_ms.saturating_add(QUIET_MS);
        }
    }

    fn barrier_opened(&mut self, now_ms: u64) {
        if self.waiting_since.take().is_none() {
            return;
        }
        let facing = self
            .platform_angle
            .and_then(|angle| self.angles.iter().position(|a| *a == angle));
        match facing {
            Some(bay) if self.parked_at[bay].is_none() => {
                info!(bay, "Simulated vehicle parked");
                self.parked_at[bay] = Some(now_ms);
                self.parking_order.push(bay);
            }
            _ => info!("Simulated vehicle found no empty bay and left"),
        }
    }
}

#[derive(Clone)]
pub struct SimulatedLot<C> {
    world: Arc<Mutex<World>>,
    clock: C,
}

impl<C: Clock + Clone + Send + 'static> SimulatedLot<C> {
    pub fn new(angles: &[i32], arrival_interval: Duration, dwell: Duration, clock: C) -> Self {
        let arrival_interval_ms = millis(arrival_interval);
        let world = World {
            angles: angles.to_vec(),
            parked_at: vec![None; angles.len()],
            parking_order: Vec::new(),
            platform_angle: None,
            platform_moving_until: 0,
            barrier: BarrierPosition::Closed,
            waiting_since: None,
            entry_beam_until: 0,
            exit_beam_until: 0,
            quiet_until: 0,
            next_arrival_ms: clock.now_ms().saturating_add(arrival_interval_ms),
            arrival_interval_ms,
            dwell_ms: millis(dwell),
            indicators: vec![IndicatorState::Off; angles.len()],
        };
        Self {
            world: Arc::new(Mutex::new(world)),
            clock,
        }
    }

    /// Boxed handles onto this world for the control loop.
    pub fn peripherals(&self) -> Peripherals {
        Peripherals {
            distance: Box::new(self.clone()),
            beams: Box::new(self.clone()),
            platform: Box::new(self.clone()),
            barrier: Box::new(self.clone()),
            indicators: Box::new(self.clone()),
            display: Box::new(self.clone()),
        }
    }

    pub fn parked_count(&self) -> usize {
        self.world
            .lock()
            .map(|world| world.parking_order.len())
            .unwrap_or(0)
    }

    fn world(&self) -> Result<MutexGuard<'_, World>, AppError> {
        self.world
            .lock()
            .map_err(|_| AppError::ActuatorFault("simulated world lock poisoned".to_string()))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<C: Clock + Clone + Send + 'static> DistanceSensor for SimulatedLot<C> {
    fn read_distance(&mut self, bay: usize) -> Result<DistanceSample, AppError> {
        let world = self.world().map_err(|err| AppError::SensorFault {
            bay,
            reason: err.to_string(),
        })?;
        match world.parked_at.get(bay) {
            Some(Some(_)) => Ok(DistanceSample::valid(PARKED_CM)),
            Some(None) => Ok(DistanceSample::valid(EMPTY_CM)),
            None => Err(AppError::InvalidBay(bay)),
        }
    }
}

impl<C: Clock + Clone + Send + 'static> BeamSensor for SimulatedLot<C> {
    fn read_beam(&mut self, gate: Gate) -> Result<bool, AppError> {
        let now_ms = self.clock.now_ms();
        let mut world = self.world()?;
        if gate == Gate::Entry {
            world.tick(now_ms);
        }
        Ok(match gate {
            Gate::Entry => now_ms < world.entry_beam_until,
            Gate::Exit => now_ms < world.exit_beam_until,
        })
    }
}

impl<C: Clock + Clone + Send + 'static> PlatformActuator for SimulatedLot<C> {
    fn rotate_to(&mut self, angle: i32) -> Result<(), AppError> {
        let now_ms = self.clock.now_ms();
        let mut world = self.world()?;
        debug!(angle, "Simulated platform rotating");
        world.platform_angle = Some(angle);
        world.platform_moving_until = now_ms.saturating_add(PLATFORM_TRAVEL_MS);
        Ok(())
    }

    fn is_settled(&self) -> bool {
        let now_ms = self.clock.now_ms();
        self.world()
            .map(|world| now_ms >= world.platform_moving_until)
            .unwrap_or(false)
    }
}

impl<C: Clock + Clone + Send + 'static> BarrierActuator for SimulatedLot<C> {
    fn set_barrier(&mut self, position: BarrierPosition) -> Result<(), AppError> {
        let now_ms = self.clock.now_ms();
        let mut world = self.world()?;
        debug!(?position, "Simulated barrier");
        if position == BarrierPosition::Open && world.barrier == BarrierPosition::Closed {
            world.barrier_opened(now_ms);
        }
        world.barrier = position;
        Ok(())
    }
}

impl<C: Clock + Clone + Send + 'static> IndicatorOutput for SimulatedLot<C> {
    fn set_indicator(&mut self, bay: usize, state: IndicatorState) -> Result<(), AppError> {
        let mut world = self.world()?;
        let slot = world
            .indicators
            .get_mut(bay)
            .ok_or(AppError::InvalidBay(bay))?;
        if *slot != state {
            info!(bay, ?state, "Indicator");
            *slot = state;
        }
        Ok(())
    }
}

impl<C: Clock + Clone + Send + 'static> TextDisplay for SimulatedLot<C> {
    fn show(&mut self, lines: &[String]) -> Result<(), AppError> {
        info!(lines = ?lines, "Display");
        Ok(())
    }
}
