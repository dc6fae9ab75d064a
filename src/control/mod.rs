//! The polling loop.
//!
//! One cycle runs in a fixed order: sample sensors, apply queued remote
//! commands, advance the sequencer by at most one transition, render status.
//! The loop owns the registry, so every mutation goes through it.

use crate::actuator::{BarrierActuator, IndicatorOutput, PlatformActuator, TextDisplay};
use crate::command::{Command, RemoteRequest};
use crate::config::Config;
use crate::error::AppError;
use crate::occupancy::OccupancySampler;
use crate::registry::{BayIndex, BayRegistry};
use crate::sensor::beam::BeamTrigger;
use crate::sensor::{BeamSensor, DistanceSensor, Gate};
use crate::state::{AppState, LotSnapshot};
use crate::status::{StatusContext, StatusReporter};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

pub mod sequencer;

use sequencer::{Actuators, Notice, Phase, Sequencer, StepOutcome, Trips};

/// Monotonic milliseconds.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Hand-driven clock for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    pub fn advance(&mut self, ms: u64) {
        self.current_ms = self.current_ms.saturating_add(ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

pub struct Peripherals {
    pub distance: Box<dyn DistanceSensor + Send>,
    pub beams: Box<dyn BeamSensor + Send>,
    pub platform: Box<dyn PlatformActuator + Send>,
    pub barrier: Box<dyn BarrierActuator + Send>,
    pub indicators: Box<dyn IndicatorOutput + Send>,
    pub display: Box<dyn TextDisplay + Send>,
}

pub struct ControlLoop {
    registry: BayRegistry,
    sampler: OccupancySampler,
    entry_beam: BeamTrigger,
    exit_beam: BeamTrigger,
    sequencer: Sequencer,
    reporter: StatusReporter,
    peripherals: Peripherals,
    commands: VecDeque<RemoteRequest>,
    inbox: Option<UnboundedReceiver<RemoteRequest>>,
    notice: Option<Notice>,
    state: Option<Arc<RwLock<AppState>>>,
}

impl ControlLoop {
    pub fn new(
        registry: BayRegistry,
        sampler: OccupancySampler,
        sequencer: Sequencer,
        reporter: StatusReporter,
        beam_debounce_ms: u64,
        peripherals: Peripherals,
    ) -> Self {
        Self {
            registry,
            sampler,
            entry_beam: BeamTrigger::new(beam_debounce_ms),
            exit_beam: BeamTrigger::new(beam_debounce_ms),
            sequencer,
            reporter,
            peripherals,
            commands: VecDeque::new(),
            inbox: None,
            notice: None,
            state: None,
        }
    }

    pub fn from_config(config: &Config, peripherals: Peripherals) -> Result<Self, AppError> {
        let registry = BayRegistry::new(config.bay_angles())?;
        let sampler = OccupancySampler::new(config.occupancy_config(), registry.len());
        let policy = config
            .allocation_policy()
            .map_err(|err| AppError::InvalidConfig(err.to_string()))?;
        let sequencer = Sequencer::new(config.sequencer_settings(), policy.build());
        let reporter = StatusReporter::new(config.display_columns());
        Ok(Self::new(
            registry,
            sampler,
            sequencer,
            reporter,
            config.beam_debounce_ms(),
            peripherals,
        ))
    }

    /// Drain remote requests from this channel at the start of each cycle.
    pub fn with_inbox(mut self, inbox: UnboundedReceiver<RemoteRequest>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    /// Publish a snapshot into the shared state after each cycle.
    pub fn with_state(mut self, state: Arc<RwLock<AppState>>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn registry(&self) -> &BayRegistry {
        &self.registry
    }

    pub fn phase(&self) -> Phase {
        self.sequencer.phase()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Queue a request for the next cycle.
    pub fn submit(&mut self, request: RemoteRequest) {
        self.commands.push_back(request);
    }

    pub fn status_text(&self, now_ms: u64) -> String {
        self.reporter.report(&self.registry, self.context(now_ms))
    }

    pub fn run_cycle(&mut self, now_ms: u64) -> StepOutcome {
        let trips = self.sense(now_ms);
        self.apply_commands(now_ms);

        let mut actuators = Actuators {
            platform: &mut *self.peripherals.platform,
            barrier: &mut *self.peripherals.barrier,
        };
        let outcome = self
            .sequencer
            .step(trips, &mut self.registry, &mut actuators, now_ms);
        if let Some(notice) = &outcome.notice {
            self.notice = Some(notice.clone());
        }

        self.render(now_ms);
        if let Err(err) = self.publish(now_ms) {
            warn!(error = %err, "Failed to publish lot snapshot");
        }
        outcome
    }

    fn context(&self, now_ms: u64) -> StatusContext<'_> {
        StatusContext {
            phase: self.sequencer.phase(),
            notice: self.notice.as_ref(),
            now_ms,
        }
    }

    fn sense(&mut self, now_ms: u64) -> Trips {
        let bays: Vec<BayIndex> = self.registry.indices().collect();
        for bay in bays {
            let verdict = self.sampler.sample(bay, &mut *self.peripherals.distance);
            self.sequencer
                .apply_verdict(&mut self.registry, bay, verdict, now_ms);
        }

        let entry = self.read_beam(Gate::Entry);
        let exit = self.read_beam(Gate::Exit);
        let trips = Trips {
            entry: self.entry_beam.update(entry, now_ms),
            exit: self.exit_beam.update(exit, now_ms),
        };
        if trips.any() {
            info!(entry = trips.entry, exit = trips.exit, "Beam trip");
        }
        trips
    }

    fn read_beam(&mut self, gate: Gate) -> bool {
        match self.peripherals.beams.read_beam(gate) {
            Ok(broken) => broken,
            Err(err) => {
                warn!(gate = gate.as_str(), error = %err, "Failed to read beam");
                false
            }
        }
    }

    fn apply_commands(&mut self, now_ms: u64) {
        if let Some(inbox) = self.inbox.as_mut() {
            loop {
                match inbox.try_recv() {
                    Ok(request) => self.commands.push_back(request),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("Command channel closed");
                        self.inbox = None;
                        break;
                    }
                }
            }
        }

        while let Some(request) = self.commands.pop_front() {
            match request.command {
                Command::Status => {
                    let text = self.status_text(now_ms);
                    match request.reply {
                        Some(reply) => {
                            if reply.send(text).is_err() {
                                debug!("Status requester went away");
                            }
                        }
                        None => info!(status = %text, "Status requested"),
                    }
                }
                Command::Rotate(angle) => {
                    self.sequencer.request_override(angle);
                    // One override per cycle; the rest wait.
                    break;
                }
            }
        }
    }

    fn render(&mut self, now_ms: u64) {
        let rendering = self.reporter.render(&self.registry, self.context(now_ms));
        if let Err(err) = self.reporter.apply(
            &rendering,
            &mut *self.peripherals.indicators,
            &mut *self.peripherals.display,
        ) {
            warn!(error = %err, "Failed to update status outputs");
        }
    }

    fn publish(&self, now_ms: u64) -> Result<(), AppError> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        let snapshot = LotSnapshot {
            bays: self.reporter.snapshot(&self.registry, now_ms),
            phase: self.sequencer.phase().name().to_string(),
            notice: self.notice.as_ref().map(Notice::describe),
            fault_pending: self.notice.as_ref().is_some_and(Notice::is_fault),
            status_text: self.status_text(now_ms),
            timestamp: SystemTime::now(),
        };
        let mut guard = state.write().map_err(|_| AppError::StateLock)?;
        guard.set_snapshot(snapshot)
    }
}

pub fn spawn_control_thread<C>(
    mut control: ControlLoop,
    clock: C,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()>
where
    C: Clock + Send + 'static,
{
    std::thread::spawn(move || {
        info!(
            interval_ms = interval.as_millis(),
            bays = control.registry().len(),
            "Control loop started"
        );
        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();
            control.run_cycle(clock.now_ms());
            sleep_with_stop(interval, &stop, cycle_start);
        }
        info!("Control loop stopped");
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let Some(remaining) = duration.checked_sub(start.elapsed()) else {
        return;
    };
    let step = Duration::from_millis(10).min(remaining);
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step);
        slept += step;
    }
}
