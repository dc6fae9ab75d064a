//! Entry/exit session state machine.
//!
//! The sequencer is the only writer of the [`BayRegistry`]. Each call to
//! [`Sequencer::step`] performs at most one phase transition. Settle waits
//! are held as "phase entered at" timestamps and checked on later steps,
//! so nothing here ever blocks.

use crate::actuator::{BarrierActuator, BarrierPosition, PlatformActuator};
use crate::allocation::{AllocationPolicy, allocate};
use crate::error::AppError;
use crate::registry::{Bay, BayIndex, BayRegistry, EpisodeOrigin, Occupancy};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerSettings {
    /// Minimum wait after a rotation command before the platform counts as
    /// in position.
    pub rotation_settle_ms: u64,
    /// How long the barrier stays open before it is closed again.
    pub barrier_hold_ms: u64,
    /// Upper bound on any non-idle phase, measured from session start.
    pub session_timeout_ms: u64,
    pub min_angle: i32,
    pub max_angle: i32,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            rotation_settle_ms: 1000,
            barrier_hold_ms: 3000,
            session_timeout_ms: 15_000,
            min_angle: 0,
            max_angle: 180,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingAllocation,
    RotatingForEntry { bay: BayIndex },
    BarrierOpenForEntry { bay: BayIndex },
    AwaitingExitClear,
    RotatingForExit { bay: BayIndex },
    /// `bay` is `None` when no session-entered bay could be matched to the
    /// departing vehicle; the barrier is cycled without a release.
    BarrierOpenForExit { bay: Option<BayIndex> },
    RemoteOverride { angle: i32 },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::AwaitingAllocation => "AWAITING_ALLOCATION",
            Phase::RotatingForEntry { .. } => "ROTATING_FOR_ENTRY",
            Phase::BarrierOpenForEntry { .. } => "BARRIER_OPEN_FOR_ENTRY",
            Phase::AwaitingExitClear => "AWAITING_EXIT_CLEAR",
            Phase::RotatingForExit { .. } => "ROTATING_FOR_EXIT",
            Phase::BarrierOpenForExit { .. } => "BARRIER_OPEN_FOR_EXIT",
            Phase::RemoteOverride { .. } => "REMOTE_OVERRIDE",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Entry,
    Exit,
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub kind: SessionKind,
    pub started_at_ms: u64,
}

/// User-visible outcome of a transition, kept until the next one replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LotFull,
    Entered { bay: usize },
    Exited { bay: usize, duration_secs: u64 },
    ActuatorFault { message: String },
    SessionTimeout,
    Override { angle: i32 },
}

impl Notice {
    /// Faults keep the installation in a degraded state until cleared.
    pub fn is_fault(&self) -> bool {
        matches!(self, Notice::ActuatorFault { .. } | Notice::SessionTimeout)
    }

    pub fn describe(&self) -> String {
        match self {
            Notice::LotFull => "LOT FULL".to_string(),
            Notice::Entered { bay } => format!("ENTERED BAY {bay}"),
            Notice::Exited { bay, duration_secs } => {
                format!("EXITED BAY {bay} {duration_secs}s")
            }
            Notice::ActuatorFault { message } => format!("ACTUATOR FAULT {message}"),
            Notice::SessionTimeout => "SESSION TIMEOUT".to_string(),
            Notice::Override { angle } => format!("OVERRIDE {angle}"),
        }
    }
}

/// Which beams tripped during this poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trips {
    pub entry: bool,
    pub exit: bool,
}

impl Trips {
    pub fn any(&self) -> bool {
        self.entry || self.exit
    }
}

pub struct Actuators<'a> {
    pub platform: &'a mut dyn PlatformActuator,
    pub barrier: &'a mut dyn BarrierActuator,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub transitioned: bool,
    pub registry_changed: bool,
    pub notice: Option<Notice>,
}

impl StepOutcome {
    fn moved() -> Self {
        Self {
            transitioned: true,
            ..Self::default()
        }
    }

    fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }

    fn with_registry_change(mut self) -> Self {
        self.registry_changed = true;
        self
    }
}

#[derive(Debug)]
pub struct Sequencer {
    settings: SequencerSettings,
    policy: Box<dyn AllocationPolicy>,
    phase: Phase,
    phase_since_ms: u64,
    session: Option<Session>,
    barrier_open: bool,
    pending_override: Option<i32>,
    /// Trips recognized while idle but pre-empted by an override.
    deferred_trips: Trips,
    /// Bays waved in by entry sessions, most recent last.
    entered: Vec<BayIndex>,
    /// Bays released by an exit session whose vehicle may still be sensed.
    /// No sensed episode starts on them until the sampler stops reporting
    /// Occupied.
    awaiting_clear: Vec<BayIndex>,
}

impl Sequencer {
    pub fn new(settings: SequencerSettings, policy: Box<dyn AllocationPolicy>) -> Self {
        Self {
            settings,
            policy,
            phase: Phase::Idle,
            phase_since_ms: 0,
            session: None,
            barrier_open: false,
            pending_override: None,
            deferred_trips: Trips::default(),
            entered: Vec::new(),
            awaiting_clear: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SequencerSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<Session> {
        self.session
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn clamp_angle(&self, angle: i32) -> i32 {
        angle.max(self.settings.min_angle).min(self.settings.max_angle)
    }

    /// Queue a ROTATE for the next step. A later request replaces an
    /// unapplied earlier one.
    pub fn request_override(&mut self, angle: i32) {
        let clamped = self.clamp_angle(angle);
        if clamped != angle {
            debug!(requested = angle, clamped, "Override angle clamped");
        }
        self.pending_override = Some(clamped);
    }

    /// Reconcile a committed sampler verdict with the registry. Returns true
    /// when the registry changed.
    pub fn apply_verdict(
        &mut self,
        registry: &mut BayRegistry,
        bay: BayIndex,
        verdict: Occupancy,
        now_ms: u64,
    ) -> bool {
        let Some(current) = registry.bay(bay).map(|b| (b.origin(), b.occupancy())) else {
            return false;
        };

        if self.awaiting_clear.contains(&bay) {
            if verdict == Occupancy::Occupied {
                return false;
            }
            debug!(bay = bay.get(), "Released bay cleared");
            self.awaiting_clear.retain(|cleared| *cleared != bay);
        }

        match current {
            (None, occupancy) if occupancy == verdict => false,
            (None, _) if verdict == Occupancy::Occupied => {
                info!(bay = bay.get(), "Vehicle detected without a session");
                registry.occupy(bay, EpisodeOrigin::Sensed, now_ms);
                true
            }
            (None, _) => {
                registry.set_sensed(bay, verdict);
                true
            }
            (Some(EpisodeOrigin::Sensed), _) if verdict == Occupancy::Free => {
                let secs = registry.release(bay, now_ms);
                info!(bay = bay.get(), duration_secs = secs, "Sensed vehicle left bay");
                true
            }
            // Unknown during a sensed episode keeps the bay occupied; the
            // sampler has already reported the fault.
            (Some(EpisodeOrigin::Sensed), _) => false,
            // Session episodes end only through an exit session.
            (Some(EpisodeOrigin::Session), _) => false,
        }
    }

    /// Advance the state machine by at most one transition.
    pub fn step(
        &mut self,
        trips: Trips,
        registry: &mut BayRegistry,
        actuators: &mut Actuators<'_>,
        now_ms: u64,
    ) -> StepOutcome {
        if let Some(angle) = self.pending_override.take() {
            if trips.any() {
                if self.phase.is_idle() {
                    debug!(?trips, "Beam trips deferred until override completes");
                    self.deferred_trips.entry |= trips.entry;
                    self.deferred_trips.exit |= trips.exit;
                } else {
                    debug!(?trips, "Beam trips discarded during override");
                }
            }
            return self.begin_override(angle, actuators, now_ms);
        }

        if !self.phase.is_idle() {
            if trips.any() {
                debug!(phase = self.phase.name(), ?trips, "Beam trip discarded, session active");
            }
            if self.timed_out(now_ms) {
                return self.time_out(actuators, now_ms);
            }
        }

        match self.phase {
            Phase::Idle => {
                let deferred = std::mem::take(&mut self.deferred_trips);
                let trips = Trips {
                    entry: trips.entry || deferred.entry,
                    exit: trips.exit || deferred.exit,
                };
                self.start_session(trips, now_ms)
            }
            Phase::AwaitingAllocation => self.allocate_bay(registry, actuators, now_ms),
            Phase::RotatingForEntry { bay } => {
                if !self.rotation_settled(actuators, now_ms) {
                    return StepOutcome::default();
                }
                self.admit(bay, registry, actuators, now_ms)
            }
            Phase::BarrierOpenForEntry { .. } | Phase::BarrierOpenForExit { .. } => {
                if !self.barrier_held(actuators, now_ms) {
                    return StepOutcome::default();
                }
                self.close_and_finish(actuators, now_ms)
            }
            Phase::AwaitingExitClear => self.select_exit_bay(registry, actuators, now_ms),
            Phase::RotatingForExit { bay } => {
                if !self.rotation_settled(actuators, now_ms) {
                    return StepOutcome::default();
                }
                self.dismiss(bay, registry, actuators, now_ms)
            }
            Phase::RemoteOverride { angle } => {
                if !self.rotation_settled(actuators, now_ms) {
                    return StepOutcome::default();
                }
                info!(angle, "Override complete");
                self.finish(now_ms);
                StepOutcome::moved()
            }
        }
    }

    fn enter(&mut self, phase: Phase, now_ms: u64) {
        debug!(from = self.phase.name(), to = phase.name(), "Phase transition");
        self.phase = phase;
        self.phase_since_ms = now_ms;
    }

    fn finish(&mut self, now_ms: u64) {
        self.enter(Phase::Idle, now_ms);
        self.session = None;
    }

    fn elapsed_in_phase(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.phase_since_ms)
    }

    fn timed_out(&self, now_ms: u64) -> bool {
        self.session.is_some_and(|session| {
            now_ms.saturating_sub(session.started_at_ms) >= self.settings.session_timeout_ms
        })
    }

    fn rotation_settled(&self, actuators: &Actuators<'_>, now_ms: u64) -> bool {
        self.elapsed_in_phase(now_ms) >= self.settings.rotation_settle_ms
            && actuators.platform.is_settled()
    }

    fn barrier_held(&self, actuators: &Actuators<'_>, now_ms: u64) -> bool {
        self.elapsed_in_phase(now_ms) >= self.settings.barrier_hold_ms
            && actuators.barrier.is_settled()
    }

    fn start_session(&mut self, trips: Trips, now_ms: u64) -> StepOutcome {
        let (kind, phase) = if trips.entry {
            if trips.exit {
                debug!("Exit trip discarded, entry trip takes the session");
            }
            (SessionKind::Entry, Phase::AwaitingAllocation)
        } else if trips.exit {
            (SessionKind::Exit, Phase::AwaitingExitClear)
        } else {
            return StepOutcome::default();
        };

        info!(?kind, "Session started");
        self.session = Some(Session {
            kind,
            started_at_ms: now_ms,
        });
        self.enter(phase, now_ms);
        StepOutcome::moved()
    }

    fn allocate_bay(
        &mut self,
        registry: &BayRegistry,
        actuators: &mut Actuators<'_>,
        now_ms: u64,
    ) -> StepOutcome {
        let bay = match allocate(self.policy.as_mut(), registry) {
            Ok(bay) => bay,
            Err(err) => {
                warn!(error = %err, "Entry refused");
                self.finish(now_ms);
                return StepOutcome::moved().with_notice(Notice::LotFull);
            }
        };
        let Some(angle) = registry.angle(bay) else {
            return self.abort(AppError::InvalidBay(bay.get()), actuators, now_ms);
        };

        if let Err(err) = actuators.platform.rotate_to(angle) {
            return self.abort(err, actuators, now_ms);
        }
        info!(bay = bay.get(), angle, policy = self.policy.name(), "Rotating for entry");
        self.enter(Phase::RotatingForEntry { bay }, now_ms);
        StepOutcome::moved()
    }

    fn admit(
        &mut self,
        bay: BayIndex,
        registry: &mut BayRegistry,
        actuators: &mut Actuators<'_>,
        now_ms: u64,
    ) -> StepOutcome {
        if let Err(err) = actuators.barrier.set_barrier(BarrierPosition::Open) {
            return self.abort(err, actuators, now_ms);
        }
        self.barrier_open = true;

        registry.occupy(bay, EpisodeOrigin::Session, now_ms);
        self.awaiting_clear.retain(|cleared| *cleared != bay);
        self.entered.retain(|entered| *entered != bay);
        self.entered.push(bay);
        info!(bay = bay.get(), "Barrier open, vehicle admitted");

        self.enter(Phase::BarrierOpenForEntry { bay }, now_ms);
        StepOutcome::moved()
            .with_registry_change()
            .with_notice(Notice::Entered { bay: bay.get() })
    }

    fn select_exit_bay(
        &mut self,
        registry: &BayRegistry,
        actuators: &mut Actuators<'_>,
        now_ms: u64,
    ) -> StepOutcome {
        self.entered.retain(|bay| {
            registry.bay(*bay).is_some_and(|b: &Bay| {
                b.occupancy() == Occupancy::Occupied && b.origin() == Some(EpisodeOrigin::Session)
            })
        });

        let target = self
            .entered
            .last()
            .copied()
            .and_then(|bay| registry.angle(bay).map(|angle| (bay, angle)));

        match target {
            Some((bay, angle)) => {
                if let Err(err) = actuators.platform.rotate_to(angle) {
                    return self.abort(err, actuators, now_ms);
                }
                info!(bay = bay.get(), angle, "Rotating for exit");
                self.enter(Phase::RotatingForExit { bay }, now_ms);
            }
            None => {
                warn!("No session-entered bay to release, cycling barrier only");
                if let Err(err) = actuators.barrier.set_barrier(BarrierPosition::Open) {
                    return self.abort(err, actuators, now_ms);
                }
                self.barrier_open = true;
                self.enter(Phase::BarrierOpenForExit { bay: None }, now_ms);
            }
        }
        StepOutcome::moved()
    }

    fn dismiss(
        &mut self,
        bay: BayIndex,
        registry: &mut BayRegistry,
        actuators: &mut Actuators<'_>,
        now_ms: u64,
    ) -> StepOutcome {
        if let Err(err) = actuators.barrier.set_barrier(BarrierPosition::Open) {
            return self.abort(err, actuators, now_ms);
        }
        self.barrier_open = true;

        let duration_secs = registry.release(bay, now_ms);
        self.entered.retain(|entered| *entered != bay);
        if !self.awaiting_clear.contains(&bay) {
            self.awaiting_clear.push(bay);
        }
        info!(bay = bay.get(), duration_secs, "Barrier open, vehicle released");

        self.enter(Phase::BarrierOpenForExit { bay: Some(bay) }, now_ms);
        StepOutcome::moved()
            .with_registry_change()
            .with_notice(Notice::Exited {
                bay: bay.get(),
                duration_secs,
            })
    }

    fn close_and_finish(&mut self, actuators: &mut Actuators<'_>, now_ms: u64) -> StepOutcome {
        if let Err(err) = actuators.barrier.set_barrier(BarrierPosition::Closed) {
            return self.abort(err, actuators, now_ms);
        }
        self.barrier_open = false;
        info!(kind = ?self.session.map(|s| s.kind), "Session complete");
        self.finish(now_ms);
        StepOutcome::moved()
    }

    fn begin_override(
        &mut self,
        angle: i32,
        actuators: &mut Actuators<'_>,
        now_ms: u64,
    ) -> StepOutcome {
        if let Some(session) = self.session {
            info!(kind = ?session.kind, phase = self.phase.name(), "Session abandoned for override");
        }
        self.close_barrier_best_effort(actuators);

        if let Err(err) = actuators.platform.rotate_to(angle) {
            return self.abort(err, actuators, now_ms);
        }
        info!(angle, "Remote override");
        self.session = Some(Session {
            kind: SessionKind::Override,
            started_at_ms: now_ms,
        });
        self.enter(Phase::RemoteOverride { angle }, now_ms);
        StepOutcome::moved().with_notice(Notice::Override { angle })
    }

    fn time_out(&mut self, actuators: &mut Actuators<'_>, now_ms: u64) -> StepOutcome {
        warn!(
            phase = self.phase.name(),
            timeout_ms = self.settings.session_timeout_ms,
            "Session timed out"
        );
        self.close_barrier_best_effort(actuators);
        self.finish(now_ms);
        StepOutcome::moved().with_notice(Notice::SessionTimeout)
    }

    /// Abandon the session after an actuator refused a command. The registry
    /// is left as it was.
    fn abort(&mut self, err: AppError, actuators: &mut Actuators<'_>, now_ms: u64) -> StepOutcome {
        warn!(phase = self.phase.name(), error = %err, "Session aborted");
        self.close_barrier_best_effort(actuators);
        self.finish(now_ms);
        StepOutcome::moved().with_notice(Notice::ActuatorFault {
            message: err.to_string(),
        })
    }

    fn close_barrier_best_effort(&mut self, actuators: &mut Actuators<'_>) {
        if !self.barrier_open {
            return;
        }
        match actuators.barrier.set_barrier(BarrierPosition::Closed) {
            Ok(()) => self.barrier_open = false,
            Err(err) => warn!(error = %err, "Failed to close barrier"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::mock::{MockBarrier, MockPlatform};
    use crate::allocation::PolicyKind;

    const SETTLE: u64 = 1000;
    const HOLD: u64 = 3000;

    struct Rig {
        sequencer: Sequencer,
        registry: BayRegistry,
        platform: MockPlatform,
        barrier: MockBarrier,
    }

    impl Rig {
        /// Bays at 30/90/150 degrees with the given sensed occupancy.
        fn new(states: &[Occupancy]) -> Self {
            let mut sequencer =
                Sequencer::new(SequencerSettings::default(), PolicyKind::FirstFree.build());
            let mut registry = BayRegistry::new(&[30, 90, 150]).expect("registry");
            let indices: Vec<BayIndex> = registry.indices().collect();
            for (bay, state) in indices.into_iter().zip(states) {
                sequencer.apply_verdict(&mut registry, bay, *state, 0);
            }
            Self {
                sequencer,
                registry,
                platform: MockPlatform::new(),
                barrier: MockBarrier::new(),
            }
        }

        fn step(&mut self, trips: Trips, now_ms: u64) -> StepOutcome {
            let mut platform = self.platform.clone();
            let mut barrier = self.barrier.clone();
            let mut actuators = Actuators {
                platform: &mut platform,
                barrier: &mut barrier,
            };
            self.sequencer
                .step(trips, &mut self.registry, &mut actuators, now_ms)
        }

        fn bay(&self, raw: usize) -> BayIndex {
            self.registry.bay_index(raw).expect("bay in range")
        }
    }

    const ENTRY: Trips = Trips {
        entry: true,
        exit: false,
    };
    const EXIT: Trips = Trips {
        entry: false,
        exit: true,
    };
    const NONE: Trips = Trips {
        entry: false,
        exit: false,
    };

    #[test]
    fn entry_occupies_only_once_barrier_opens() {
        let mut rig = Rig::new(&[Occupancy::Occupied, Occupancy::Free, Occupancy::Free]);
        let bay1 = rig.bay(1);

        rig.step(ENTRY, 0);
        assert_eq!(rig.sequencer.phase(), Phase::AwaitingAllocation);
        rig.step(NONE, 100);
        assert_eq!(rig.sequencer.phase(), Phase::RotatingForEntry { bay: bay1 });
        assert_eq!(rig.platform.angles(), vec![90]);
        assert_eq!(rig.registry.occupancy(bay1), Some(Occupancy::Free));

        rig.step(NONE, 100 + SETTLE - 1);
        assert_eq!(rig.registry.occupancy(bay1), Some(Occupancy::Free));

        let outcome = rig.step(NONE, 100 + SETTLE);
        assert!(outcome.registry_changed);
        assert_eq!(outcome.notice, Some(Notice::Entered { bay: 1 }));
        assert_eq!(rig.registry.occupancy(bay1), Some(Occupancy::Occupied));
        assert!(rig.registry.bay(bay1).expect("bay").timer().is_running());
        assert_eq!(rig.barrier.position(), BarrierPosition::Open);

        rig.step(NONE, 100 + SETTLE + HOLD);
        assert_eq!(rig.sequencer.phase(), Phase::Idle);
        assert_eq!(rig.barrier.position(), BarrierPosition::Closed);
        assert!(rig.sequencer.session().is_none());
    }

    #[test]
    fn lot_full_never_opens_barrier() {
        let mut rig = Rig::new(&[Occupancy::Occupied, Occupancy::Unknown, Occupancy::Occupied]);

        rig.step(ENTRY, 0);
        let outcome = rig.step(NONE, 100);

        assert_eq!(outcome.notice, Some(Notice::LotFull));
        assert_eq!(rig.sequencer.phase(), Phase::Idle);
        assert!(rig.barrier.positions().is_empty());
        assert!(rig.platform.angles().is_empty());
    }

    #[test]
    fn trips_during_session_are_discarded() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);

        rig.step(ENTRY, 0);
        rig.step(ENTRY, 100);
        rig.step(EXIT, 200);
        rig.step(Trips { entry: true, exit: true }, 300);

        assert_eq!(
            rig.sequencer.session().map(|s| s.kind),
            Some(SessionKind::Entry)
        );
        assert_eq!(rig.platform.angles(), vec![30]);
    }

    #[test]
    fn barrier_fault_aborts_without_mutation() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);
        rig.barrier.set_fail_open(true);
        let before: Vec<Occupancy> = rig.registry.bays().iter().map(Bay::occupancy).collect();

        rig.step(ENTRY, 0);
        rig.step(NONE, 100);
        let outcome = rig.step(NONE, 100 + SETTLE);

        assert!(matches!(outcome.notice, Some(Notice::ActuatorFault { .. })));
        assert!(!outcome.registry_changed);
        assert_eq!(rig.sequencer.phase(), Phase::Idle);
        let after: Vec<Occupancy> = rig.registry.bays().iter().map(Bay::occupancy).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn platform_fault_aborts_entry() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);
        rig.platform.set_failing(true);

        rig.step(ENTRY, 0);
        let outcome = rig.step(NONE, 100);

        assert!(matches!(outcome.notice, Some(Notice::ActuatorFault { .. })));
        assert_eq!(rig.sequencer.phase(), Phase::Idle);
        assert_eq!(rig.registry.free_count(), 3);
    }

    #[test]
    fn stalled_platform_times_out_to_idle() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);
        rig.platform.set_stalled(true);
        let timeout = rig.sequencer.settings().session_timeout_ms;

        rig.step(ENTRY, 0);
        rig.step(NONE, 100);
        rig.step(NONE, 5_000);
        assert!(matches!(rig.sequencer.phase(), Phase::RotatingForEntry { .. }));

        let outcome = rig.step(NONE, timeout);

        assert_eq!(outcome.notice, Some(Notice::SessionTimeout));
        assert_eq!(rig.sequencer.phase(), Phase::Idle);
        assert_eq!(rig.registry.free_count(), 3);
    }

    #[test]
    fn exit_releases_most_recent_entry() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);
        let bay0 = rig.bay(0);

        rig.step(ENTRY, 0);
        rig.step(NONE, 100);
        rig.step(NONE, 1_100);
        rig.step(NONE, 4_100);
        assert_eq!(rig.sequencer.phase(), Phase::Idle);

        rig.step(EXIT, 64_100);
        rig.step(NONE, 64_200);
        assert_eq!(rig.sequencer.phase(), Phase::RotatingForExit { bay: bay0 });
        let outcome = rig.step(NONE, 65_200);

        assert_eq!(
            outcome.notice,
            Some(Notice::Exited {
                bay: 0,
                duration_secs: 64
            })
        );
        assert_eq!(rig.registry.occupancy(bay0), Some(Occupancy::Free));
        assert_eq!(rig.platform.angles(), vec![30, 30]);
    }

    #[test]
    fn exit_without_entered_bay_only_cycles_barrier() {
        let mut rig = Rig::new(&[Occupancy::Occupied, Occupancy::Free, Occupancy::Free]);

        rig.step(EXIT, 0);
        rig.step(NONE, 100);

        assert_eq!(rig.sequencer.phase(), Phase::BarrierOpenForExit { bay: None });
        assert!(rig.platform.angles().is_empty());
        rig.step(NONE, 100 + HOLD);
        assert_eq!(rig.sequencer.phase(), Phase::Idle);
        assert_eq!(rig.registry.occupancy(rig.bay(0)), Some(Occupancy::Occupied));
    }

    #[test]
    fn override_closes_open_barrier_and_abandons_session() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);
        rig.step(ENTRY, 0);
        rig.step(NONE, 100);
        rig.step(NONE, 1_100);
        assert_eq!(rig.barrier.position(), BarrierPosition::Open);

        rig.sequencer.request_override(270);
        let outcome = rig.step(NONE, 1_200);

        assert_eq!(outcome.notice, Some(Notice::Override { angle: 180 }));
        assert_eq!(rig.barrier.position(), BarrierPosition::Closed);
        assert_eq!(rig.sequencer.phase(), Phase::RemoteOverride { angle: 180 });
        assert_eq!(rig.platform.last_angle(), Some(180));

        rig.step(NONE, 2_200);
        assert_eq!(rig.sequencer.phase(), Phase::Idle);
    }

    #[test]
    fn sensed_episode_follows_sampler() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);
        let bay2 = rig.bay(2);
        let seq = &mut rig.sequencer;

        assert!(seq.apply_verdict(&mut rig.registry, bay2, Occupancy::Occupied, 1_000));
        assert_eq!(
            rig.registry.bay(bay2).and_then(Bay::origin),
            Some(EpisodeOrigin::Sensed)
        );
        assert!(!seq.apply_verdict(&mut rig.registry, bay2, Occupancy::Unknown, 2_000));
        assert_eq!(rig.registry.occupancy(bay2), Some(Occupancy::Occupied));

        assert!(seq.apply_verdict(&mut rig.registry, bay2, Occupancy::Free, 6_000));
        assert_eq!(rig.registry.occupancy(bay2), Some(Occupancy::Free));
        assert_eq!(rig.registry.duration_seconds(2, 9_000), 5);
    }

    #[test]
    fn session_episode_ignores_sampler() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);
        let bay0 = rig.bay(0);
        rig.step(ENTRY, 0);
        rig.step(NONE, 100);
        rig.step(NONE, 1_100);

        let seq = &mut rig.sequencer;
        let changed = seq.apply_verdict(&mut rig.registry, bay0, Occupancy::Free, 1_200);

        assert!(!changed);
        assert_eq!(rig.registry.occupancy(bay0), Some(Occupancy::Occupied));
    }

    #[test]
    fn released_bay_stays_free_until_vehicle_clears() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);
        let bay0 = rig.bay(0);
        rig.step(ENTRY, 0);
        rig.step(NONE, 100);
        rig.step(NONE, 1_100);
        rig.step(NONE, 4_100);

        rig.step(EXIT, 64_100);
        rig.step(NONE, 64_200);
        rig.step(NONE, 65_200);
        assert_eq!(rig.registry.duration_seconds(0, 65_200), 64);

        let seq = &mut rig.sequencer;
        assert!(!seq.apply_verdict(&mut rig.registry, bay0, Occupancy::Occupied, 65_300));
        assert_eq!(rig.registry.occupancy(bay0), Some(Occupancy::Free));
        assert!(!rig.registry.bay(bay0).expect("bay").timer().is_running());
        assert_eq!(rig.registry.duration_seconds(0, 70_000), 64);

        assert!(!seq.apply_verdict(&mut rig.registry, bay0, Occupancy::Free, 70_000));
        assert_eq!(rig.registry.duration_seconds(0, 70_000), 64);

        assert!(seq.apply_verdict(&mut rig.registry, bay0, Occupancy::Occupied, 80_000));
        assert_eq!(
            rig.registry.bay(bay0).and_then(Bay::origin),
            Some(EpisodeOrigin::Sensed)
        );
    }

    #[test]
    fn trip_preempted_by_override_starts_session_afterwards() {
        let mut rig = Rig::new(&[Occupancy::Free, Occupancy::Free, Occupancy::Free]);

        rig.sequencer.request_override(45);
        let outcome = rig.step(ENTRY, 0);
        assert_eq!(outcome.notice, Some(Notice::Override { angle: 45 }));
        assert_eq!(rig.sequencer.phase(), Phase::RemoteOverride { angle: 45 });

        rig.step(NONE, SETTLE);
        assert_eq!(rig.sequencer.phase(), Phase::Idle);

        rig.step(NONE, SETTLE + 100);
        assert_eq!(rig.sequencer.phase(), Phase::AwaitingAllocation);
        rig.step(NONE, SETTLE + 200);
        assert_eq!(rig.platform.angles(), vec![45, 30]);
    }

    #[test]
    fn inverted_angle_limits_do_not_panic() {
        let settings = SequencerSettings {
            min_angle: 180,
            max_angle: 0,
            ..SequencerSettings::default()
        };
        let sequencer = Sequencer::new(settings, PolicyKind::FirstFree.build());

        assert_eq!(sequencer.clamp_angle(90), 0);
        assert_eq!(sequencer.clamp_angle(-30), 0);
    }
}
