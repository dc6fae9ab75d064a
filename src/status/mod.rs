//! Renders registry state for the indicators, the text display and STATUS
//! replies. Read-only with respect to the registry.

use crate::actuator::{IndicatorOutput, IndicatorState, TextDisplay};
use crate::control::sequencer::{Notice, Phase};
use crate::error::AppError;
use crate::registry::{BayRegistry, Occupancy};
use crate::state::BaySnapshot;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy)]
pub struct StatusContext<'a> {
    pub phase: Phase,
    pub notice: Option<&'a Notice>,
    pub now_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendering {
    pub indicators: Vec<IndicatorState>,
    pub lines: Vec<String>,
}

pub fn indicator_for(occupancy: Occupancy) -> IndicatorState {
    match occupancy {
        Occupancy::Free => IndicatorState::Available,
        Occupancy::Occupied => IndicatorState::Unavailable,
        Occupancy::Unknown => IndicatorState::Fault,
    }
}

/// `HH:MM:SS`, hours unbounded.
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[derive(Debug)]
pub struct StatusReporter {
    columns: usize,
    last_pushed: Option<Rendering>,
}

impl StatusReporter {
    pub fn new(columns: usize) -> Self {
        Self {
            columns: columns.max(1),
            last_pushed: None,
        }
    }

    pub fn render(&self, registry: &BayRegistry, ctx: StatusContext<'_>) -> Rendering {
        let indicators = registry
            .bays()
            .iter()
            .map(|bay| indicator_for(bay.occupancy()))
            .collect();

        let headline = match registry.free_count() {
            0 => "Lot full".to_string(),
            free => format!("Free {free}/{}", registry.len()),
        };
        let detail = match ctx.notice {
            Some(notice) => display_notice(notice),
            None if ctx.phase.is_idle() => "Welcome".to_string(),
            None => "Please wait".to_string(),
        };

        Rendering {
            indicators,
            lines: vec![self.fit(headline), self.fit(detail)],
        }
    }

    pub fn report(&self, registry: &BayRegistry, ctx: StatusContext<'_>) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "STATE {}", ctx.phase.name());
        for bay in registry.bays() {
            let _ = writeln!(
                text,
                "BAY {} {} {}s",
                bay.index(),
                bay.occupancy().as_str(),
                bay.timer().elapsed_secs(ctx.now_ms)
            );
        }
        if let Some(notice) = ctx.notice {
            let _ = writeln!(text, "NOTICE {}", notice.describe());
        }
        text
    }

    pub fn snapshot(&self, registry: &BayRegistry, now_ms: u64) -> Vec<BaySnapshot> {
        registry
            .bays()
            .iter()
            .map(|bay| BaySnapshot {
                index: bay.index().get(),
                occupancy: bay.occupancy(),
                angle: bay.angle(),
                duration_secs: bay.timer().elapsed_secs(now_ms),
                timer_running: bay.timer().is_running(),
            })
            .collect()
    }

    /// Push a rendering to the outputs, skipping anything unchanged since the
    /// last successful push.
    pub fn apply(
        &mut self,
        rendering: &Rendering,
        indicators: &mut dyn IndicatorOutput,
        display: &mut dyn TextDisplay,
    ) -> Result<(), AppError> {
        let previous = self.last_pushed.take();

        for (bay, state) in rendering.indicators.iter().enumerate() {
            let unchanged = previous
                .as_ref()
                .and_then(|prev| prev.indicators.get(bay))
                .is_some_and(|prev| prev == state);
            if !unchanged {
                indicators.set_indicator(bay, *state)?;
            }
        }

        let lines_changed = previous
            .as_ref()
            .is_none_or(|prev| prev.lines != rendering.lines);
        if lines_changed {
            display.show(&rendering.lines)?;
        }

        self.last_pushed = Some(rendering.clone());
        Ok(())
    }

    fn fit(&self, line: String) -> String {
        line.chars().take(self.columns).collect()
    }
}

fn display_notice(notice: &Notice) -> String {
    match notice {
        Notice::LotFull => "No bay free".to_string(),
        Notice::Entered { bay } => format!("Bay {bay} parked"),
        Notice::Exited { bay, duration_secs } => {
            format!("Bay {bay} {}", format_hms(*duration_secs))
        }
        Notice::ActuatorFault { .. } => "Actuator fault".to_string(),
        Notice::SessionTimeout => "Timed out".to_string(),
        Notice::Override { angle } => format!("Rotate {angle}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::mock::{MockDisplay, MockIndicators};
    use crate::registry::EpisodeOrigin;

    fn registry() -> BayRegistry {
        let mut registry = BayRegistry::new(&[30, 90, 150]).expect("registry");
        let bay0 = registry.bay_index(0).expect("bay 0");
        let bay1 = registry.bay_index(1).expect("bay 1");
        registry.occupy(bay0, EpisodeOrigin::Session, 1_000);
        registry.set_sensed(bay1, Occupancy::Free);
        registry
    }

    fn idle_at(now_ms: u64) -> StatusContext<'static> {
        StatusContext {
            phase: Phase::Idle,
            notice: None,
            now_ms,
        }
    }

    #[test]
    fn indicators_distinguish_fault_from_free() {
        let reporter = StatusReporter::new(16);

        let rendering = reporter.render(&registry(), idle_at(2_000));

        assert_eq!(
            rendering.indicators,
            vec![
                IndicatorState::Unavailable,
                IndicatorState::Available,
                IndicatorState::Fault
            ]
        );
        assert_eq!(rendering.lines, vec!["Free 1/3", "Welcome"]);
    }

    #[test]
    fn report_lists_every_bay_with_live_duration() {
        let reporter = StatusReporter::new(16);
        let notice = Notice::LotFull;
        let ctx = StatusContext {
            phase: Phase::AwaitingAllocation,
            notice: Some(&notice),
            now_ms: 43_500,
        };

        let text = reporter.report(&registry(), ctx);

        assert_eq!(
            text,
            "STATE AWAITING_ALLOCATION\n\
             BAY 0 OCCUPIED 42s\n\
             BAY 1 FREE 0s\n\
             BAY 2 UNKNOWN 0s\n\
             NOTICE LOT FULL\n"
        );
    }

    #[test]
    fn exit_notice_shows_dwell_as_clock_time() {
        let reporter = StatusReporter::new(16);
        let notice = Notice::Exited {
            bay: 1,
            duration_secs: 3 * 3600 + 12 * 60 + 5,
        };
        let ctx = StatusContext {
            phase: Phase::Idle,
            notice: Some(&notice),
            now_ms: 0,
        };

        let rendering = reporter.render(&registry(), ctx);

        assert_eq!(rendering.lines[1], "Bay 1 03:12:05");
    }

    #[test]
    fn lines_are_truncated_to_display_width() {
        let reporter = StatusReporter::new(6);

        let rendering = reporter.render(&registry(), idle_at(0));

        assert_eq!(rendering.lines, vec!["Free 1", "Welcom"]);
    }

    #[test]
    fn apply_skips_unchanged_output() -> Result<(), AppError> {
        let mut reporter = StatusReporter::new(16);
        let mut indicators = MockIndicators::new(3);
        let mut display = MockDisplay::new();
        let registry = registry();
        let rendering = reporter.render(&registry, idle_at(0));

        reporter.apply(&rendering, &mut indicators, &mut display)?;
        reporter.apply(&rendering, &mut indicators, &mut display)?;

        assert_eq!(display.frame_count(), 1);
        assert_eq!(display.last_frame(), vec!["Free 1/3", "Welcome"]);
        assert_eq!(indicators.states()[2], IndicatorState::Fault);
        Ok(())
    }
}
