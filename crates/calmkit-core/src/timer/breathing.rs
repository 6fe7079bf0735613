//! Breathing patterns.
//!
//! A breathing controller is a [`PhaseController`] whose phase table comes
//! from a small fixed catalog. The table can only be swapped while the
//! controller is idle or completed, so an exhale in progress is never
//! reinterpreted under another pattern's durations.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::controller::{ControllerState, ControllerStatus, PhaseController};
use super::phase::{PhaseSequence, PhaseSpec, Repeat};
use crate::clock::SharedClock;
use crate::error::EngineError;
use crate::events::Event;

/// What the host should animate for the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreathCue {
    Inhale,
    Hold,
    Exhale,
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreathingPattern {
    /// Inhale 4, hold 4, exhale 4, hold 4.
    Box,
    /// Inhale 4, hold 7, exhale 8. No trailing hold.
    #[serde(rename = "4-7-8")]
    FourSevenEight,
    /// Inhale 5, exhale 5.
    Coherent,
    /// Inhale 4, hold 4, exhale 4.
    Triangle,
}

impl BreathingPattern {
    pub const ALL: [BreathingPattern; 4] = [
        BreathingPattern::Box,
        BreathingPattern::FourSevenEight,
        BreathingPattern::Coherent,
        BreathingPattern::Triangle,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BreathingPattern::Box => "box",
            BreathingPattern::FourSevenEight => "4-7-8",
            BreathingPattern::Coherent => "coherent",
            BreathingPattern::Triangle => "triangle",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BreathingPattern::Box => "Box Breathing",
            BreathingPattern::FourSevenEight => "4-7-8 Breathing",
            BreathingPattern::Coherent => "Coherent Breathing",
            BreathingPattern::Triangle => "Triangle Breathing",
        }
    }

    fn table(self) -> &'static [(BreathCue, u32)] {
        match self {
            BreathingPattern::Box => &[
                (BreathCue::Inhale, 4),
                (BreathCue::Hold, 4),
                (BreathCue::Exhale, 4),
                (BreathCue::Hold, 4),
            ],
            BreathingPattern::FourSevenEight => &[
                (BreathCue::Inhale, 4),
                (BreathCue::Hold, 7),
                (BreathCue::Exhale, 8),
            ],
            BreathingPattern::Coherent => &[(BreathCue::Inhale, 5), (BreathCue::Exhale, 5)],
            BreathingPattern::Triangle => &[
                (BreathCue::Inhale, 4),
                (BreathCue::Hold, 4),
                (BreathCue::Exhale, 4),
            ],
        }
    }

    pub fn cues(self) -> Vec<BreathCue> {
        self.table().iter().map(|(cue, _)| *cue).collect()
    }

    pub fn phases(self) -> Vec<PhaseSpec> {
        self.table()
            .iter()
            .map(|(cue, secs)| PhaseSpec::new(cue.name(), *secs))
            .collect()
    }

    /// Phase table for `rounds` cycles, or forever when `None`.
    pub fn sequence(self, rounds: Option<u32>) -> Result<PhaseSequence, EngineError> {
        let repeat = rounds.map_or(Repeat::Forever, Repeat::Times);
        PhaseSequence::new(self.phases(), repeat)
    }
}

impl BreathCue {
    pub fn name(self) -> &'static str {
        match self {
            BreathCue::Inhale => "inhale",
            BreathCue::Hold => "hold",
            BreathCue::Exhale => "exhale",
            BreathCue::Rest => "rest",
        }
    }
}

impl std::fmt::Display for BreathingPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for BreathingPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "box" => Ok(BreathingPattern::Box),
            "4-7-8" | "478" | "four-seven-eight" => Ok(BreathingPattern::FourSevenEight),
            "coherent" => Ok(BreathingPattern::Coherent),
            "triangle" => Ok(BreathingPattern::Triangle),
            other => Err(format!(
                "unknown breathing pattern '{other}' (expected box, 4-7-8, coherent or triangle)"
            )),
        }
    }
}

/// Phase controller bound to a catalog pattern.
#[derive(Debug, Clone)]
pub struct BreathingController {
    pattern: BreathingPattern,
    rounds: Option<u32>,
    inner: PhaseController,
}

impl BreathingController {
    /// # Errors
    ///
    /// `InvalidPhaseSequence` if `rounds` is `Some(0)`.
    pub fn new(
        pattern: BreathingPattern,
        rounds: Option<u32>,
        clock: SharedClock,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            pattern,
            rounds,
            inner: PhaseController::new(pattern.sequence(rounds)?, clock),
        })
    }

    pub fn pattern(&self) -> BreathingPattern {
        self.pattern
    }

    pub fn rounds(&self) -> Option<u32> {
        self.rounds
    }

    /// Cue for the current phase.
    pub fn current_cue(&self) -> BreathCue {
        let index = self.inner.state().current_phase_index;
        self.pattern.table()[index].0
    }

    /// # Errors
    ///
    /// `InvalidStateTransition` while a session is running or paused; the
    /// caller must `stop()` first.
    pub fn select_pattern(&mut self, pattern: BreathingPattern) -> Result<(), EngineError> {
        self.ensure_reconfigurable("switch breathing pattern")?;
        self.inner.set_sequence(pattern.sequence(self.rounds)?)?;
        self.pattern = pattern;
        Ok(())
    }

    /// # Errors
    ///
    /// Same rule as [`select_pattern`](Self::select_pattern).
    pub fn set_rounds(&mut self, rounds: Option<u32>) -> Result<(), EngineError> {
        self.ensure_reconfigurable("change breathing rounds")?;
        self.inner.set_sequence(self.pattern.sequence(rounds)?)?;
        self.rounds = rounds;
        Ok(())
    }

    pub fn start(&mut self) -> Result<Vec<Event>, EngineError> {
        self.inner.start()
    }

    pub fn pause(&mut self) -> Result<Vec<Event>, EngineError> {
        self.inner.pause()
    }

    pub fn resume(&mut self) -> Result<Vec<Event>, EngineError> {
        self.inner.resume()
    }

    pub fn stop(&mut self) -> Result<Vec<Event>, EngineError> {
        self.inner.stop()
    }

    pub fn tick(&mut self) -> Vec<Event> {
        self.inner.tick()
    }

    pub fn state(&self) -> ControllerState {
        self.inner.state()
    }

    pub fn controller(&self) -> &PhaseController {
        &self.inner
    }

    fn ensure_reconfigurable(&self, operation: &'static str) -> Result<(), EngineError> {
        match self.inner.status() {
            status @ (ControllerStatus::Running | ControllerStatus::Paused) => {
                Err(EngineError::transition(operation, status))
            }
            ControllerStatus::Idle | ControllerStatus::Completed => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn catalog_durations() {
        let box_total: u32 = BreathingPattern::Box.phases().iter().map(|p| p.duration_secs).sum();
        assert_eq!(box_total, 16);
        let names: Vec<_> = BreathingPattern::FourSevenEight
            .phases()
            .into_iter()
            .map(|p| (p.name, p.duration_secs))
            .collect();
        assert_eq!(
            names,
            vec![
                ("inhale".to_string(), 4),
                ("hold".to_string(), 7),
                ("exhale".to_string(), 8)
            ]
        );
    }

    #[test]
    fn box_holds_after_inhale_and_exhale() {
        assert_eq!(
            BreathingPattern::Box.cues(),
            vec![BreathCue::Inhale, BreathCue::Hold, BreathCue::Exhale, BreathCue::Hold]
        );
        let names: Vec<_> = BreathingPattern::Box
            .phases()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["inhale", "hold", "exhale", "hold"]);

        let clock = ManualClock::new(0);
        let mut b = BreathingController::new(BreathingPattern::Box, None, clock.shared()).unwrap();
        b.start().unwrap();
        clock.advance_secs(13.0);
        b.tick();
        assert_eq!(b.current_cue(), BreathCue::Hold);
        assert_eq!(b.controller().current_phase().name, "hold");
    }

    #[test]
    fn pattern_parses_from_keys() {
        for pattern in BreathingPattern::ALL {
            assert_eq!(pattern.key().parse::<BreathingPattern>(), Ok(pattern));
        }
        assert!("square".parse::<BreathingPattern>().is_err());
    }

    #[test]
    fn cue_follows_phase() {
        let clock = ManualClock::new(0);
        let mut b = BreathingController::new(BreathingPattern::FourSevenEight, None, clock.shared())
            .unwrap();
        b.start().unwrap();
        assert_eq!(b.current_cue(), BreathCue::Inhale);
        clock.advance_secs(12.0);
        b.tick();
        assert_eq!(b.current_cue(), BreathCue::Exhale);
        clock.advance_secs(8.0);
        b.tick();
        assert_eq!(b.current_cue(), BreathCue::Inhale);
        assert_eq!(b.state().cycle_count, 1);
    }

    #[test]
    fn switching_pattern_requires_stop() {
        let clock = ManualClock::new(0);
        let mut b = BreathingController::new(BreathingPattern::Box, None, clock.shared()).unwrap();
        b.start().unwrap();
        clock.advance_secs(9.0);
        b.tick();
        assert!(b.select_pattern(BreathingPattern::Coherent).is_err());
        b.pause().unwrap();
        assert!(b.select_pattern(BreathingPattern::Coherent).is_err());
        assert_eq!(b.pattern(), BreathingPattern::Box);
        assert_eq!(b.current_cue(), BreathCue::Exhale);

        b.stop().unwrap();
        b.select_pattern(BreathingPattern::Coherent).unwrap();
        assert_eq!(b.pattern(), BreathingPattern::Coherent);
        assert_eq!(b.controller().sequence().len(), 2);
    }

    #[test]
    fn rounds_complete_the_session() {
        let clock = ManualClock::new(0);
        let mut b =
            BreathingController::new(BreathingPattern::Coherent, Some(3), clock.shared()).unwrap();
        b.start().unwrap();
        clock.advance_secs(31.0);
        b.tick();
        assert_eq!(b.state().status, ControllerStatus::Completed);
        assert_eq!(b.state().cycle_count, 3);
        assert!(BreathingController::new(BreathingPattern::Box, Some(0), clock.shared()).is_err());
    }
}
