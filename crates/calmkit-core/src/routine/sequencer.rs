//! Routine sequencer.
//!
//! Runs a routine one step at a time. Each step gets a fresh single-phase
//! [`PhaseController`]; finished or skipped steps leave behind only a
//! [`StepResult`], never their controller.
//!
//! ## State Transitions
//!
//! ```text
//! StepIdle -> StepRunning <-> StepPaused
//!                  |
//!                  v
//!            (step finished) -> StepCompleted -> (advance) StepIdle
//!                  |               (auto-advance skips StepCompleted)
//!                  v
//!            RoutineCompleted
//! any non-terminal -> (cancel) Cancelled
//! ```
//!
//! ## Accounting
//!
//! A completed step contributes its full planned duration, a skipped step
//! the time actually spent on it, and the active step its live elapsed
//! time. Results of steps revisited with `go_to_previous_step` are dropped,
//! so nothing is counted twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::definition::{ActivityType, RoutineDefinition, RoutineStep};
use crate::clock::{ms_to_secs, SharedClock};
use crate::error::EngineError;
use crate::events::Event;
use crate::timer::{ControllerState, ControllerStatus, PhaseController, PhaseSequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerStatus {
    StepIdle,
    StepRunning,
    StepPaused,
    /// The step finished and the run waits for `advance()`.
    StepCompleted,
    RoutineCompleted,
    Cancelled,
}

impl SequencerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SequencerStatus::RoutineCompleted | SequencerStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SequencerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SequencerStatus::StepIdle => "step idle",
            SequencerStatus::StepRunning => "step running",
            SequencerStatus::StepPaused => "step paused",
            SequencerStatus::StepCompleted => "step completed",
            SequencerStatus::RoutineCompleted => "routine completed",
            SequencerStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Sequencing behaviour, normally built from [`Config`](crate::Config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Move to the next step as soon as one finishes.
    pub auto_advance: bool,
    /// Start the next step on its own once the grace delay has passed.
    pub auto_start_next: bool,
    /// Pause between a step finishing and the next one auto-starting.
    pub grace_delay_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            auto_advance: true,
            auto_start_next: true,
            grace_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub activity: ActivityType,
    pub planned_secs: u32,
    pub elapsed_ms: u64,
    pub outcome: StepOutcome,
}

impl StepResult {
    pub fn elapsed_secs(&self) -> f64 {
        ms_to_secs(self.elapsed_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineOutcome {
    Completed,
    Cancelled,
}

impl RoutineOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutineOutcome::Completed => "completed",
            RoutineOutcome::Cancelled => "cancelled",
        }
    }
}

/// End-of-run report, suitable for history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineSummary {
    pub routine_id: String,
    pub routine_name: String,
    pub outcome: RoutineOutcome,
    pub total_planned_secs: u64,
    pub total_elapsed_secs: f64,
    pub steps: Vec<StepResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RoutineSummary {
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Completed)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerState {
    pub status: SequencerStatus,
    pub current_step_index: usize,
    pub step_count: usize,
    pub current_step: RoutineStep,
    /// `None` once the run is over.
    pub step_state: Option<ControllerState>,
    pub total_elapsed_secs: f64,
    pub total_planned_secs: u64,
    pub auto_advance: bool,
    /// Clock instant at which the next step will auto-start.
    pub pending_start_at_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RoutineSequencer {
    routine: RoutineDefinition,
    config: SequencerConfig,
    clock: SharedClock,
    status: SequencerStatus,
    step_index: usize,
    controller: Option<PhaseController>,
    results: Vec<StepResult>,
    pending_start_at_ms: Option<u64>,
    started_at: DateTime<Utc>,
    summary: Option<RoutineSummary>,
}

impl RoutineSequencer {
    /// Snapshot `definition` and prepare step 0 in `StepIdle`.
    ///
    /// # Errors
    ///
    /// `InvalidRoutineDefinition` before any controller is built.
    pub fn start_routine(
        definition: &RoutineDefinition,
        config: SequencerConfig,
        clock: SharedClock,
    ) -> Result<Self, EngineError> {
        definition.validate()?;
        let routine = definition.clone();
        let controller = Some(Self::build_controller(&routine, 0, &clock)?);
        info!(
            routine = %routine.name,
            steps = routine.steps.len(),
            planned_secs = routine.total_planned_secs(),
            "routine run prepared"
        );
        Ok(Self {
            routine,
            config,
            clock,
            status: SequencerStatus::StepIdle,
            step_index: 0,
            controller,
            results: Vec::new(),
            pending_start_at_ms: None,
            started_at: Utc::now(),
            summary: None,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> SequencerStatus {
        self.status
    }

    pub fn routine(&self) -> &RoutineDefinition {
        &self.routine
    }

    pub fn config(&self) -> SequencerConfig {
        self.config
    }

    pub fn current_step_index(&self) -> usize {
        self.step_index
    }

    pub fn current_step(&self) -> &RoutineStep {
        &self.routine.steps[self.step_index]
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Available once the run completed or was cancelled.
    pub fn summary(&self) -> Option<&RoutineSummary> {
        self.summary.as_ref()
    }

    pub fn total_planned_secs(&self) -> u64 {
        self.routine.total_planned_secs()
    }

    pub fn total_elapsed_ms(&self) -> u64 {
        let finished: u64 = self.results.iter().map(|r| r.elapsed_ms).sum();
        let active = match self.status {
            SequencerStatus::StepIdle
            | SequencerStatus::StepRunning
            | SequencerStatus::StepPaused => {
                self.controller.as_ref().map_or(0, PhaseController::elapsed_ms)
            }
            _ => 0,
        };
        finished + active
    }

    pub fn state(&self) -> SequencerState {
        SequencerState {
            status: self.status,
            current_step_index: self.step_index,
            step_count: self.routine.steps.len(),
            current_step: self.current_step().clone(),
            step_state: self.controller.as_ref().map(PhaseController::state),
            total_elapsed_secs: ms_to_secs(self.total_elapsed_ms()),
            total_planned_secs: self.total_planned_secs(),
            auto_advance: self.config.auto_advance,
            pending_start_at_ms: self.pending_start_at_ms,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start the current step now. Cancels a pending auto-start.
    pub fn start_step(&mut self) -> Result<Vec<Event>, EngineError> {
        self.require(&[SequencerStatus::StepIdle], "start step")?;
        self.pending_start_at_ms = None;
        let at_ms = self.now_ms();
        self.begin_step(at_ms)
    }

    pub fn pause_step(&mut self) -> Result<Vec<Event>, EngineError> {
        self.require(&[SequencerStatus::StepRunning], "pause step")?;
        let mut events = self.controller_mut()?.pause()?;
        self.after_controller_change(&mut events);
        Ok(events)
    }

    pub fn resume_step(&mut self) -> Result<Vec<Event>, EngineError> {
        self.require(&[SequencerStatus::StepPaused], "resume step")?;
        let events = self.controller_mut()?.resume()?;
        self.status = SequencerStatus::StepRunning;
        Ok(events)
    }

    /// Abandon the current step and move on. The time spent counts toward
    /// the routine total but the step is not marked completed.
    ///
    /// # Errors
    ///
    /// `NoNextStep` on the last step.
    pub fn skip_step(&mut self) -> Result<Vec<Event>, EngineError> {
        self.require(
            &[
                SequencerStatus::StepIdle,
                SequencerStatus::StepRunning,
                SequencerStatus::StepPaused,
            ],
            "skip step",
        )?;
        if self.step_index + 1 >= self.routine.steps.len() {
            return Err(EngineError::NoNextStep);
        }
        let planned_ms = u64::from(self.current_step().duration_secs) * 1000;
        let controller = self.controller_mut()?;
        let elapsed_ms = controller.live_elapsed_ms().min(planned_ms);
        let at_ms = controller.now_ms();

        let from = self.step_index;
        self.results.push(StepResult {
            index: from,
            activity: self.current_step().activity.clone(),
            planned_secs: self.current_step().duration_secs,
            elapsed_ms,
            outcome: StepOutcome::Skipped,
        });
        debug!(step = from, elapsed_ms, "step skipped");
        let mut events = vec![Event::StepSkipped {
            step_index: from,
            elapsed_secs: ms_to_secs(elapsed_ms),
            at_ms,
        }];
        self.move_to(from + 1)?;
        if self.config.auto_advance && self.config.auto_start_next {
            self.pending_start_at_ms = Some(at_ms.saturating_add(self.config.grace_delay_ms));
        }
        events.extend(self.tick());
        Ok(events)
    }

    /// Return to the previous step and rebuild it fresh. Only allowed
    /// between steps.
    ///
    /// # Errors
    ///
    /// `NoPreviousStep` on the first step.
    pub fn go_to_previous_step(&mut self) -> Result<Vec<Event>, EngineError> {
        self.require(&[SequencerStatus::StepIdle], "go to previous step")?;
        if self.step_index == 0 {
            return Err(EngineError::NoPreviousStep);
        }
        let from = self.step_index;
        let to = from - 1;
        self.move_to(to)?;
        self.results.truncate(to);
        self.pending_start_at_ms = None;
        debug!(from, to, "stepped back");
        Ok(vec![Event::StepRewound {
            from_step: from,
            to_step: to,
            at_ms: self.now_ms(),
        }])
    }

    /// Confirm a finished step and move to the next one. With
    /// `auto_start_next` the confirmation also starts it.
    pub fn advance(&mut self) -> Result<Vec<Event>, EngineError> {
        self.require(&[SequencerStatus::StepCompleted], "advance")?;
        self.move_to(self.step_index + 1)?;
        if self.config.auto_start_next {
            let at_ms = self.now_ms();
            return self.begin_step(at_ms);
        }
        Ok(Vec::new())
    }

    /// End the run early. The partial total is kept in the summary.
    pub fn cancel(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::transition("cancel", self.status));
        }
        let at_ms = self.now_ms();
        if matches!(
            self.status,
            SequencerStatus::StepRunning | SequencerStatus::StepPaused
        ) {
            let planned_ms = u64::from(self.current_step().duration_secs) * 1000;
            let elapsed_ms = self.controller_mut()?.live_elapsed_ms().min(planned_ms);
            // The interrupted step is never counted as completed.
            let step = self.current_step().clone();
            self.results.push(StepResult {
                index: self.step_index,
                activity: step.activity,
                planned_secs: step.duration_secs,
                elapsed_ms,
                outcome: StepOutcome::Skipped,
            });
        }
        let mut events = Vec::new();
        self.finish(RoutineOutcome::Cancelled, at_ms, &mut events);
        Ok(events)
    }

    /// Recompute the active step, handle completions and due auto-starts.
    ///
    /// A single late call may finish several steps; each later step starts
    /// from the previous one's true completion instant plus the grace delay.
    pub fn tick(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.status {
                SequencerStatus::StepRunning => {
                    let Some(controller) = self.controller.as_mut() else {
                        break;
                    };
                    events.extend(controller.tick());
                    if controller.status() != ControllerStatus::Completed {
                        break;
                    }
                    self.on_step_completed(&mut events);
                }
                SequencerStatus::StepIdle => {
                    let Some(due_ms) = self.pending_start_at_ms else {
                        break;
                    };
                    if self.now_ms() < due_ms {
                        break;
                    }
                    self.pending_start_at_ms = None;
                    match self.begin_step(due_ms) {
                        Ok(started) => events.extend(started),
                        Err(_) => break,
                    }
                }
                _ => break,
            }
        }
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn require(
        &self,
        allowed: &[SequencerStatus],
        operation: &'static str,
    ) -> Result<(), EngineError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(EngineError::transition(operation, self.status))
        }
    }

    /// Clock reading through the step controller, so backward jumps are
    /// clamped the same way for the sequencer as for the step.
    fn now_ms(&mut self) -> u64 {
        match self.controller.as_mut() {
            Some(controller) => controller.now_ms(),
            None => self.clock.now_ms(),
        }
    }

    fn controller_mut(&mut self) -> Result<&mut PhaseController, EngineError> {
        let status = self.status;
        self.controller
            .as_mut()
            .ok_or_else(|| EngineError::transition("use step controller", status))
    }

    fn build_controller(
        routine: &RoutineDefinition,
        index: usize,
        clock: &SharedClock,
    ) -> Result<PhaseController, EngineError> {
        let step = routine.steps.get(index).ok_or(EngineError::NoNextStep)?;
        let sequence = PhaseSequence::countdown(step.display_name(), step.duration_secs)?;
        Ok(PhaseController::new(sequence, clock.clone()))
    }

    /// Discard the current controller and prepare `index` in `StepIdle`.
    fn move_to(&mut self, index: usize) -> Result<(), EngineError> {
        let mut controller = Self::build_controller(&self.routine, index, &self.clock)?;
        if let Some(previous) = self.controller.as_ref() {
            controller.seed_reading(previous.observed_at_ms());
        }
        self.controller = Some(controller);
        self.step_index = index;
        self.status = SequencerStatus::StepIdle;
        Ok(())
    }

    fn begin_step(&mut self, at_ms: u64) -> Result<Vec<Event>, EngineError> {
        let step = self.current_step().clone();
        let index = self.step_index;
        let started = self.controller_mut()?.start_at(at_ms)?;
        info!(step = index, activity = %step.activity, "step started");
        let mut events = vec![Event::StepStarted {
            step_index: index,
            activity: step.activity,
            duration_secs: step.duration_secs,
            at_ms,
        }];
        events.extend(started);
        self.status = SequencerStatus::StepRunning;
        self.after_controller_change(&mut events);
        Ok(events)
    }

    fn after_controller_change(&mut self, events: &mut Vec<Event>) {
        let Some(status) = self.controller.as_ref().map(PhaseController::status) else {
            return;
        };
        match status {
            ControllerStatus::Running => self.status = SequencerStatus::StepRunning,
            ControllerStatus::Paused => self.status = SequencerStatus::StepPaused,
            ControllerStatus::Completed => {
                self.status = SequencerStatus::StepRunning;
                self.on_step_completed(events);
            }
            ControllerStatus::Idle => self.status = SequencerStatus::StepIdle,
        }
    }

    fn on_step_completed(&mut self, events: &mut Vec<Event>) {
        let step = self.current_step().clone();
        let index = self.step_index;
        let completed_at = match self
            .controller
            .as_ref()
            .and_then(PhaseController::completed_at_ms)
        {
            Some(at_ms) => at_ms,
            None => self.now_ms(),
        };

        self.results.push(StepResult {
            index,
            activity: step.activity.clone(),
            planned_secs: step.duration_secs,
            elapsed_ms: u64::from(step.duration_secs) * 1000,
            outcome: StepOutcome::Completed,
        });
        info!(step = index, "step completed");
        events.push(Event::StepCompleted {
            step_index: index,
            activity: step.activity,
            at_ms: completed_at,
        });

        if index + 1 >= self.routine.steps.len() {
            self.finish(RoutineOutcome::Completed, completed_at, events);
            return;
        }
        if !self.config.auto_advance {
            self.status = SequencerStatus::StepCompleted;
            return;
        }
        if self.move_to(index + 1).is_err() {
            return;
        }
        if self.config.auto_start_next {
            self.pending_start_at_ms =
                Some(completed_at.saturating_add(self.config.grace_delay_ms));
        }
    }

    fn finish(&mut self, outcome: RoutineOutcome, at_ms: u64, events: &mut Vec<Event>) {
        let total_elapsed_ms: u64 = self.results.iter().map(|r| r.elapsed_ms).sum();
        self.status = match outcome {
            RoutineOutcome::Completed => SequencerStatus::RoutineCompleted,
            RoutineOutcome::Cancelled => SequencerStatus::Cancelled,
        };
        self.controller = None;
        self.pending_start_at_ms = None;

        let summary = RoutineSummary {
            routine_id: self.routine.id.clone(),
            routine_name: self.routine.name.clone(),
            outcome,
            total_planned_secs: self.total_planned_secs(),
            total_elapsed_secs: ms_to_secs(total_elapsed_ms),
            steps: self.results.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        };
        info!(
            routine = %summary.routine_name,
            outcome = outcome.as_str(),
            planned_secs = summary.total_planned_secs,
            elapsed_secs = summary.total_elapsed_secs,
            "routine finished"
        );
        events.push(Event::routine_finished(
            outcome,
            summary.routine_id.clone(),
            summary.total_planned_secs,
            summary.total_elapsed_secs,
            at_ms,
        ));
        self.summary = Some(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn routine(durations: &[u32]) -> RoutineDefinition {
        RoutineDefinition::new(
            "test",
            durations
                .iter()
                .map(|&d| RoutineStep::new(ActivityType::Breathing, d))
                .collect(),
        )
    }

    fn manual() -> SequencerConfig {
        SequencerConfig {
            auto_advance: true,
            auto_start_next: false,
            grace_delay_ms: 2_000,
        }
    }

    #[test]
    fn invalid_definition_is_rejected() {
        let clock = ManualClock::new(0);
        let err = RoutineSequencer::start_routine(&routine(&[]), manual(), clock.shared())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRoutineDefinition(_)));
        assert!(
            RoutineSequencer::start_routine(&routine(&[30, 0]), manual(), clock.shared()).is_err()
        );
    }

    #[test]
    fn skipped_step_counts_time_spent() {
        let clock = ManualClock::new(0);
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[60, 90]), manual(), clock.shared()).unwrap();
        seq.start_step().unwrap();
        clock.advance_secs(10.0);
        seq.tick();
        seq.skip_step().unwrap();

        let state = seq.state();
        assert_eq!(state.current_step_index, 1);
        assert_eq!(state.status, SequencerStatus::StepIdle);
        assert_eq!(state.total_elapsed_secs, 10.0);
        assert_eq!(seq.results()[0].outcome, StepOutcome::Skipped);

        seq.start_step().unwrap();
        clock.advance_secs(95.0);
        let events = seq.tick();
        assert!(matches!(events.last(), Some(Event::RoutineCompleted { .. })));

        let summary = seq.summary().unwrap();
        assert_eq!(summary.outcome, RoutineOutcome::Completed);
        assert_eq!(summary.total_planned_secs, 150);
        assert_eq!(summary.total_elapsed_secs, 100.0);
        assert_eq!(summary.completed_steps(), 1);
    }

    #[test]
    fn skip_on_last_step_is_rejected() {
        let clock = ManualClock::new(0);
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[30]), manual(), clock.shared()).unwrap();
        assert_eq!(seq.skip_step(), Err(EngineError::NoNextStep));
        assert_eq!(seq.status(), SequencerStatus::StepIdle);
    }

    #[test]
    fn previous_step_only_between_steps() {
        let clock = ManualClock::new(0);
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[30, 30]), manual(), clock.shared()).unwrap();
        assert_eq!(seq.go_to_previous_step(), Err(EngineError::NoPreviousStep));

        seq.start_step().unwrap();
        clock.advance_secs(30.0);
        seq.tick();
        assert_eq!(seq.current_step_index(), 1);
        assert_eq!(seq.state().total_elapsed_secs, 30.0);

        seq.start_step().unwrap();
        assert!(matches!(
            seq.go_to_previous_step(),
            Err(EngineError::InvalidStateTransition { .. })
        ));
        seq.cancel().unwrap();
        assert!(seq.go_to_previous_step().is_err());
    }

    #[test]
    fn going_back_drops_the_revisited_result() {
        let clock = ManualClock::new(0);
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[20, 40]), manual(), clock.shared()).unwrap();
        seq.start_step().unwrap();
        clock.advance_secs(25.0);
        seq.tick();
        assert_eq!(seq.results().len(), 1);

        seq.go_to_previous_step().unwrap();
        assert_eq!(seq.current_step_index(), 0);
        assert!(seq.results().is_empty());
        assert_eq!(seq.state().total_elapsed_secs, 0.0);
        assert_eq!(
            seq.state().step_state.unwrap().status,
            ControllerStatus::Idle
        );
    }

    #[test]
    fn auto_start_chains_steps_from_true_completion() {
        let clock = ManualClock::new(0);
        let config = SequencerConfig::default();
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[10, 10, 10]), config, clock.shared())
                .unwrap();
        seq.start_step().unwrap();

        // One poll long after everything should have finished:
        // 0-10 step 0, grace to 12, 12-22 step 1, grace to 24, 24-34 step 2.
        clock.advance_secs(100.0);
        let events = seq.tick();

        let starts: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Event::StepStarted { at_ms, .. } => Some(*at_ms),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![12_000, 24_000]);
        assert_eq!(
            events.last(),
            Some(&Event::RoutineCompleted {
                routine_id: seq.routine().id.clone(),
                total_planned_secs: 30,
                total_elapsed_secs: 30.0,
                at_ms: 34_000,
            })
        );
        assert_eq!(seq.status(), SequencerStatus::RoutineCompleted);
    }

    #[test]
    fn grace_delay_holds_next_step_idle() {
        let clock = ManualClock::new(0);
        let mut seq = RoutineSequencer::start_routine(
            &routine(&[5, 5]),
            SequencerConfig::default(),
            clock.shared(),
        )
        .unwrap();
        seq.start_step().unwrap();
        clock.advance_secs(6.0);
        seq.tick();
        let state = seq.state();
        assert_eq!(state.status, SequencerStatus::StepIdle);
        assert_eq!(state.current_step_index, 1);
        assert_eq!(state.pending_start_at_ms, Some(7_000));

        clock.advance_secs(1.5);
        seq.tick();
        let state = seq.state();
        assert_eq!(state.status, SequencerStatus::StepRunning);
        assert_eq!(state.step_state.unwrap().total_elapsed_secs, 0.5);
        assert_eq!(state.total_elapsed_secs, 5.5);
    }

    #[test]
    fn huge_grace_delay_never_starts_the_next_step() {
        let clock = ManualClock::new(0);
        let config = SequencerConfig {
            grace_delay_ms: u64::MAX,
            ..SequencerConfig::default()
        };
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[5, 5, 5]), config, clock.shared()).unwrap();
        seq.start_step().unwrap();
        clock.advance_secs(6.0);
        seq.tick();
        let state = seq.state();
        assert_eq!(state.status, SequencerStatus::StepIdle);
        assert_eq!(state.current_step_index, 1);
        assert_eq!(state.pending_start_at_ms, Some(u64::MAX));

        clock.advance_secs(1_000_000.0);
        assert!(seq.tick().is_empty());
        seq.skip_step().unwrap();
        assert_eq!(seq.current_step_index(), 2);
        assert_eq!(seq.state().pending_start_at_ms, Some(u64::MAX));
        assert_eq!(seq.status(), SequencerStatus::StepIdle);
    }

    #[test]
    fn backward_clock_between_steps_is_clamped() {
        let clock = ManualClock::new(0);
        let mut seq = RoutineSequencer::start_routine(
            &routine(&[10, 10, 10]),
            SequencerConfig::default(),
            clock.shared(),
        )
        .unwrap();
        seq.start_step().unwrap();
        clock.set_ms(11_000);
        seq.tick();
        assert_eq!(seq.state().pending_start_at_ms, Some(12_000));

        clock.set_ms(5_000);
        assert!(seq.tick().is_empty());
        assert_eq!(seq.status(), SequencerStatus::StepIdle);
        clock.set_ms(11_500);
        assert!(seq.tick().is_empty());

        clock.set_ms(3_000);
        let events = seq.skip_step().unwrap();
        assert!(matches!(
            events.as_slice(),
            [Event::StepSkipped { step_index: 1, at_ms: 11_500, .. }]
        ));
        assert_eq!(seq.state().pending_start_at_ms, Some(13_500));

        let events = seq.cancel().unwrap();
        assert_eq!(events[0].at_ms(), 11_500);
    }

    #[test]
    fn manual_advance_waits_for_confirmation() {
        let clock = ManualClock::new(0);
        let config = SequencerConfig {
            auto_advance: false,
            auto_start_next: true,
            grace_delay_ms: 2_000,
        };
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[5, 5]), config, clock.shared()).unwrap();
        seq.start_step().unwrap();
        clock.advance_secs(8.0);
        seq.tick();
        assert_eq!(seq.status(), SequencerStatus::StepCompleted);
        assert_eq!(seq.current_step_index(), 0);
        assert_eq!(seq.state().total_elapsed_secs, 5.0);
        assert!(seq.skip_step().is_err());

        clock.advance_secs(30.0);
        seq.tick();
        assert_eq!(seq.status(), SequencerStatus::StepCompleted);

        let events = seq.advance().unwrap();
        assert!(matches!(events.first(), Some(Event::StepStarted { step_index: 1, .. })));
        assert_eq!(seq.status(), SequencerStatus::StepRunning);
    }

    #[test]
    fn pause_and_resume_step() {
        let clock = ManualClock::new(0);
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[60, 60]), manual(), clock.shared()).unwrap();
        assert!(seq.pause_step().is_err());
        seq.start_step().unwrap();
        clock.advance_secs(20.0);
        seq.pause_step().unwrap();
        assert_eq!(seq.status(), SequencerStatus::StepPaused);
        clock.advance_secs(500.0);
        seq.tick();
        seq.resume_step().unwrap();
        clock.advance_secs(5.0);
        seq.tick();
        assert_eq!(seq.state().total_elapsed_secs, 25.0);
    }

    #[test]
    fn cancel_reports_partial_total() {
        let clock = ManualClock::new(0);
        let mut seq =
            RoutineSequencer::start_routine(&routine(&[30, 60]), manual(), clock.shared()).unwrap();
        seq.start_step().unwrap();
        clock.advance_secs(30.0);
        seq.tick();
        seq.start_step().unwrap();
        clock.advance_secs(12.0);

        let events = seq.cancel().unwrap();
        assert!(matches!(
            events.as_slice(),
            [Event::RoutineCancelled {
                total_planned_secs: 90,
                ..
            }]
        ));
        let summary = seq.summary().unwrap();
        assert_eq!(summary.outcome, RoutineOutcome::Cancelled);
        assert_eq!(summary.total_elapsed_secs, 42.0);
        assert_eq!(seq.status(), SequencerStatus::Cancelled);
        assert!(seq.state().step_state.is_none());
        assert!(seq.cancel().is_err());
        assert!(seq.start_step().is_err());
        assert!(seq.tick().is_empty());
    }
}
