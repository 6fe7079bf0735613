//! Timed phase controller.
//!
//! A wall-clock-based state machine. It owns no thread and schedules no
//! callbacks: the host calls `tick()` from its render/poll loop, at whatever
//! rate it manages, and every call recomputes progress from the clock and
//! the run's pause intervals.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!            |
//!            v
//!        Completed -> (start) Running
//! any non-Idle -> (stop) Idle
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut controller = PhaseController::new(sequence, clock);
//! controller.start()?;
//! // In the host loop:
//! for event in controller.tick() { /* cue sounds */ }
//! render(controller.state());
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::phase::{PhaseSequence, PhaseSpec, Repeat};
use super::run_record::{RunRecord, RunStatus};
use crate::clock::{ms_to_secs, SharedClock};
use crate::error::EngineError;
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

impl std::fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControllerStatus::Idle => "idle",
            ControllerStatus::Running => "running",
            ControllerStatus::Paused => "paused",
            ControllerStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Read-only snapshot handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub status: ControllerStatus,
    pub current_phase_index: usize,
    pub phase_name: String,
    pub phase_duration_secs: u32,
    pub phase_elapsed_secs: f64,
    pub phase_remaining_secs: f64,
    pub total_elapsed_secs: f64,
    pub cycle_count: u32,
    pub run_id: u64,
    pub degraded: bool,
}

impl ControllerState {
    /// 0.0 .. 1.0 progress within the current phase.
    pub fn phase_progress(&self) -> f64 {
        if self.phase_duration_secs == 0 {
            return 0.0;
        }
        (self.phase_elapsed_secs / f64::from(self.phase_duration_secs)).min(1.0)
    }
}

/// Core phase controller.
#[derive(Debug, Clone)]
pub struct PhaseController {
    sequence: PhaseSequence,
    clock: SharedClock,
    status: ControllerStatus,
    phase_index: usize,
    /// Active elapsed time at which the current phase began.
    phase_started_ms: u64,
    /// Active elapsed time as of the last clock reading.
    elapsed_ms: u64,
    cycle_count: u32,
    run: Option<RunRecord>,
    run_id: u64,
    last_reading_ms: Option<u64>,
    anomaly_reported: bool,
}

impl PhaseController {
    /// Create a controller in the `Idle` state.
    pub fn new(sequence: PhaseSequence, clock: SharedClock) -> Self {
        Self {
            sequence,
            clock,
            status: ControllerStatus::Idle,
            phase_index: 0,
            phase_started_ms: 0,
            elapsed_ms: 0,
            cycle_count: 0,
            run: None,
            run_id: 0,
            last_reading_ms: None,
            anomaly_reported: false,
        }
    }

    /// Convenience constructor for a single-phase countdown.
    pub fn countdown(
        name: impl Into<String>,
        duration_secs: u32,
        clock: SharedClock,
    ) -> Result<Self, EngineError> {
        Ok(Self::new(
            PhaseSequence::countdown(name, duration_secs)?,
            clock,
        ))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> ControllerStatus {
        self.status
    }

    pub fn sequence(&self) -> &PhaseSequence {
        &self.sequence
    }

    pub fn current_phase(&self) -> &PhaseSpec {
        // phase_index is kept within bounds and the sequence is non-empty.
        &self.sequence.phases()[self.phase_index]
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// The current or most recent run, if any.
    pub fn run_record(&self) -> Option<&RunRecord> {
        self.run.as_ref()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Last clock reading the controller accepted.
    pub fn observed_at_ms(&self) -> u64 {
        self.last_reading_ms.unwrap_or(0)
    }

    /// Clock instant at which the current run completed.
    pub fn completed_at_ms(&self) -> Option<u64> {
        if self.status != ControllerStatus::Completed {
            return None;
        }
        self.run.as_ref().and_then(|r| r.finished_at_ms)
    }

    pub fn is_degraded(&self) -> bool {
        self.run.as_ref().is_some_and(|r| r.degraded)
    }

    /// Snapshot as of the last `tick()` or command. Does not read the clock.
    pub fn state(&self) -> ControllerState {
        let phase = self.current_phase();
        let phase_elapsed_ms = self.elapsed_ms.saturating_sub(self.phase_started_ms);
        ControllerState {
            status: self.status,
            current_phase_index: self.phase_index,
            phase_name: phase.name.clone(),
            phase_duration_secs: phase.duration_secs,
            phase_elapsed_secs: ms_to_secs(phase_elapsed_ms),
            phase_remaining_secs: ms_to_secs(phase.duration_ms().saturating_sub(phase_elapsed_ms)),
            total_elapsed_secs: ms_to_secs(self.elapsed_ms),
            cycle_count: self.cycle_count,
            run_id: self.run_id,
            degraded: self.is_degraded(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a new run from the first phase.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` while `Running` or `Paused`.
    pub fn start(&mut self) -> Result<Vec<Event>, EngineError> {
        self.ensure_startable()?;
        let mut events = Vec::new();
        let now = self.read_clock(&mut events);
        self.begin_run(now, &mut events);
        Ok(events)
    }

    /// Begin a run whose start instant lies at or before now, then catch up.
    pub(crate) fn start_at(&mut self, at_ms: u64) -> Result<Vec<Event>, EngineError> {
        self.ensure_startable()?;
        let mut events = Vec::new();
        let now = self.read_clock(&mut events);
        self.begin_run(at_ms.min(now), &mut events);
        self.advance_to(now, &mut events);
        Ok(events)
    }

    /// Freeze progress.
    ///
    /// Pending transitions are flushed first. If that flush completes the
    /// run, the completion events are returned and no pause is opened.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless `Running`.
    pub fn pause(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.status != ControllerStatus::Running {
            return Err(EngineError::transition("pause", self.status));
        }
        let mut events = Vec::new();
        let now = self.read_clock(&mut events);
        self.advance_to(now, &mut events);
        if self.status != ControllerStatus::Running {
            return Ok(events);
        }
        if let Some(run) = self.run.as_mut() {
            run.open_pause(now);
        }
        self.status = ControllerStatus::Paused;
        debug!(run_id = self.run_id, elapsed_ms = self.elapsed_ms, "controller paused");
        events.push(Event::TimerPaused {
            elapsed_secs: ms_to_secs(self.elapsed_ms),
            at_ms: now,
        });
        Ok(events)
    }

    /// Continue exactly where the pause left off.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless `Paused`.
    pub fn resume(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.status != ControllerStatus::Paused {
            return Err(EngineError::transition("resume", self.status));
        }
        let mut events = Vec::new();
        let now = self.read_clock(&mut events);
        let paused_ms = self.run.as_mut().map_or(0, |run| run.close_pause(now));
        self.status = ControllerStatus::Running;
        debug!(run_id = self.run_id, paused_ms, "controller resumed");
        events.push(Event::TimerResumed {
            elapsed_secs: ms_to_secs(self.elapsed_ms),
            paused_secs: ms_to_secs(paused_ms),
            at_ms: now,
        });
        Ok(events)
    }

    /// Finalize the run and return to `Idle`, discarding phase progress.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when already `Idle`.
    pub fn stop(&mut self) -> Result<Vec<Event>, EngineError> {
        if self.status == ControllerStatus::Idle {
            return Err(EngineError::transition("stop", self.status));
        }
        let mut events = Vec::new();
        let now = self.read_clock(&mut events);
        let mut elapsed_ms = self.elapsed_ms;
        if let Some(run) = self.run.as_mut() {
            if run.status == RunStatus::Active {
                elapsed_ms = run.active_elapsed_ms(now).max(self.elapsed_ms);
                run.finish(RunStatus::Stopped, now);
            }
        }
        info!(run_id = self.run_id, elapsed_ms, "controller stopped");
        self.reset_progress();
        self.status = ControllerStatus::Idle;
        events.push(Event::TimerStopped {
            elapsed_secs: ms_to_secs(elapsed_ms),
            at_ms: now,
        });
        Ok(events)
    }

    /// Recompute progress from the clock. Call as often as convenient.
    ///
    /// Does nothing unless `Running`, so ticking a completed controller is
    /// always safe.
    pub fn tick(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        if self.status != ControllerStatus::Running {
            return events;
        }
        let now = self.read_clock(&mut events);
        self.advance_to(now, &mut events);
        events
    }

    /// Active elapsed time right now, without walking phase boundaries.
    /// Used when progress is about to be discarded (skip, cancel).
    pub fn live_elapsed_ms(&mut self) -> u64 {
        let mut anomalies = Vec::new();
        let now = self.read_clock(&mut anomalies);
        match self.run.as_ref() {
            Some(run) if run.status == RunStatus::Active => {
                run.active_elapsed_ms(now).max(self.elapsed_ms)
            }
            _ => self.elapsed_ms,
        }
    }

    /// Current clock reading, clamped to the last accepted one.
    pub(crate) fn now_ms(&mut self) -> u64 {
        let mut anomalies = Vec::new();
        self.read_clock(&mut anomalies)
    }

    /// Treat `reading_ms` as already observed, so a fresh controller keeps
    /// clamping against readings taken by the one it replaces.
    pub(crate) fn seed_reading(&mut self, reading_ms: u64) {
        let floor = self.last_reading_ms.map_or(reading_ms, |last| last.max(reading_ms));
        self.last_reading_ms = Some(floor);
    }

    /// Swap the phase table.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` while `Running` or `Paused`.
    pub fn set_sequence(&mut self, sequence: PhaseSequence) -> Result<(), EngineError> {
        if matches!(
            self.status,
            ControllerStatus::Running | ControllerStatus::Paused
        ) {
            return Err(EngineError::transition("change phases", self.status));
        }
        self.sequence = sequence;
        self.reset_progress();
        self.status = ControllerStatus::Idle;
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn ensure_startable(&self) -> Result<(), EngineError> {
        match self.status {
            ControllerStatus::Idle | ControllerStatus::Completed => Ok(()),
            ControllerStatus::Running | ControllerStatus::Paused => {
                Err(EngineError::transition("start", self.status))
            }
        }
    }

    fn reset_progress(&mut self) {
        self.phase_index = 0;
        self.phase_started_ms = 0;
        self.elapsed_ms = 0;
        self.cycle_count = 0;
    }

    fn begin_run(&mut self, at_ms: u64, events: &mut Vec<Event>) {
        self.reset_progress();
        self.run_id += 1;
        self.run = Some(RunRecord::begin(at_ms));
        self.anomaly_reported = false;
        self.status = ControllerStatus::Running;
        info!(
            run_id = self.run_id,
            phases = self.sequence.len(),
            "controller started"
        );
        let first = self.current_phase().name.clone();
        events.push(Event::TimerStarted {
            run_id: self.run_id,
            phase_index: 0,
            phase_name: first.clone(),
            at_ms,
        });
        events.push(Event::PhaseStarted {
            phase_index: 0,
            phase_name: first,
            cycle: 0,
            at_ms,
        });
    }

    /// Read the clock, clamping a backward reading to the last good one.
    fn read_clock(&mut self, events: &mut Vec<Event>) -> u64 {
        let observed = self.clock.now_ms();
        match self.last_reading_ms {
            Some(last) if observed < last => {
                if let Some(run) = self.run.as_mut() {
                    if run.status == RunStatus::Active {
                        run.degraded = true;
                    }
                }
                if !self.anomaly_reported {
                    self.anomaly_reported = true;
                    warn!(
                        run_id = self.run_id,
                        last_good_ms = last,
                        observed_ms = observed,
                        "clock went backward; clamping to last good reading"
                    );
                    events.push(Event::ClockAnomaly {
                        last_good_ms: last,
                        observed_ms: observed,
                        at_ms: last,
                    });
                }
                last
            }
            _ => {
                self.last_reading_ms = Some(observed);
                observed
            }
        }
    }

    /// Walk every phase boundary crossed up to `now`, carrying the overflow
    /// of each boundary into the next phase.
    fn advance_to(&mut self, now: u64, events: &mut Vec<Event>) {
        let Some(run) = self.run.as_ref() else {
            return;
        };
        let elapsed = run.active_elapsed_ms(now).max(self.elapsed_ms);
        // Clock instant at which active time `e` was reached. Valid because
        // transitions are always flushed before a pause opens.
        let instant_of = |e: u64| now.saturating_sub(elapsed - e);

        loop {
            let phase = self.current_phase();
            let phase_end = self.phase_started_ms + phase.duration_ms();
            if elapsed < phase_end {
                break;
            }
            let at_ms = instant_of(phase_end);
            debug!(
                phase_index = self.phase_index,
                phase = %phase.name,
                cycle = self.cycle_count,
                "phase completed"
            );
            events.push(Event::PhaseCompleted {
                phase_index: self.phase_index,
                phase_name: phase.name.clone(),
                cycle: self.cycle_count,
                at_ms,
            });

            if self.phase_index + 1 < self.sequence.len() {
                self.phase_started_ms = phase_end;
                self.phase_index += 1;
            } else {
                let repeat = self.sequence.repeat();
                if repeat.is_cycling() {
                    self.cycle_count += 1;
                    events.push(Event::CycleCompleted {
                        cycle_count: self.cycle_count,
                        at_ms,
                    });
                }
                let finished = match repeat {
                    Repeat::Once => true,
                    Repeat::Forever => false,
                    Repeat::Times(n) => self.cycle_count >= n,
                };
                if finished {
                    self.complete(phase_end, at_ms, events);
                    return;
                }
                self.phase_started_ms = phase_end;
                self.phase_index = 0;
            }

            events.push(Event::PhaseStarted {
                phase_index: self.phase_index,
                phase_name: self.current_phase().name.clone(),
                cycle: self.cycle_count,
                at_ms,
            });
        }

        self.elapsed_ms = elapsed;
    }

    fn complete(&mut self, total_ms: u64, at_ms: u64, events: &mut Vec<Event>) {
        // The last phase stays current with its full duration elapsed.
        self.phase_started_ms = total_ms - self.current_phase().duration_ms();
        self.elapsed_ms = total_ms;
        self.status = ControllerStatus::Completed;
        if let Some(run) = self.run.as_mut() {
            run.finish(RunStatus::Completed, at_ms);
        }
        info!(run_id = self.run_id, total_ms, "controller completed");
        events.push(Event::TimerCompleted {
            elapsed_secs: ms_to_secs(total_ms),
            cycle_count: self.cycle_count,
            at_ms,
        });
    }
}
