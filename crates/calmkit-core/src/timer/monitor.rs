//! Session monitor - break reminders and session-limit warnings.
//!
//! The monitor never owns or mutates the controller it watches. It reads the
//! active elapsed time (pauses already excluded) and fires each configured
//! threshold at most once per run.
//!
//! ## Thresholds
//!
//! - **Reminder**: due when elapsed time reaches the value.
//! - **Warning**: "N seconds left" before the session limit, due at
//!   `limit - N`.
//! - **Limit**: due at the session limit.
//!
//! When one observation crosses several thresholds they fire in the order
//! they became due, earliest first.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::breathing::BreathingController;
use super::controller::{ControllerStatus, PhaseController};
use super::run_record::{RunRecord, RunStatus};
use crate::clock::{ms_to_secs, SharedClock};
use crate::error::EngineError;
use crate::events::Event;

/// Anything that reports active elapsed time for a run.
pub trait ElapsedSource {
    fn elapsed_ms(&self) -> u64;
    /// Changes whenever a new run starts.
    fn run_id(&self) -> u64;
    fn observed_at_ms(&self) -> u64;
}

impl ElapsedSource for PhaseController {
    fn elapsed_ms(&self) -> u64 {
        PhaseController::elapsed_ms(self)
    }

    fn run_id(&self) -> u64 {
        PhaseController::run_id(self)
    }

    fn observed_at_ms(&self) -> u64 {
        PhaseController::observed_at_ms(self)
    }
}

impl ElapsedSource for BreathingController {
    fn elapsed_ms(&self) -> u64 {
        self.controller().elapsed_ms()
    }

    fn run_id(&self) -> u64 {
        self.controller().run_id()
    }

    fn observed_at_ms(&self) -> u64 {
        self.controller().observed_at_ms()
    }
}

/// Largest threshold whose millisecond offset still fits in a `u64`.
pub const MAX_THRESHOLD_SECS: u64 = u64::MAX / 1000;

/// Monitor thresholds, all in seconds of active elapsed time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Gentle reminders, due at these elapsed times.
    #[serde(default)]
    pub reminders_secs: Vec<u64>,
    /// Warnings, in seconds remaining before the session limit.
    #[serde(default)]
    pub warnings_secs: Vec<u64>,
    /// Hard session limit.
    #[serde(default)]
    pub session_limit_secs: Option<u64>,
}

impl MonitorConfig {
    /// # Errors
    ///
    /// `InvalidMonitorConfig` for zero or out-of-range thresholds, warnings
    /// without a limit, or warnings not strictly inside the limit.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.reminders_secs.contains(&0) {
            return Err(EngineError::InvalidMonitorConfig(
                "reminder thresholds must be positive".into(),
            ));
        }
        let too_large = self
            .reminders_secs
            .iter()
            .chain(&self.session_limit_secs)
            .find(|&&secs| secs > MAX_THRESHOLD_SECS);
        if let Some(secs) = too_large {
            return Err(EngineError::InvalidMonitorConfig(format!(
                "threshold {secs}s exceeds the {MAX_THRESHOLD_SECS}s maximum"
            )));
        }
        if self.session_limit_secs == Some(0) {
            return Err(EngineError::InvalidMonitorConfig(
                "session limit must be positive".into(),
            ));
        }
        if self.warnings_secs.is_empty() {
            return Ok(());
        }
        let Some(limit) = self.session_limit_secs else {
            return Err(EngineError::InvalidMonitorConfig(
                "warnings require a session limit".into(),
            ));
        };
        if let Some(w) = self.warnings_secs.iter().find(|&&w| w == 0 || w >= limit) {
            return Err(EngineError::InvalidMonitorConfig(format!(
                "warning at {w}s remaining must be between 0 and the {limit}s limit"
            )));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.reminders_secs.is_empty()
            && self.warnings_secs.is_empty()
            && self.session_limit_secs.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ThresholdKind {
    Reminder(u64),
    Warning(u64),
    Limit(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Threshold {
    due_ms: u64,
    kind: ThresholdKind,
}

impl Threshold {
    fn event(&self, elapsed_ms: u64, at_ms: u64) -> Event {
        let elapsed_secs = ms_to_secs(elapsed_ms);
        match self.kind {
            ThresholdKind::Reminder(threshold_secs) => Event::ReminderDue {
                threshold_secs,
                elapsed_secs,
                at_ms,
            },
            ThresholdKind::Warning(remaining_secs) => Event::WarningDue {
                remaining_secs,
                elapsed_secs,
                at_ms,
            },
            ThresholdKind::Limit(limit_secs) => Event::SessionLimitReached {
                limit_secs,
                elapsed_secs,
                at_ms,
            },
        }
    }
}

/// Watches an [`ElapsedSource`] and emits threshold events.
#[derive(Debug, Clone)]
pub struct SessionMonitor {
    config: MonitorConfig,
    /// Sorted by due time, ties broken reminder < warning < limit.
    schedule: Vec<Threshold>,
    fired: BTreeSet<usize>,
    run_id: u64,
}

impl SessionMonitor {
    /// # Errors
    ///
    /// See [`MonitorConfig::validate`].
    pub fn new(config: MonitorConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let mut schedule: Vec<Threshold> = Vec::new();
        for &secs in &config.reminders_secs {
            schedule.push(Threshold {
                due_ms: secs.saturating_mul(1000),
                kind: ThresholdKind::Reminder(secs),
            });
        }
        if let Some(limit) = config.session_limit_secs {
            for &secs in &config.warnings_secs {
                schedule.push(Threshold {
                    due_ms: limit.saturating_sub(secs).saturating_mul(1000),
                    kind: ThresholdKind::Warning(secs),
                });
            }
            schedule.push(Threshold {
                due_ms: limit.saturating_mul(1000),
                kind: ThresholdKind::Limit(limit),
            });
        }
        schedule.sort_by_key(|t| (t.due_ms, t.kind));
        schedule.dedup();
        Ok(Self {
            config,
            schedule,
            fired: BTreeSet::new(),
            run_id: 0,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Forget fired thresholds; the next run starts fresh.
    pub fn reset(&mut self) {
        self.fired.clear();
    }

    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }

    pub fn pending_count(&self) -> usize {
        self.schedule.len() - self.fired.len()
    }

    /// Evaluate thresholds against the source's elapsed time. A new run on
    /// the source clears the fired set first.
    pub fn observe(&mut self, source: &dyn ElapsedSource) -> Vec<Event> {
        let run_id = source.run_id();
        if run_id != self.run_id {
            debug!(old = self.run_id, new = run_id, "monitor observed a new run");
            self.reset();
            self.run_id = run_id;
        }
        self.evaluate(source.elapsed_ms(), source.observed_at_ms())
    }

    /// Evaluate thresholds against an explicit elapsed time.
    pub fn evaluate(&mut self, elapsed_ms: u64, at_ms: u64) -> Vec<Event> {
        let mut events = Vec::new();
        for (index, threshold) in self.schedule.iter().enumerate() {
            if threshold.due_ms > elapsed_ms {
                break;
            }
            if self.fired.insert(index) {
                debug!(kind = ?threshold.kind, elapsed_ms, "monitor threshold fired");
                events.push(threshold.event(elapsed_ms, at_ms));
            }
        }
        events
    }
}

/// Standalone elapsed-time tracker for dwell time that has no phases.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    clock: SharedClock,
    run: Option<RunRecord>,
    run_id: u64,
    elapsed_ms: u64,
    last_reading_ms: u64,
}

impl Stopwatch {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            run: None,
            run_id: 0,
            elapsed_ms: 0,
            last_reading_ms: 0,
        }
    }

    pub fn status(&self) -> ControllerStatus {
        match &self.run {
            Some(run) if run.status == RunStatus::Active && run.is_paused() => {
                ControllerStatus::Paused
            }
            Some(run) if run.status == RunStatus::Active => ControllerStatus::Running,
            _ => ControllerStatus::Idle,
        }
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        let status = self.status();
        if status != ControllerStatus::Idle {
            return Err(EngineError::transition("start", status));
        }
        let now = self.read_clock();
        self.run = Some(RunRecord::begin(now));
        self.run_id += 1;
        self.elapsed_ms = 0;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        let status = self.status();
        if status != ControllerStatus::Running {
            return Err(EngineError::transition("pause", status));
        }
        self.tick();
        let now = self.last_reading_ms;
        if let Some(run) = self.run.as_mut() {
            run.open_pause(now);
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        let status = self.status();
        if status != ControllerStatus::Paused {
            return Err(EngineError::transition("resume", status));
        }
        let now = self.read_clock();
        if let Some(run) = self.run.as_mut() {
            run.close_pause(now);
        }
        Ok(())
    }

    /// Finalize the run and return its elapsed time in milliseconds.
    pub fn stop(&mut self) -> Result<u64, EngineError> {
        let status = self.status();
        if status == ControllerStatus::Idle {
            return Err(EngineError::transition("stop", status));
        }
        self.tick();
        let now = self.last_reading_ms;
        if let Some(run) = self.run.as_mut() {
            run.finish(RunStatus::Stopped, now);
        }
        Ok(self.elapsed_ms)
    }

    /// Recompute elapsed time from the clock.
    pub fn tick(&mut self) {
        let now = self.read_clock();
        if let Some(run) = self.run.as_ref() {
            if run.status == RunStatus::Active {
                self.elapsed_ms = run.active_elapsed_ms(now).max(self.elapsed_ms);
            }
        }
    }

    pub fn run_record(&self) -> Option<&RunRecord> {
        self.run.as_ref()
    }

    fn read_clock(&mut self) -> u64 {
        let observed = self.clock.now_ms();
        if observed < self.last_reading_ms {
            if let Some(run) = self.run.as_mut() {
                run.degraded = true;
            }
            return self.last_reading_ms;
        }
        self.last_reading_ms = observed;
        observed
    }
}

impl ElapsedSource for Stopwatch {
    fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    fn run_id(&self) -> u64 {
        self.run_id
    }

    fn observed_at_ms(&self) -> u64 {
        self.last_reading_ms
    }
}
