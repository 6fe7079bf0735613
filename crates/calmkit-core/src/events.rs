use serde::{Deserialize, Serialize};

use crate::routine::{ActivityType, RoutineOutcome};

/// Every discrete change in the engine produces an Event.
///
/// Commands and `tick()` return the events they caused, in the order they
/// happened. `at_ms` is the clock instant the event is attributed to, which
/// for catch-up transitions is the instant the boundary was actually
/// crossed rather than the instant of the late poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        run_id: u64,
        phase_index: usize,
        phase_name: String,
        at_ms: u64,
    },
    TimerPaused {
        elapsed_secs: f64,
        at_ms: u64,
    },
    TimerResumed {
        elapsed_secs: f64,
        paused_secs: f64,
        at_ms: u64,
    },
    TimerStopped {
        elapsed_secs: f64,
        at_ms: u64,
    },
    TimerCompleted {
        elapsed_secs: f64,
        cycle_count: u32,
        at_ms: u64,
    },
    PhaseStarted {
        phase_index: usize,
        phase_name: String,
        cycle: u32,
        at_ms: u64,
    },
    PhaseCompleted {
        phase_index: usize,
        phase_name: String,
        cycle: u32,
        at_ms: u64,
    },
    CycleCompleted {
        cycle_count: u32,
        at_ms: u64,
    },
    /// The clock went backward; elapsed time was clamped and the run is
    /// flagged degraded.
    ClockAnomaly {
        last_good_ms: u64,
        observed_ms: u64,
        at_ms: u64,
    },
    ReminderDue {
        threshold_secs: u64,
        elapsed_secs: f64,
        at_ms: u64,
    },
    WarningDue {
        remaining_secs: u64,
        elapsed_secs: f64,
        at_ms: u64,
    },
    SessionLimitReached {
        limit_secs: u64,
        elapsed_secs: f64,
        at_ms: u64,
    },
    StepStarted {
        step_index: usize,
        activity: ActivityType,
        duration_secs: u32,
        at_ms: u64,
    },
    StepCompleted {
        step_index: usize,
        activity: ActivityType,
        at_ms: u64,
    },
    StepSkipped {
        step_index: usize,
        elapsed_secs: f64,
        at_ms: u64,
    },
    StepRewound {
        from_step: usize,
        to_step: usize,
        at_ms: u64,
    },
    RoutineCompleted {
        routine_id: String,
        total_planned_secs: u64,
        total_elapsed_secs: f64,
        at_ms: u64,
    },
    RoutineCancelled {
        routine_id: String,
        total_planned_secs: u64,
        total_elapsed_secs: f64,
        at_ms: u64,
    },
}

impl Event {
    pub fn at_ms(&self) -> u64 {
        match self {
            Event::TimerStarted { at_ms, .. }
            | Event::TimerPaused { at_ms, .. }
            | Event::TimerResumed { at_ms, .. }
            | Event::TimerStopped { at_ms, .. }
            | Event::TimerCompleted { at_ms, .. }
            | Event::PhaseStarted { at_ms, .. }
            | Event::PhaseCompleted { at_ms, .. }
            | Event::CycleCompleted { at_ms, .. }
            | Event::ClockAnomaly { at_ms, .. }
            | Event::ReminderDue { at_ms, .. }
            | Event::WarningDue { at_ms, .. }
            | Event::SessionLimitReached { at_ms, .. }
            | Event::StepStarted { at_ms, .. }
            | Event::StepCompleted { at_ms, .. }
            | Event::StepSkipped { at_ms, .. }
            | Event::StepRewound { at_ms, .. }
            | Event::RoutineCompleted { at_ms, .. }
            | Event::RoutineCancelled { at_ms, .. } => *at_ms,
        }
    }

    /// Short name used by hosts for logging and cue lookup.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::TimerStarted { .. } => "TimerStarted",
            Event::TimerPaused { .. } => "TimerPaused",
            Event::TimerResumed { .. } => "TimerResumed",
            Event::TimerStopped { .. } => "TimerStopped",
            Event::TimerCompleted { .. } => "TimerCompleted",
            Event::PhaseStarted { .. } => "PhaseStarted",
            Event::PhaseCompleted { .. } => "PhaseCompleted",
            Event::CycleCompleted { .. } => "CycleCompleted",
            Event::ClockAnomaly { .. } => "ClockAnomaly",
            Event::ReminderDue { .. } => "ReminderDue",
            Event::WarningDue { .. } => "WarningDue",
            Event::SessionLimitReached { .. } => "SessionLimitReached",
            Event::StepStarted { .. } => "StepStarted",
            Event::StepCompleted { .. } => "StepCompleted",
            Event::StepSkipped { .. } => "StepSkipped",
            Event::StepRewound { .. } => "StepRewound",
            Event::RoutineCompleted { .. } => "RoutineCompleted",
            Event::RoutineCancelled { .. } => "RoutineCancelled",
        }
    }

    pub(crate) fn routine_finished(
        outcome: RoutineOutcome,
        routine_id: String,
        total_planned_secs: u64,
        total_elapsed_secs: f64,
        at_ms: u64,
    ) -> Self {
        match outcome {
            RoutineOutcome::Completed => Event::RoutineCompleted {
                routine_id,
                total_planned_secs,
                total_elapsed_secs,
                at_ms,
            },
            RoutineOutcome::Cancelled => Event::RoutineCancelled {
                routine_id,
                total_planned_secs,
                total_elapsed_secs,
                at_ms,
            },
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&Event) + Send>;

/// Push-based fan-out for hosts that want callbacks (sound cues,
/// vibration) instead of inspecting returned event vectors.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn publish(&mut self, event: &Event) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(event);
        }
    }

    pub fn publish_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a Event>,
    {
        for event in events {
            self.publish(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
