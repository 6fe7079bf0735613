//! # Calmkit Core Library
//!
//! This library provides the timing engine behind the calmkit wellness
//! tools: countdowns, paced breathing, session reminders and multi-step
//! routines. The `calmkit` CLI is a thin host over the same library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: wall-clock-based state machines that require the
//!   caller to periodically invoke `tick()` for progress updates. Elapsed
//!   time is always recomputed from a [`Clock`], never accumulated.
//! - **Routines**: a sequencer that runs one phase controller per step
//! - **Storage**: SQLite routine history and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`PhaseController`]: Core timer state machine
//! - [`BreathingController`]: Catalog breathing patterns
//! - [`SessionMonitor`]: Reminder, warning and limit thresholds
//! - [`RoutineSequencer`]: Step-by-step routine runs
//! - [`Database`]: History and key-value persistence
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod routine;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, EngineError, StoreError};
pub use events::{Event, EventBus, SubscriptionId};
pub use routine::{
    ActivityType, KvRoutineStore, MemoryRoutineStore, RoutineDefinition, RoutineOutcome,
    RoutineSequencer, RoutineStep, RoutineStore, RoutineSummary, SequencerConfig, SequencerState,
    SequencerStatus,
};
pub use storage::{Config, Database};
pub use timer::{
    BreathCue, BreathingController, BreathingPattern, ControllerState, ControllerStatus,
    ElapsedSource, MonitorConfig, PhaseController, PhaseSequence, PhaseSpec, Repeat,
    SessionMonitor, Stopwatch,
};
