//! Timed phase engine.
//!
//! - [`PhaseController`]: countdowns and cycles driven by `tick()`
//! - [`BreathingController`]: catalog breathing patterns on a controller
//! - [`SessionMonitor`]: reminders and limits over active elapsed time

mod breathing;
mod controller;
mod monitor;
mod phase;
mod run_record;

pub use breathing::{BreathCue, BreathingController, BreathingPattern};
pub use controller::{ControllerState, ControllerStatus, PhaseController};
pub use monitor::{ElapsedSource, MonitorConfig, SessionMonitor, Stopwatch, MAX_THRESHOLD_SECS};
pub use phase::{PhaseSequence, PhaseSpec, Repeat};
pub use run_record::{PauseInterval, RunRecord, RunStatus};
