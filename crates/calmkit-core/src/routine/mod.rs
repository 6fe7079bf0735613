//! Routines: ordered lists of timed activities, their storage, and the
//! sequencer that runs them one step at a time.

mod definition;
mod sequencer;
mod store;

pub use definition::{ActivityType, RoutineDefinition, RoutineStep};
pub use sequencer::{
    RoutineOutcome, RoutineSequencer, RoutineSummary, SequencerConfig, SequencerState,
    SequencerStatus, StepOutcome, StepResult,
};
pub use store::{KvRoutineStore, MemoryRoutineStore, RoutineStore};
