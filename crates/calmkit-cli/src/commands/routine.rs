use std::io::BufRead;

use clap::Subcommand;
use calmkit_core::{
    Config, Database, KvRoutineStore, RoutineDefinition, RoutineSequencer, RoutineStep,
    RoutineStore, SequencerStatus, SystemClock,
};
use tracing::warn;

use super::{print_events, POLL_INTERVAL};

#[derive(Subcommand)]
pub enum RoutineAction {
    /// List saved routines
    List,
    /// Print one routine as JSON
    Show {
        /// Routine ID
        id: String,
    },
    /// Create a routine
    Create {
        /// Routine name
        #[arg(long)]
        name: String,
        /// Step as activity:secs or activity:secs:label (repeatable)
        #[arg(long = "step", required = true)]
        steps: Vec<RoutineStep>,
    },
    /// Delete a routine
    Delete {
        /// Routine ID
        id: String,
    },
    /// Run a routine in the foreground and record it to history
    Run {
        /// Routine ID
        id: String,
        /// Wait for Enter before every step
        #[arg(long)]
        manual: bool,
    },
}

pub fn run(action: RoutineAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let mut store = KvRoutineStore::new(&db);

    match action {
        RoutineAction::List => {
            let routines = store.list()?;
            println!("{}", serde_json::to_string_pretty(&routines)?);
        }
        RoutineAction::Show { id } => {
            let routine = store.load(&id)?;
            println!("{}", serde_json::to_string_pretty(&routine)?);
        }
        RoutineAction::Create { name, steps } => {
            let routine = store.save(RoutineDefinition::new(name, steps))?;
            eprintln!("Routine created: {}", routine.id);
            println!("{}", serde_json::to_string_pretty(&routine)?);
        }
        RoutineAction::Delete { id } => {
            store.delete(&id)?;
            println!("deleted {id}");
        }
        RoutineAction::Run { id, manual } => {
            let routine = store.load(&id)?;
            run_routine(&db, &routine, manual)?;
        }
    }
    Ok(())
}

fn run_routine(
    db: &Database,
    routine: &RoutineDefinition,
    manual: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut sequencer_config = Config::load()?.sequencer_config();
    if manual {
        sequencer_config.auto_advance = false;
        sequencer_config.auto_start_next = true;
    }
    let mut sequencer =
        RoutineSequencer::start_routine(routine, sequencer_config, SystemClock::shared())?;

    print_events(&sequencer.start_step()?)?;
    loop {
        print_events(&sequencer.tick())?;
        let state = sequencer.state();
        match state.status {
            SequencerStatus::StepIdle if state.pending_start_at_ms.is_none() => {
                wait_for_enter(&format!(
                    "step {}/{} ({}) ready",
                    state.current_step_index + 1,
                    state.step_count,
                    state.current_step.display_name()
                ))?;
                print_events(&sequencer.start_step()?)?;
            }
            SequencerStatus::StepCompleted => {
                wait_for_enter("step finished")?;
                print_events(&sequencer.advance()?)?;
            }
            SequencerStatus::RoutineCompleted | SequencerStatus::Cancelled => break,
            _ => std::thread::sleep(POLL_INTERVAL),
        }
    }

    if let Some(summary) = sequencer.summary() {
        if let Err(e) = db.record_run(summary) {
            warn!(error = %e, "failed to record routine run");
        }
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    Ok(())
}

fn wait_for_enter(prompt: &str) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("{prompt}; press Enter to continue");
    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err("input closed before the routine finished".into());
    }
    Ok(())
}
