//! Integration tests for routine runs.
//!
//! Covers the full workflow from a stored definition through a sequencer
//! run to the history table.

use calmkit_core::routine::StepOutcome;
use calmkit_core::{
    ActivityType, BreathingController, BreathingPattern, Database, Event, EventBus,
    KvRoutineStore, ManualClock, MonitorConfig, RoutineDefinition, RoutineOutcome,
    RoutineSequencer, RoutineStep, RoutineStore, SequencerConfig, SequencerStatus,
    SessionMonitor,
};
use std::sync::{Arc, Mutex};

fn manual_start() -> SequencerConfig {
    SequencerConfig {
        auto_advance: true,
        auto_start_next: false,
        grace_delay_ms: 2_000,
    }
}

#[test]
fn test_skip_accounting_and_history() {
    let db = Database::open_memory().unwrap();
    let mut store = KvRoutineStore::new(&db);
    let routine = store
        .save(RoutineDefinition::new(
            "Wind down",
            vec![
                RoutineStep::new(ActivityType::Breathing, 60),
                RoutineStep::new(ActivityType::Stretch, 90),
            ],
        ))
        .unwrap();

    let clock = ManualClock::new(0);
    let loaded = store.load(&routine.id).unwrap();
    let mut seq = RoutineSequencer::start_routine(&loaded, manual_start(), clock.shared()).unwrap();

    seq.start_step().unwrap();
    clock.advance_secs(10.0);
    seq.tick();
    let events = seq.skip_step().unwrap();
    assert!(matches!(
        events.as_slice(),
        [Event::StepSkipped { step_index: 0, elapsed_secs, .. }] if *elapsed_secs == 10.0
    ));
    assert_eq!(seq.state().total_elapsed_secs, 10.0);

    seq.start_step().unwrap();
    clock.advance_secs(90.0);
    let events = seq.tick();
    let completed = events
        .iter()
        .find_map(|e| match e {
            Event::RoutineCompleted {
                total_planned_secs,
                total_elapsed_secs,
                ..
            } => Some((*total_planned_secs, *total_elapsed_secs)),
            _ => None,
        })
        .unwrap();
    assert_eq!(completed, (150, 100.0));

    let summary = seq.summary().unwrap();
    assert_eq!(summary.steps[0].outcome, StepOutcome::Skipped);
    assert_eq!(summary.steps[1].outcome, StepOutcome::Completed);
    db.record_run(summary).unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats.completed_runs, 1);
    assert_eq!(stats.total_practice_secs, 100.0);
    let runs = db.recent_runs(5).unwrap();
    assert_eq!(runs[0].routine_name, "Wind down");
    assert_eq!(runs[0].planned_secs, 150);
    assert_eq!(runs[0].steps_completed, 1);
}

#[test]
fn test_store_edits_do_not_reach_running_sequencer() {
    let db = Database::open_memory().unwrap();
    let mut store = KvRoutineStore::new(&db);
    let mut routine = store
        .save(RoutineDefinition::new(
            "Morning",
            vec![
                RoutineStep::new(ActivityType::Meditation, 30),
                RoutineStep::new(ActivityType::Journal, 30),
            ],
        ))
        .unwrap();

    let clock = ManualClock::new(0);
    let mut seq = RoutineSequencer::start_routine(&routine, manual_start(), clock.shared()).unwrap();

    routine.steps.push(RoutineStep::new(ActivityType::Rest, 600));
    store.save(routine.clone()).unwrap();

    assert_eq!(seq.state().step_count, 2);
    assert_eq!(seq.total_planned_secs(), 60);
    seq.start_step().unwrap();
    clock.advance_secs(30.0);
    seq.tick();
    seq.start_step().unwrap();
    clock.advance_secs(30.0);
    seq.tick();
    assert_eq!(seq.status(), SequencerStatus::RoutineCompleted);
    assert_eq!(store.load(&routine.id).unwrap().steps.len(), 3);
}

#[test]
fn test_auto_advance_chain_through_event_bus() {
    let clock = ManualClock::new(1_000);
    let routine = RoutineDefinition::new(
        "Quick reset",
        vec![
            RoutineStep::new(ActivityType::Breathing, 20),
            RoutineStep::new(ActivityType::Custom("walk".into()), 40),
        ],
    );
    let config = SequencerConfig {
        grace_delay_ms: 5_000,
        ..SequencerConfig::default()
    };
    let mut seq = RoutineSequencer::start_routine(&routine, config, clock.shared()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut bus = EventBus::new();
    let sink = Arc::clone(&seen);
    bus.subscribe(move |event| sink.lock().unwrap().push(event.type_name().to_string()));

    bus.publish_all(&seq.start_step().unwrap());
    // Step 0 ends at 21s, step 1 starts at 26s and is 4s in at 30s.
    clock.set_ms(30_000);
    bus.publish_all(&seq.tick());

    let state = seq.state();
    assert_eq!(state.status, SequencerStatus::StepRunning);
    assert_eq!(state.current_step_index, 1);
    assert_eq!(state.total_elapsed_secs, 24.0);

    let seen = seen.lock().unwrap();
    let step_events: Vec<&str> = seen
        .iter()
        .map(String::as_str)
        .filter(|t| t.starts_with("Step"))
        .collect();
    assert_eq!(step_events, vec!["StepStarted", "StepCompleted", "StepStarted"]);
}

#[test]
fn test_cancel_mid_step_reports_partial_time() {
    let clock = ManualClock::new(0);
    let routine = RoutineDefinition::new(
        "Evening",
        vec![
            RoutineStep::new(ActivityType::Stretch, 120),
            RoutineStep::new(ActivityType::Rest, 60),
        ],
    );
    let mut seq = RoutineSequencer::start_routine(&routine, manual_start(), clock.shared()).unwrap();
    seq.start_step().unwrap();
    clock.advance_secs(45.0);
    seq.pause_step().unwrap();
    clock.advance_secs(300.0);

    let events = seq.cancel().unwrap();
    assert!(matches!(
        events.as_slice(),
        [Event::RoutineCancelled { total_elapsed_secs, total_planned_secs: 180, .. }]
            if *total_elapsed_secs == 45.0
    ));
    assert_eq!(seq.summary().unwrap().outcome, RoutineOutcome::Cancelled);
    assert!(seq.resume_step().is_err());
}

#[test]
fn test_breathing_with_monitor_catch_up() {
    let clock = ManualClock::new(0);
    let mut breathing =
        BreathingController::new(BreathingPattern::Box, Some(3), clock.shared()).unwrap();
    let mut monitor = SessionMonitor::new(MonitorConfig {
        reminders_secs: vec![20],
        warnings_secs: vec![10],
        session_limit_secs: Some(45),
    })
    .unwrap();

    breathing.start().unwrap();
    clock.advance_secs(17.0);
    let events = breathing.tick();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::CycleCompleted { .. }))
            .count(),
        1
    );
    assert!(monitor.observe(&breathing).is_empty());

    // Three 16s rounds end at 48s; the monitor sees everything at once.
    clock.advance_secs(40.0);
    let events = breathing.tick();
    assert!(matches!(events.last(), Some(Event::TimerCompleted { cycle_count: 3, .. })));
    let fired: Vec<&str> = monitor
        .observe(&breathing)
        .iter()
        .map(Event::type_name)
        .collect();
    assert_eq!(fired, vec!["ReminderDue", "WarningDue", "SessionLimitReached"]);
    assert_eq!(breathing.state().total_elapsed_secs, 48.0);

    breathing.start().unwrap();
    assert_eq!(monitor.observe(&breathing).len(), 0);
    assert_eq!(monitor.pending_count(), 3);
}
