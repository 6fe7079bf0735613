//! Foreground countdown and breathing sessions.
//!
//! Both run until the controller completes or the monitor reports the
//! session limit, printing every event as it happens.

use calmkit_core::{
    BreathingController, BreathingPattern, Config, ControllerStatus, Event, PhaseController,
    SessionMonitor, SystemClock,
};
use tracing::info;

use super::{print_events, POLL_INTERVAL};

pub fn countdown(secs: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let secs = secs.unwrap_or(config.countdown.default_secs);
    let mut controller = PhaseController::countdown("countdown", secs, SystemClock::shared())?;
    let mut monitor = SessionMonitor::new(config.monitor_config())?;
    info!(secs, "countdown session");

    print_events(&controller.start()?)?;
    loop {
        let mut events = controller.tick();
        events.extend(monitor.observe(&controller));
        print_events(&events)?;
        if controller.status() == ControllerStatus::Completed {
            return Ok(());
        }
        if limit_reached(&events) {
            return print_events(&controller.stop()?);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

pub fn breathe(
    pattern: Option<String>,
    rounds: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let pattern: BreathingPattern = match pattern {
        Some(raw) => raw.parse()?,
        None => config.breathing_pattern(),
    };
    let rounds = match rounds {
        Some(0) => None,
        Some(n) => Some(n),
        None => config.breathing_rounds(),
    };
    let mut controller = BreathingController::new(pattern, rounds, SystemClock::shared())?;
    let mut monitor = SessionMonitor::new(config.monitor_config())?;
    info!(pattern = %pattern, ?rounds, "breathing session");

    eprintln!("{} ({})", pattern.label(), pattern.key());
    print_events(&controller.start()?)?;
    loop {
        let mut events = controller.tick();
        events.extend(monitor.observe(&controller));
        print_events(&events)?;
        if controller.state().status == ControllerStatus::Completed {
            return Ok(());
        }
        if limit_reached(&events) {
            return print_events(&controller.stop()?);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn limit_reached(events: &[Event]) -> bool {
    events
        .iter()
        .any(|e| matches!(e, Event::SessionLimitReached { .. }))
}
