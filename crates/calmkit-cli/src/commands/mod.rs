pub mod config;
pub mod history;
pub mod routine;
pub mod session;

use calmkit_core::Event;

/// Poll interval for the foreground run loops.
pub(crate) const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

/// One JSON object per line.
pub(crate) fn print_events(events: &[Event]) -> Result<(), Box<dyn std::error::Error>> {
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}
