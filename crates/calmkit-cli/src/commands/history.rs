use calmkit_core::Database;
use serde::Serialize;

use calmkit_core::storage::{RunRecordRow, Stats};

#[derive(Serialize)]
struct HistoryReport {
    stats: Stats,
    runs: Vec<RunRecordRow>,
}

pub fn run(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let report = HistoryReport {
        stats: db.stats()?,
        runs: db.recent_runs(limit)?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
