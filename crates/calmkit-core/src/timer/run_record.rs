//! Run bookkeeping shared by the controllers and the stopwatch.
//!
//! Elapsed time is always derived as
//! `now - started_at - sum(pause durations)`; an open pause freezes it at
//! the pause start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub start_ms: u64,
    pub end_ms: Option<u64>,
}

impl PauseInterval {
    fn duration_ms(&self, now_ms: u64) -> u64 {
        self.end_ms.unwrap_or(now_ms).saturating_sub(self.start_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Active,
    Completed,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at_ms: u64,
    /// Wall-clock start, for history only. Never used for elapsed time.
    pub started_at: DateTime<Utc>,
    pub pauses: Vec<PauseInterval>,
    pub status: RunStatus,
    pub finished_at_ms: Option<u64>,
    /// Set when the clock was observed going backward during the run.
    pub degraded: bool,
}

impl RunRecord {
    pub fn begin(at_ms: u64) -> Self {
        Self {
            started_at_ms: at_ms,
            started_at: Utc::now(),
            pauses: Vec::new(),
            status: RunStatus::Active,
            finished_at_ms: None,
            degraded: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pauses.last().is_some_and(|p| p.end_ms.is_none())
    }

    pub fn open_pause(&mut self, at_ms: u64) {
        if !self.is_paused() {
            self.pauses.push(PauseInterval {
                start_ms: at_ms,
                end_ms: None,
            });
        }
    }

    /// Closes the open pause and returns its length.
    pub fn close_pause(&mut self, at_ms: u64) -> u64 {
        match self.pauses.last_mut() {
            Some(pause) if pause.end_ms.is_none() => {
                let end = at_ms.max(pause.start_ms);
                pause.end_ms = Some(end);
                end - pause.start_ms
            }
            _ => 0,
        }
    }

    pub fn paused_ms(&self, now_ms: u64) -> u64 {
        self.pauses.iter().map(|p| p.duration_ms(now_ms)).sum()
    }

    /// Active (unpaused) time since the run started.
    pub fn active_elapsed_ms(&self, now_ms: u64) -> u64 {
        let end = self.finished_at_ms.map_or(now_ms, |f| f.min(now_ms));
        end.saturating_sub(self.started_at_ms)
            .saturating_sub(self.paused_ms(end))
    }

    /// Finalize the run. An open pause is closed at `at_ms`.
    pub fn finish(&mut self, status: RunStatus, at_ms: u64) {
        self.close_pause(at_ms);
        self.status = status;
        self.finished_at_ms = Some(at_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pauses_are_excluded_from_elapsed() {
        let mut run = RunRecord::begin(1_000);
        assert_eq!(run.active_elapsed_ms(4_000), 3_000);

        run.open_pause(4_000);
        assert!(run.is_paused());
        assert_eq!(run.active_elapsed_ms(60_000), 3_000);

        assert_eq!(run.close_pause(60_000), 56_000);
        assert_eq!(run.active_elapsed_ms(62_000), 5_000);

        run.open_pause(62_000);
        run.close_pause(63_000);
        assert_eq!(run.pauses.len(), 2);
        assert_eq!(run.active_elapsed_ms(64_000), 6_000);
    }

    #[test]
    fn finish_freezes_elapsed() {
        let mut run = RunRecord::begin(0);
        run.finish(RunStatus::Completed, 5_000);
        assert_eq!(run.active_elapsed_ms(50_000), 5_000);
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[test]
    fn earlier_reading_saturates_to_zero() {
        let run = RunRecord::begin(10_000);
        assert_eq!(run.active_elapsed_ms(9_000), 0);
    }
}
