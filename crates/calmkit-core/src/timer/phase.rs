use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One named phase of a controller, e.g. "inhale" for 4 seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    pub duration_secs: u32,
}

impl PhaseSpec {
    pub fn new(name: impl Into<String>, duration_secs: u32) -> Self {
        Self {
            name: name.into(),
            duration_secs,
        }
    }

    /// Get phase duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        u64::from(self.duration_secs).saturating_mul(1000)
    }
}

/// How many times the phase list is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    /// Walk the phases once, then complete.
    Once,
    /// Loop until stopped.
    Forever,
    /// Loop for a fixed number of full cycles, then complete.
    Times(u32),
}

impl Repeat {
    pub fn is_cycling(self) -> bool {
        !matches!(self, Repeat::Once)
    }

    /// Number of cycles after which the sequence completes, if it does.
    pub fn cycle_limit(self) -> Option<u32> {
        match self {
            Repeat::Once => Some(1),
            Repeat::Forever => None,
            Repeat::Times(n) => Some(n),
        }
    }
}

/// Ordered, validated, immutable list of phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSequence {
    phases: Vec<PhaseSpec>,
    repeat: Repeat,
}

impl PhaseSequence {
    /// # Errors
    ///
    /// Returns `InvalidPhaseSequence` if the list is empty, a phase has a
    /// zero duration, or `repeat` is `Times(0)`.
    pub fn new(phases: Vec<PhaseSpec>, repeat: Repeat) -> Result<Self, EngineError> {
        if phases.is_empty() {
            return Err(EngineError::InvalidPhaseSequence(
                "at least one phase is required".into(),
            ));
        }
        if let Some(bad) = phases.iter().find(|p| p.duration_secs == 0) {
            return Err(EngineError::InvalidPhaseSequence(format!(
                "phase '{}' has a zero duration",
                bad.name
            )));
        }
        if repeat == Repeat::Times(0) {
            return Err(EngineError::InvalidPhaseSequence(
                "cycle count must be at least 1".into(),
            ));
        }
        Ok(Self { phases, repeat })
    }

    /// A single-phase, non-cycling countdown.
    pub fn countdown(name: impl Into<String>, duration_secs: u32) -> Result<Self, EngineError> {
        Self::new(vec![PhaseSpec::new(name, duration_secs)], Repeat::Once)
    }

    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    pub fn phase(&self, index: usize) -> Option<&PhaseSpec> {
        self.phases.get(index)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn repeat(&self) -> Repeat {
        self.repeat
    }

    /// Duration of one pass over all phases.
    pub fn cycle_duration_ms(&self) -> u64 {
        self.phases.iter().map(PhaseSpec::duration_ms).sum()
    }

    /// Total run length, or `None` when the sequence loops forever.
    pub fn total_duration_ms(&self) -> Option<u64> {
        self.repeat
            .cycle_limit()
            .map(|n| self.cycle_duration_ms().saturating_mul(u64::from(n)))
    }

    /// Milliseconds into a cycle at which `index` begins.
    pub fn offset_of_ms(&self, index: usize) -> u64 {
        self.phases
            .iter()
            .take(index)
            .map(PhaseSpec::duration_ms)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_phases() -> Vec<PhaseSpec> {
        vec![
            PhaseSpec::new("inhale", 4),
            PhaseSpec::new("hold", 4),
            PhaseSpec::new("exhale", 4),
            PhaseSpec::new("hold", 4),
        ]
    }

    #[test]
    fn rejects_empty_and_zero_duration() {
        assert!(PhaseSequence::new(vec![], Repeat::Once).is_err());
        let err = PhaseSequence::new(vec![PhaseSpec::new("rest", 0)], Repeat::Once).unwrap_err();
        assert!(err.to_string().contains("rest"));
        assert!(PhaseSequence::new(box_phases(), Repeat::Times(0)).is_err());
    }

    #[test]
    fn durations() {
        let seq = PhaseSequence::new(box_phases(), Repeat::Times(3)).unwrap();
        assert_eq!(seq.cycle_duration_ms(), 16_000);
        assert_eq!(seq.total_duration_ms(), Some(48_000));
        assert_eq!(seq.offset_of_ms(2), 8_000);

        let forever = PhaseSequence::new(box_phases(), Repeat::Forever).unwrap();
        assert_eq!(forever.total_duration_ms(), None);
    }

    #[test]
    fn countdown_is_single_phase_once() {
        let seq = PhaseSequence::countdown("focus", 90).unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.repeat(), Repeat::Once);
        assert_eq!(seq.total_duration_ms(), Some(90_000));
    }
}
