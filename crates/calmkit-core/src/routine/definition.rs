//! Routine definitions.
//!
//! A routine is an ordered list of timed activities. Definitions live in a
//! [`RoutineStore`](super::RoutineStore); a running sequencer holds its own
//! copy, so edits in the store never reach a run in progress.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Breathing,
    Meditation,
    Stretch,
    Journal,
    Rest,
    Custom(String),
}

impl ActivityType {
    pub fn name(&self) -> &str {
        match self {
            ActivityType::Breathing => "breathing",
            ActivityType::Meditation => "meditation",
            ActivityType::Stretch => "stretch",
            ActivityType::Journal => "journal",
            ActivityType::Rest => "rest",
            ActivityType::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("activity name is empty".into());
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "breathing" | "breathe" => ActivityType::Breathing,
            "meditation" | "meditate" => ActivityType::Meditation,
            "stretch" | "stretching" => ActivityType::Stretch,
            "journal" | "journaling" => ActivityType::Journal,
            "rest" => ActivityType::Rest,
            _ => ActivityType::Custom(trimmed.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineStep {
    pub activity: ActivityType,
    pub duration_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RoutineStep {
    pub fn new(activity: ActivityType, duration_secs: u32) -> Self {
        Self {
            activity,
            duration_secs,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label if set, otherwise the activity name.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.activity.name())
    }
}

/// Parses `activity:secs` or `activity:secs:label`.
impl FromStr for RoutineStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let activity: ActivityType = parts.next().unwrap_or_default().parse()?;
        let secs = parts
            .next()
            .ok_or_else(|| format!("step '{s}' is missing a duration (expected activity:secs)"))?;
        let duration_secs: u32 = secs
            .trim()
            .parse()
            .map_err(|_| format!("invalid duration '{secs}' in step '{s}'"))?;
        let label = parts
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from);
        Ok(Self {
            activity,
            duration_secs,
            label,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineDefinition {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub steps: Vec<RoutineStep>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl RoutineDefinition {
    /// New definition with a fresh id.
    pub fn new(name: impl Into<String>, steps: Vec<RoutineStep>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            steps,
            created_at: Utc::now(),
        }
    }

    /// # Errors
    ///
    /// `InvalidRoutineDefinition` when there are no steps or a step has a
    /// zero duration.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.steps.is_empty() {
            return Err(EngineError::InvalidRoutineDefinition(format!(
                "routine '{}' has no steps",
                self.name
            )));
        }
        if let Some((index, step)) = self
            .steps
            .iter()
            .enumerate()
            .find(|(_, s)| s.duration_secs == 0)
        {
            return Err(EngineError::InvalidRoutineDefinition(format!(
                "step {} ({}) has a zero duration",
                index + 1,
                step.display_name()
            )));
        }
        Ok(())
    }

    pub fn total_planned_secs(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.duration_secs)).sum()
    }
}
