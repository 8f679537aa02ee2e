use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ceiling::DEFAULT_SEED_CEILING;
use crate::error::RecordError;

/// The three scripted pull-up protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkoutType {
    #[serde(rename = "Max Day")]
    MaxDay,
    #[serde(rename = "Sub Max Volume")]
    SubMaxVolume,
    #[serde(rename = "Ladder Volume")]
    LadderVolume,
}

impl WorkoutType {
    pub const ALL: [WorkoutType; 3] = [
        WorkoutType::MaxDay,
        WorkoutType::SubMaxVolume,
        WorkoutType::LadderVolume,
    ];

    /// Name used in the record store and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutType::MaxDay => "Max Day",
            WorkoutType::SubMaxVolume => "Sub Max Volume",
            WorkoutType::LadderVolume => "Ladder Volume",
        }
    }

    /// Short description shown when picking a workout
    pub fn description(&self) -> &'static str {
        match self {
            WorkoutType::MaxDay => "3 max effort sets, 5+ minute rest",
            WorkoutType::SubMaxVolume => "10 sets at 50% max, 1 minute rest",
            WorkoutType::LadderVolume => "5 ascending ladders, 30 second rest",
        }
    }

    /// Number of sets (or ladders) in the protocol
    pub fn max_sets(&self) -> usize {
        match self {
            WorkoutType::MaxDay => 3,
            WorkoutType::SubMaxVolume => 10,
            WorkoutType::LadderVolume => 5,
        }
    }

    /// Rest between sets (or rungs) in seconds
    pub fn rest_seconds(&self) -> u32 {
        match self {
            WorkoutType::MaxDay => 300,
            WorkoutType::SubMaxVolume => 60,
            WorkoutType::LadderVolume => 30,
        }
    }
}

impl fmt::Display for WorkoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkoutType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkoutType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown workout type: {}", s))
    }
}

/// Lifecycle of a stored workout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Owned by an active session
    #[default]
    InProgress,
    /// Read-only history
    Completed,
}

/// A single workout as persisted in the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    id: Uuid,
    date: DateTime<Utc>,
    #[serde(rename = "type")]
    workout_type: WorkoutType,
    /// Rep values in chronological set order
    sets: Vec<u32>,
    #[serde(default)]
    status: RecordStatus,
}

impl WorkoutRecord {
    /// Start a new, empty workout dated now
    pub fn new(workout_type: WorkoutType) -> Self {
        Self::with_date(workout_type, Utc::now())
    }

    pub fn with_date(workout_type: WorkoutType, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            workout_type,
            sets: Vec::new(),
            status: RecordStatus::InProgress,
        }
    }

    /// Rebuild a record from stored or received parts
    pub fn from_parts(
        id: Uuid,
        date: DateTime<Utc>,
        workout_type: WorkoutType,
        sets: Vec<u32>,
        status: RecordStatus,
    ) -> Self {
        Self {
            id,
            date,
            workout_type,
            sets,
            status,
        }
    }

    /// Build a completed record from a manual entry.
    ///
    /// Every set of the protocol must be filled with 1..=20 reps and the
    /// date may not lie in the future.
    pub fn manual(
        workout_type: WorkoutType,
        date: DateTime<Utc>,
        sets: Vec<u32>,
    ) -> Result<Self, RecordError> {
        if date > Utc::now() {
            return Err(RecordError::FutureDate);
        }
        validate_manual_sets(workout_type, &sets)?;

        let mut record = Self::with_date(workout_type, date);
        record.sets = sets;
        record.status = RecordStatus::Completed;
        Ok(record)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn workout_type(&self) -> WorkoutType {
        self.workout_type
    }

    pub fn sets(&self) -> &[u32] {
        &self.sets
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }

    /// Total reps performed.
    ///
    /// Ladder values are rung heights: a ladder that reached `n` means every
    /// rung 1..=n was performed, so it contributes `n * (n + 1) / 2`.
    pub fn total_reps(&self) -> u32 {
        total_reps_for(self.workout_type, &self.sets)
    }

    pub fn completed_set_count(&self) -> usize {
        self.sets.len()
    }

    /// Highest single set, used to derive the Sub-Max target
    pub fn best_set(&self) -> Option<u32> {
        self.sets.iter().copied().max()
    }

    /// Append a set value. Completed records are read-only.
    pub fn push_set(&mut self, reps: u32) -> Result<(), RecordError> {
        if self.is_completed() {
            return Err(RecordError::Completed);
        }
        self.sets.push(reps);
        Ok(())
    }

    /// Remove the most recent set value
    pub fn pop_set(&mut self) -> Result<Option<u32>, RecordError> {
        if self.is_completed() {
            return Err(RecordError::Completed);
        }
        Ok(self.sets.pop())
    }

    /// Replace every set during a manual edit
    pub fn replace_sets(&mut self, sets: Vec<u32>) -> Result<(), RecordError> {
        validate_manual_sets(self.workout_type, &sets)?;
        self.sets = sets;
        Ok(())
    }

    pub fn mark_completed(&mut self) {
        self.status = RecordStatus::Completed;
    }
}

/// Total reps for a list of set values under the given protocol
///
/// Saturates at `u32::MAX`; received records are not range checked.
pub fn total_reps_for(workout_type: WorkoutType, sets: &[u32]) -> u32 {
    let per_set = |n: u32| match workout_type {
        WorkoutType::LadderVolume => triangular(n),
        _ => n,
    };
    sets.iter()
        .fold(0u32, |total, &n| total.saturating_add(per_set(n)))
}

/// 1 + 2 + ... + n, saturating
pub fn triangular(n: u32) -> u32 {
    let n = u64::from(n);
    u32::try_from(n * (n + 1) / 2).unwrap_or(u32::MAX)
}

fn validate_manual_sets(workout_type: WorkoutType, sets: &[u32]) -> Result<(), RecordError> {
    let expected = workout_type.max_sets();
    if sets.len() > expected {
        return Err(RecordError::TooManySets {
            max: expected,
            got: sets.len(),
        });
    }
    if sets.len() < expected {
        return Err(RecordError::WrongSetCount {
            expected,
            got: sets.len(),
        });
    }

    for (index, &value) in sets.iter().enumerate() {
        if value == 0 || value > DEFAULT_SEED_CEILING {
            return Err(RecordError::RepsOutOfRange {
                index,
                value,
                max: DEFAULT_SEED_CEILING,
            });
        }
    }

    Ok(())
}
