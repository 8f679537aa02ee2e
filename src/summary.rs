use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{total_reps_for, WorkoutRecord, WorkoutType};

/// How a Sub-Max workout went against its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub target_reps: u32,
    /// Sets that reached the target
    pub sets_on_target: usize,
    /// Total reps as a whole percentage of `sets * target`
    pub percent_of_target: u32,
}

/// Completion card data for one workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub workout_type: WorkoutType,
    pub date: DateTime<Utc>,
    pub sets: Vec<u32>,
    pub completed_sets: usize,
    pub total_reps: u32,
    pub best_set: Option<u32>,
    /// Mean set value (ladder max for Ladder Volume)
    pub average_set: f64,
    pub target: Option<TargetSummary>,
}

impl WorkoutSummary {
    /// Summarise a record. `target_reps` only applies to Sub-Max Volume.
    ///
    /// Ladder records written one rung at a time hold a `1` per rung; use
    /// [`WorkoutSummary::from_units`] with the confirmed ladders for those.
    pub fn from_record(record: &WorkoutRecord, target_reps: Option<u32>) -> Self {
        Self::from_units(
            record.workout_type(),
            record.date(),
            record.sets(),
            target_reps,
        )
    }

    /// Summarise finished units: set counts, or ladder maxima for Ladder Volume
    pub fn from_units(
        workout_type: WorkoutType,
        date: DateTime<Utc>,
        units: &[u32],
        target_reps: Option<u32>,
    ) -> Self {
        let sets = units.to_vec();
        let total_reps = total_reps_for(workout_type, &sets);
        let average_set = if sets.is_empty() {
            0.0
        } else {
            sets.iter().map(|&s| f64::from(s)).sum::<f64>() / sets.len() as f64
        };

        let target = target_reps
            .filter(|&t| t > 0 && workout_type == WorkoutType::SubMaxVolume)
            .map(|target_reps| {
                let target_total = sets.len() as u64 * u64::from(target_reps);
                TargetSummary {
                    target_reps,
                    sets_on_target: sets.iter().filter(|&&s| s >= target_reps).count(),
                    percent_of_target: if target_total == 0 {
                        0
                    } else {
                        u32::try_from(u64::from(total_reps) * 100 / target_total)
                            .unwrap_or(u32::MAX)
                    },
                }
            });

        Self {
            workout_type,
            date,
            completed_sets: sets.len(),
            total_reps,
            best_set: sets.iter().copied().max(),
            average_set,
            target,
            sets,
        }
    }
}
