use serde::{Deserialize, Serialize};

use crate::ceiling::CeilingRule;
use crate::models::WorkoutType;

/// Soft cap on rungs per ladder before the ladder is confirmed automatically
pub const DEFAULT_LADDER_REP_GUARD: u32 = 10;

/// What one unit of progress in a protocol is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// A set is performed, then its rep count is entered during the rest
    WholeSet,
    /// A ladder is built from single rungs, each followed by its own rest
    PerRep,
}

/// How ladder progress is written to the workout record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderRecording {
    /// One `1` per completed rung; undoing a confirmation keeps them
    #[default]
    PerRep,
    /// The ladder max is appended on confirmation and removed on undo
    PerLadder,
}

/// Where the rep selector starts when a set's count is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSeed {
    /// First set starts at zero, later sets at their ceiling
    ZeroThenCeiling,
    /// Every set starts at the target, capped by its ceiling
    Target(u32),
}

/// Everything that distinguishes one protocol's session from another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSpec {
    pub workout_type: WorkoutType,

    /// Sets (or ladders) in the workout
    pub total_units: usize,

    /// Rest between sets (or rungs)
    pub rest_seconds: u32,

    pub granularity: Granularity,

    pub ceiling: CeilingRule,

    pub seed: CandidateSeed,

    /// Ladder protocols only
    pub ladder_recording: LadderRecording,

    /// Ladder protocols only
    pub ladder_rep_guard: u32,
}

impl ProtocolSpec {
    /// 3 max-effort sets with 5 minutes rest
    pub fn max_day() -> Self {
        Self::base(WorkoutType::MaxDay)
    }

    /// 10 sets around half of the last max, 1 minute rest
    pub fn sub_max(target: u32) -> Self {
        Self {
            ceiling: CeilingRule::sub_max(target),
            seed: CandidateSeed::Target(target),
            ..Self::base(WorkoutType::SubMaxVolume)
        }
    }

    /// 5 ascending ladders with 30 seconds between rungs
    pub fn ladder() -> Self {
        Self {
            granularity: Granularity::PerRep,
            ..Self::base(WorkoutType::LadderVolume)
        }
    }

    /// Default spec for a workout type. Sub-Max uses `sub_max_target`, which
    /// callers derive from Max Day history.
    pub fn for_type(workout_type: WorkoutType, sub_max_target: u32) -> Self {
        match workout_type {
            WorkoutType::MaxDay => Self::max_day(),
            WorkoutType::SubMaxVolume => Self::sub_max(sub_max_target),
            WorkoutType::LadderVolume => Self::ladder(),
        }
    }

    fn base(workout_type: WorkoutType) -> Self {
        Self {
            workout_type,
            total_units: workout_type.max_sets(),
            rest_seconds: workout_type.rest_seconds(),
            granularity: Granularity::WholeSet,
            ceiling: CeilingRule::for_type(workout_type),
            seed: CandidateSeed::ZeroThenCeiling,
            ladder_recording: LadderRecording::default(),
            ladder_rep_guard: DEFAULT_LADDER_REP_GUARD,
        }
    }

    pub fn with_rest_seconds(mut self, rest_seconds: u32) -> Self {
        self.rest_seconds = rest_seconds;
        self
    }

    pub fn with_total_units(mut self, total_units: usize) -> Self {
        self.total_units = total_units.max(1);
        self
    }

    pub fn with_ladder_recording(mut self, recording: LadderRecording) -> Self {
        self.ladder_recording = recording;
        self
    }

    pub fn with_ladder_rep_guard(mut self, guard: u32) -> Self {
        self.ladder_rep_guard = guard.max(1);
        self
    }

    /// Target reps per set, when the protocol has one
    pub fn target_reps(&self) -> Option<u32> {
        match self.seed {
            CandidateSeed::Target(target) => Some(target),
            CandidateSeed::ZeroThenCeiling => None,
        }
    }

    /// Starting selector value when entering the count for set `index`
    pub fn seed_candidate(&self, index: usize, prior_sets: &[u32]) -> u32 {
        let ceiling = self.ceiling.ceiling(index, prior_sets);
        match self.seed {
            CandidateSeed::ZeroThenCeiling if index == 0 => 0,
            CandidateSeed::ZeroThenCeiling => ceiling,
            CandidateSeed::Target(target) => target.min(ceiling),
        }
    }
}
