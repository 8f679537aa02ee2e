//! Per-set rep ceilings.
//!
//! Effort never increases between sets of a protocol: every set after the
//! first is capped by the set before it, with a floor of one rep so a
//! zero-rep set cannot lock the selector at zero.

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::models::{WorkoutRecord, WorkoutType};

/// Upper bound for the first set of any protocol
pub const DEFAULT_SEED_CEILING: u32 = 20;

/// Sub-Max target used when no Max Day history exists
pub const DEFAULT_SUB_MAX_TARGET: u32 = 5;

/// Headroom above the Sub-Max target on the first-set selector
const SUB_MAX_TARGET_HEADROOM: u32 = 10;

/// Ceiling for set `index` (0-based) given the sets recorded before it.
///
/// The caller guarantees `index <= prior_sets.len()`; an index with no
/// recorded predecessor falls back to the seed ceiling.
pub fn rep_ceiling(workout_type: WorkoutType, index: usize, prior_sets: &[u32]) -> u32 {
    CeilingRule::for_type(workout_type).ceiling(index, prior_sets)
}

/// Ceiling rule for one session: a seed for the first set, then "no more
/// than the previous set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeilingRule {
    pub seed: u32,
}

impl CeilingRule {
    pub fn for_type(_workout_type: WorkoutType) -> Self {
        Self {
            seed: DEFAULT_SEED_CEILING,
        }
    }

    /// Sub-Max first-set selector: room above the target for a good day
    pub fn sub_max(target: u32) -> Self {
        Self {
            seed: DEFAULT_SEED_CEILING.max(target + SUB_MAX_TARGET_HEADROOM),
        }
    }

    pub fn ceiling(&self, index: usize, prior_sets: &[u32]) -> u32 {
        if index == 0 {
            return self.seed;
        }
        prior_sets
            .get(index - 1)
            .map_or(self.seed, |&previous| previous.max(1))
    }

    /// Clamp a selector value into `0..=ceiling`
    pub fn clamp(&self, index: usize, prior_sets: &[u32], value: u32) -> u32 {
        value.min(self.ceiling(index, prior_sets))
    }
}

/// Check that every set respects the ceiling derived from its predecessor
pub fn validate_progression(rule: &CeilingRule, sets: &[u32]) -> Result<(), RecordError> {
    for (index, &value) in sets.iter().enumerate() {
        let ceiling = rule.ceiling(index, sets);
        if value > ceiling {
            return Err(RecordError::CeilingExceeded {
                index,
                value,
                ceiling,
            });
        }
    }
    Ok(())
}

/// Sub-Max target: half of the best set from the most recent completed Max
/// Day, never below one. Defaults to five without Max Day history.
pub fn sub_max_target(last_max_day: Option<&WorkoutRecord>) -> u32 {
    last_max_day
        .filter(|record| record.workout_type() == WorkoutType::MaxDay)
        .and_then(WorkoutRecord::best_set)
        .map_or(DEFAULT_SUB_MAX_TARGET, |best| (best / 2).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    #[test]
    fn test_first_set_uses_seed() {
        for workout_type in WorkoutType::ALL {
            assert_eq!(rep_ceiling(workout_type, 0, &[]), 20);
        }
        assert_eq!(CeilingRule::sub_max(6).ceiling(0, &[]), 20);
        assert_eq!(CeilingRule::sub_max(14).ceiling(0, &[]), 24);
    }

    #[test]
    fn test_ceiling_follows_previous_set() {
        assert_eq!(rep_ceiling(WorkoutType::MaxDay, 1, &[8]), 8);
        assert_eq!(rep_ceiling(WorkoutType::MaxDay, 2, &[8, 8]), 8);
        assert_eq!(rep_ceiling(WorkoutType::SubMaxVolume, 3, &[6, 6, 0]), 1);
    }

    #[test]
    fn test_clamp() {
        let rule = CeilingRule::for_type(WorkoutType::MaxDay);
        assert_eq!(rule.clamp(1, &[7], 12), 7);
        assert_eq!(rule.clamp(1, &[7], 3), 3);
        assert_eq!(rule.clamp(0, &[], 25), 20);
    }

    #[test]
    fn test_validate_progression() {
        let rule = CeilingRule::for_type(WorkoutType::MaxDay);
        assert!(validate_progression(&rule, &[10, 8, 8]).is_ok());
        assert_eq!(
            validate_progression(&rule, &[10, 11, 8]),
            Err(RecordError::CeilingExceeded {
                index: 1,
                value: 11,
                ceiling: 10
            })
        );
    }

    #[test]
    fn test_sub_max_target() {
        assert_eq!(sub_max_target(None), 5);

        let max_day =
            WorkoutRecord::manual(WorkoutType::MaxDay, Utc::now(), vec![13, 11, 9]).unwrap();
        assert_eq!(sub_max_target(Some(&max_day)), 6);

        let weak = WorkoutRecord::manual(WorkoutType::MaxDay, Utc::now(), vec![1, 1, 1]).unwrap();
        assert_eq!(sub_max_target(Some(&weak)), 1);

        let ladder =
            WorkoutRecord::manual(WorkoutType::LadderVolume, Utc::now(), vec![5, 5, 5, 5, 5])
                .unwrap();
        assert_eq!(sub_max_target(Some(&ladder)), 5);
    }

    proptest! {
        #[test]
        fn test_ceiling_properties(
            prior in proptest::collection::vec(0u32..40, 1..12),
            pick in 0usize..12,
        ) {
            let index = 1 + pick % prior.len();
            for workout_type in WorkoutType::ALL {
                let ceiling = rep_ceiling(workout_type, index, &prior);
                prop_assert_eq!(ceiling, prior[index - 1].max(1));
                prop_assert!(ceiling >= 1);
            }
        }
    }
}
