//! Display projection of set progress.
//!
//! Derived entirely from session state on every call; holds nothing of its own.

use serde::{Deserialize, Serialize};

/// Label for the current set before any reps are known
pub const NOT_STARTED_MARKER: &str = "↓";

/// Label for sets not reached yet
pub const FUTURE_PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetStatus {
    Completed,
    Current,
    Future,
}

/// One box in the progress strip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSlot {
    /// 1-based set number
    pub number: usize,
    pub status: SetStatus,
    /// Recorded value for completed sets, live value for the current set
    pub value: Option<u32>,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProgress {
    pub slots: Vec<SetSlot>,
}

impl SetProgress {
    /// Classify each of `total_sets` as completed, current or future.
    ///
    /// `live` is the value currently shown for the in-progress set (selector
    /// value or rungs done so far); zero or `None` renders as not started.
    pub fn project(total_sets: usize, completed: &[u32], live: Option<u32>) -> Self {
        let done = completed.len();
        let slots = (0..total_sets)
            .map(|index| {
                let number = index + 1;
                if index < done {
                    let value = completed[index];
                    SetSlot {
                        number,
                        status: SetStatus::Completed,
                        value: Some(value),
                        label: value.to_string(),
                    }
                } else if index == done {
                    let value = live.filter(|&v| v > 0);
                    SetSlot {
                        number,
                        status: SetStatus::Current,
                        value,
                        label: value.map_or_else(|| NOT_STARTED_MARKER.to_string(), |v| v.to_string()),
                    }
                } else {
                    SetSlot {
                        number,
                        status: SetStatus::Future,
                        value: None,
                        label: FUTURE_PLACEHOLDER.to_string(),
                    }
                }
            })
            .collect();

        Self { slots }
    }

    pub fn completed_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.status == SetStatus::Completed)
            .count()
    }

    pub fn current(&self) -> Option<&SetSlot> {
        self.slots
            .iter()
            .find(|slot| slot.status == SetStatus::Current)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.label.as_str()).collect()
    }
}
