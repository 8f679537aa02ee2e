//! Workout session state machine.
//!
//! One parametrised session drives all three protocols. Whole-set protocols
//! (Max Day, Sub-Max Volume) alternate between performing a set and entering
//! its rep count during the following rest. Ladder Volume builds each ladder
//! from single rungs, each followed by its own rest, until the user confirms
//! the ladder.
//!
//! The session owns its [`RestTimer`] and is driven by two inputs only: user
//! actions and `tick()`. Everything the host needs to react to is published
//! on an unbounded event channel.

use chrono::Duration;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, trace, warn};

use crate::database::RecordStore;
use crate::error::{PullupError, SessionError};
use crate::models::{total_reps_for, WorkoutRecord};
use crate::progress::SetProgress;
use crate::protocol::{Granularity, LadderRecording, ProtocolSpec};
use crate::summary::WorkoutSummary;
use crate::timer::{Clock, RestTimer, TimerEvent, TimerSnapshot, DEFAULT_REDELIVERY_DELAY_MS};

/// Where the session is in its protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Performing set `set_index`
    Active { set_index: usize },
    /// Resting after set `set_index` while its rep count is entered.
    /// `expired` is set once the timer ran out with no reps selected.
    Resting { set_index: usize, expired: bool },
    /// Last set done; its count is entered and the workout finished by hand
    FinalEntry { set_index: usize },
    /// Performing rung `rep_in_ladder` (1-based) of ladder `ladder_index`
    ActiveRep { ladder_index: usize, rep_in_ladder: u32 },
    /// Resting after `rep_in_ladder` rungs of an unconfirmed ladder
    RestingAfterRep { ladder_index: usize, rep_in_ladder: u32 },
    /// Ladder recorded; the rest runs out before the next ladder
    ConfirmedRest { ladder_index: usize },
    Complete,
}

impl SessionState {
    pub fn is_resting(&self) -> bool {
        matches!(
            self,
            SessionState::Resting { .. }
                | SessionState::RestingAfterRep { .. }
                | SessionState::ConfirmedRest { .. }
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Active { set_index } => write!(f, "performing set {}", set_index + 1),
            SessionState::Resting { set_index, .. } => {
                write!(f, "resting after set {}", set_index + 1)
            }
            SessionState::FinalEntry { set_index } => {
                write!(f, "entering final set {}", set_index + 1)
            }
            SessionState::ActiveRep {
                ladder_index,
                rep_in_ladder,
            } => write!(f, "performing ladder {} rep {}", ladder_index + 1, rep_in_ladder),
            SessionState::RestingAfterRep { ladder_index, .. } => {
                write!(f, "resting in ladder {}", ladder_index + 1)
            }
            SessionState::ConfirmedRest { ladder_index } => {
                write!(f, "resting after confirmed ladder {}", ladder_index + 1)
            }
            SessionState::Complete => f.write_str("complete"),
        }
    }
}

/// Notifications published to the host
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RestStarted { unit_index: usize, seconds: u32 },
    RestEnded { unit_index: usize },
    SetRecorded { set_index: usize, reps: u32 },
    RepCompleted { ladder_index: usize, rep: u32 },
    LadderConfirmed { ladder_index: usize, max_reps: u32 },
    LadderConfirmationUndone { ladder_index: usize, max_reps: u32 },
    /// Rest ran out with zero reps selected; the rest continues
    InvalidRepSelection { set_index: usize },
    /// Saving failed; the session keeps going in memory
    StorageWriteFailed { message: String },
    /// Published exactly once, after the final record was saved
    WorkoutCompleted(WorkoutRecord),
}

/// Parametrised workout session
pub struct WorkoutSession<S: RecordStore> {
    spec: ProtocolSpec,
    record: WorkoutRecord,
    store: S,
    clock: Arc<dyn Clock>,
    timer: RestTimer,
    redelivery_delay: Duration,
    state: SessionState,
    candidate: u32,
    completed_ladders: Vec<u32>,
    completion_published: bool,
    events: UnboundedSender<SessionEvent>,
}

pub type MaxDaySession<S> = WorkoutSession<S>;
pub type SubMaxSession<S> = WorkoutSession<S>;
pub type LadderSession<S> = WorkoutSession<S>;

impl<S: RecordStore> WorkoutSession<S> {
    /// Start a session over a fresh record of the spec's protocol
    pub fn new(
        spec: ProtocolSpec,
        record: WorkoutRecord,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, UnboundedReceiver<SessionEvent>), SessionError> {
        if record.workout_type() != spec.workout_type {
            return Err(SessionError::IncompatibleRecord {
                reason: format!(
                    "{} record given to a {} session",
                    record.workout_type(),
                    spec.workout_type
                ),
            });
        }
        if record.is_completed() || !record.sets().is_empty() {
            return Err(SessionError::IncompatibleRecord {
                reason: "record already has progress".to_string(),
            });
        }

        let state = match spec.granularity {
            Granularity::WholeSet => SessionState::Active { set_index: 0 },
            Granularity::PerRep => SessionState::ActiveRep {
                ladder_index: 0,
                rep_in_ladder: 1,
            },
        };

        let (events, receiver) = mpsc::unbounded_channel();
        debug!(
            record_id = %record.id(),
            workout_type = %spec.workout_type,
            total_units = spec.total_units,
            rest_seconds = spec.rest_seconds,
            "Workout session started"
        );

        let redelivery_delay = Duration::milliseconds(DEFAULT_REDELIVERY_DELAY_MS);
        let session = Self {
            spec,
            record,
            store,
            clock,
            timer: RestTimer::new().with_redelivery_delay(redelivery_delay),
            redelivery_delay,
            state,
            candidate: 0,
            completed_ladders: Vec::new(),
            completion_published: false,
            events,
        };
        Ok((session, receiver))
    }

    pub fn max_day(
        record: WorkoutRecord,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, UnboundedReceiver<SessionEvent>), SessionError> {
        Self::new(ProtocolSpec::max_day(), record, store, clock)
    }

    /// `target` comes from Max Day history, see [`crate::ceiling::sub_max_target`]
    pub fn sub_max(
        record: WorkoutRecord,
        target: u32,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, UnboundedReceiver<SessionEvent>), SessionError> {
        Self::new(ProtocolSpec::sub_max(target), record, store, clock)
    }

    pub fn ladder(
        record: WorkoutRecord,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, UnboundedReceiver<SessionEvent>), SessionError> {
        Self::new(ProtocolSpec::ladder(), record, store, clock)
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self.timer = self.timer.with_redelivery_delay(delay);
        self
    }

    // ---------------------------------------------------------------------
    // Whole-set protocols
    // ---------------------------------------------------------------------

    /// The user finished performing the current set
    pub fn complete_set(&mut self) -> Result<(), SessionError> {
        let SessionState::Active { set_index } = self.state else {
            return Err(self.refuse("complete a set"));
        };

        self.candidate = self.spec.seed_candidate(set_index, self.record.sets());

        if set_index + 1 >= self.spec.total_units {
            self.transition(SessionState::FinalEntry { set_index });
        } else {
            self.start_rest(set_index);
            self.transition(SessionState::Resting {
                set_index,
                expired: false,
            });
        }
        Ok(())
    }

    /// Set the live rep count for the set being entered.
    ///
    /// The value is clamped to the set's ceiling; the clamped value is returned.
    pub fn select_reps(&mut self, reps: u32) -> Result<u32, SessionError> {
        let set_index = match self.state {
            SessionState::Resting { set_index, .. } | SessionState::FinalEntry { set_index } => {
                set_index
            }
            _ => return Err(self.refuse("select reps")),
        };

        self.candidate = self
            .spec
            .ceiling
            .clamp(set_index, self.record.sets(), reps);
        trace!(set_index, candidate = self.candidate, "Rep selection changed");
        Ok(self.candidate)
    }

    /// Save the final set and finish the workout
    pub fn complete_workout(&mut self) -> Result<(), SessionError> {
        let SessionState::FinalEntry { set_index } = self.state else {
            if self.state == SessionState::Complete {
                return Err(SessionError::AlreadyComplete);
            }
            return Err(self.refuse("complete the workout"));
        };
        if self.candidate == 0 {
            return Err(SessionError::InvalidRepSelection { set_index });
        }

        self.append_set(set_index, self.candidate);
        self.finish();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Ladder protocol
    // ---------------------------------------------------------------------

    /// The user performed the current rung of the ladder
    pub fn complete_rep(&mut self) -> Result<(), SessionError> {
        let SessionState::ActiveRep {
            ladder_index,
            rep_in_ladder,
        } = self.state
        else {
            return Err(self.refuse("complete a rep"));
        };

        if self.spec.ladder_recording == LadderRecording::PerRep {
            self.push_record_value(1);
            self.persist();
        }
        self.emit(SessionEvent::RepCompleted {
            ladder_index,
            rep: rep_in_ladder,
        });

        self.start_rest(ladder_index);
        self.transition(SessionState::RestingAfterRep {
            ladder_index,
            rep_in_ladder,
        });

        if rep_in_ladder > self.spec.ladder_rep_guard {
            debug!(ladder_index, rep_in_ladder, "Ladder rep guard reached, confirming ladder");
            self.confirm_set()?;
        }
        Ok(())
    }

    /// Mark the current ladder as finished.
    ///
    /// During a rest the confirmation can be undone until the rest ends. From
    /// an active rep the ladder is finalised immediately. Confirming the last
    /// ladder completes the workout.
    pub fn confirm_set(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::RestingAfterRep {
                ladder_index,
                rep_in_ladder,
            } => {
                self.record_ladder(ladder_index, rep_in_ladder);
                if self.is_last_unit(ladder_index) {
                    self.finish();
                } else {
                    self.transition(SessionState::ConfirmedRest { ladder_index });
                }
                Ok(())
            }
            SessionState::ActiveRep {
                ladder_index,
                rep_in_ladder,
            } if rep_in_ladder > 1 => {
                self.record_ladder(ladder_index, rep_in_ladder - 1);
                if self.is_last_unit(ladder_index) {
                    self.finish();
                } else {
                    self.transition(SessionState::ActiveRep {
                        ladder_index: ladder_index + 1,
                        rep_in_ladder: 1,
                    });
                }
                Ok(())
            }
            _ => Err(self.refuse("confirm the ladder")),
        }
    }

    /// Revert a ladder confirmation while its rest is still running.
    ///
    /// Under [`LadderRecording::PerRep`] the per-rung entries already written
    /// to the record stay; only the ladder tally is retracted.
    pub fn undo_confirm(&mut self) -> Result<(), SessionError> {
        let SessionState::ConfirmedRest { ladder_index } = self.state else {
            return Err(self.refuse("undo the ladder confirmation"));
        };
        let Some(max_reps) = self.completed_ladders.pop() else {
            return Err(self.refuse("undo the ladder confirmation"));
        };

        if self.spec.ladder_recording == LadderRecording::PerLadder {
            self.pop_record_value();
            self.persist();
        }

        self.emit(SessionEvent::LadderConfirmationUndone {
            ladder_index,
            max_reps,
        });
        self.transition(SessionState::RestingAfterRep {
            ladder_index,
            rep_in_ladder: max_reps,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Rest handling
    // ---------------------------------------------------------------------

    /// Advance the rest timer from the clock. Returns whether the state changed.
    pub fn tick(&mut self) -> bool {
        if !self.state.is_resting() {
            return false;
        }
        if let SessionState::Resting { expired: true, .. } = self.state {
            return false;
        }

        match self.timer.tick(self.clock.now()) {
            Some(TimerEvent::Completed) => self.on_rest_expired(),
            None => false,
        }
    }

    /// End the current rest by hand
    pub fn finish_rest(&mut self) -> Result<(), SessionError> {
        if !self.state.is_resting() {
            return Err(self.refuse("finish the rest"));
        }
        if let SessionState::Resting { set_index, .. } = self.state {
            if self.candidate == 0 {
                return Err(SessionError::InvalidRepSelection { set_index });
            }
        }

        self.timer.stop();
        self.end_rest();
        Ok(())
    }

    /// Debug shortcut: leave `to_seconds` on the running rest
    pub fn fast_forward_rest(&mut self, to_seconds: u32) -> bool {
        self.state.is_resting() && self.timer.fast_forward(to_seconds, self.clock.now())
    }

    /// Timer state to persist when the host is suspended
    pub fn timer_snapshot(&self) -> Option<TimerSnapshot> {
        if self.state.is_resting() {
            self.timer.snapshot()
        } else {
            None
        }
    }

    /// Rebuild the rest timer from a persisted snapshot.
    ///
    /// An elapsed rest completes on a later `tick`, never during this call.
    pub fn restore_timer(&mut self, snapshot: TimerSnapshot) -> Result<(), SessionError> {
        if !self.state.is_resting() {
            return Err(self.refuse("restore the rest timer"));
        }
        self.timer = RestTimer::restore(snapshot, self.clock.now(), self.redelivery_delay);
        debug!(
            remaining = self.timer.remaining_whole_seconds(),
            "Rest timer restored"
        );
        Ok(())
    }

    /// Stop the rest timer before the host discards the session
    pub fn cancel(&mut self) {
        self.timer.stop();
        debug!(record_id = %self.record.id(), state = %self.state, "Workout session cancelled");
    }

    fn on_rest_expired(&mut self) -> bool {
        if let SessionState::Resting { set_index, .. } = self.state {
            if self.candidate == 0 {
                info!(set_index, "Rest expired with no reps selected");
                self.emit(SessionEvent::InvalidRepSelection { set_index });
                self.state = SessionState::Resting {
                    set_index,
                    expired: true,
                };
                return true;
            }
        }
        self.end_rest();
        true
    }

    fn end_rest(&mut self) {
        match self.state {
            SessionState::Resting { set_index, .. } => {
                self.append_set(set_index, self.candidate);
                self.candidate = 0;
                self.emit(SessionEvent::RestEnded {
                    unit_index: set_index,
                });
                self.transition(SessionState::Active {
                    set_index: set_index + 1,
                });
            }
            SessionState::RestingAfterRep {
                ladder_index,
                rep_in_ladder,
            } => {
                self.emit(SessionEvent::RestEnded {
                    unit_index: ladder_index,
                });
                self.transition(SessionState::ActiveRep {
                    ladder_index,
                    rep_in_ladder: rep_in_ladder + 1,
                });
            }
            SessionState::ConfirmedRest { ladder_index } => {
                self.emit(SessionEvent::RestEnded {
                    unit_index: ladder_index,
                });
                self.transition(SessionState::ActiveRep {
                    ladder_index: ladder_index + 1,
                    rep_in_ladder: 1,
                });
            }
            _ => {}
        }
    }

    fn start_rest(&mut self, unit_index: usize) {
        self.timer.start(self.spec.rest_seconds, self.clock.now());
        self.emit(SessionEvent::RestStarted {
            unit_index,
            seconds: self.spec.rest_seconds,
        });
    }

    // ---------------------------------------------------------------------
    // Recording
    // ---------------------------------------------------------------------

    fn append_set(&mut self, set_index: usize, reps: u32) {
        self.push_record_value(reps);
        self.persist();
        self.emit(SessionEvent::SetRecorded { set_index, reps });
    }

    fn record_ladder(&mut self, ladder_index: usize, max_reps: u32) {
        self.completed_ladders.push(max_reps);
        if self.spec.ladder_recording == LadderRecording::PerLadder {
            self.push_record_value(max_reps);
            self.persist();
        }
        self.emit(SessionEvent::LadderConfirmed {
            ladder_index,
            max_reps,
        });
    }

    fn push_record_value(&mut self, value: u32) {
        if let Err(e) = self.record.push_set(value) {
            warn!(record_id = %self.record.id(), error = %e, "Set not appended");
        }
    }

    fn pop_record_value(&mut self) {
        if let Err(e) = self.record.pop_set() {
            warn!(record_id = %self.record.id(), error = %e, "Set not removed");
        }
    }

    /// Save the record; failures are reported but in-memory state stands
    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.record) {
            let error = PullupError::from(e);
            error.log(&format!("Failed to save workout {}", self.record.id()));
            self.emit(SessionEvent::StorageWriteFailed {
                message: error.user_message(),
            });
        }
    }

    fn finish(&mut self) {
        self.timer.stop();
        self.record.mark_completed();
        self.persist();
        self.transition(SessionState::Complete);

        if !self.completion_published {
            self.completion_published = true;
            info!(
                record_id = %self.record.id(),
                workout_type = %self.record.workout_type(),
                total_reps = self.total_reps(),
                "Workout completed"
            );
            self.emit(SessionEvent::WorkoutCompleted(self.record.clone()));
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "Session transition");
        self.state = next;
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event receiver dropped");
        }
    }

    fn refuse(&self, action: &'static str) -> SessionError {
        if self.state == SessionState::Complete {
            return SessionError::AlreadyComplete;
        }
        SessionError::InvalidAction {
            action,
            state: self.state.to_string(),
        }
    }

    fn is_last_unit(&self, index: usize) -> bool {
        index + 1 >= self.spec.total_units
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn spec(&self) -> &ProtocolSpec {
        &self.spec
    }

    pub fn record(&self) -> &WorkoutRecord {
        &self.record
    }

    pub fn timer(&self) -> &RestTimer {
        &self.timer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Live rep count being entered
    pub fn candidate(&self) -> u32 {
        self.candidate
    }

    /// Ladder maxima confirmed so far
    pub fn completed_ladders(&self) -> &[u32] {
        &self.completed_ladders
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, SessionState::ConfirmedRest { .. })
    }

    /// Finished sets, or finished ladders for the ladder protocol
    pub fn completed_units(&self) -> &[u32] {
        match self.spec.granularity {
            Granularity::WholeSet => self.record.sets(),
            Granularity::PerRep => &self.completed_ladders,
        }
    }

    /// Ceiling for the set whose count is being entered
    pub fn current_ceiling(&self) -> Option<u32> {
        match self.state {
            SessionState::Resting { set_index, .. } | SessionState::FinalEntry { set_index } => {
                Some(self.spec.ceiling.ceiling(set_index, self.record.sets()))
            }
            _ => None,
        }
    }

    /// Reps performed so far. Ladders count every rung up to their max.
    pub fn total_reps(&self) -> u32 {
        total_reps_for(self.spec.workout_type, self.completed_units())
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Anything performed yet, including unconfirmed ladder rungs
    pub fn has_progress(&self) -> bool {
        !self.record.sets().is_empty()
            || !self.completed_ladders.is_empty()
            || self.live_value().is_some_and(|reps| reps > 0)
            || !matches!(
                self.state,
                SessionState::Active { set_index: 0 }
                    | SessionState::ActiveRep {
                        ladder_index: 0,
                        rep_in_ladder: 1
                    }
            )
    }

    /// Started but fewer units finished than the protocol requires
    pub fn is_partial(&self) -> bool {
        !self.is_complete() && self.has_progress()
    }

    /// True once the final set is entered with a non-zero count
    pub fn can_complete(&self) -> bool {
        matches!(self.state, SessionState::FinalEntry { .. }) && self.candidate > 0
    }

    pub fn remaining_units(&self) -> usize {
        self.spec
            .total_units
            .saturating_sub(self.completed_units().len())
    }

    /// Display projection of completed, current and future units
    pub fn progress(&self) -> SetProgress {
        SetProgress::project(self.spec.total_units, self.completed_units(), self.live_value())
    }

    fn live_value(&self) -> Option<u32> {
        match self.state {
            SessionState::Resting { .. } | SessionState::FinalEntry { .. } => Some(self.candidate),
            SessionState::ActiveRep { rep_in_ladder, .. } => Some(rep_in_ladder - 1),
            SessionState::RestingAfterRep { rep_in_ladder, .. } => Some(rep_in_ladder),
            _ => None,
        }
    }

    /// Completion card data from the finished units.
    ///
    /// Ladders are summarised from their confirmed maxima, whatever
    /// [`LadderRecording`] wrote to the record.
    pub fn summary(&self) -> WorkoutSummary {
        WorkoutSummary::from_units(
            self.spec.workout_type,
            self.record.date(),
            self.completed_units(),
            self.spec.target_reps(),
        )
    }

    pub fn into_record(self) -> WorkoutRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryRecordStore;
    use crate::error::StorageError;
    use crate::models::WorkoutType;
    use crate::timer::ManualClock;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 28, 7, 0, 0).unwrap()
    }

    fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn completions(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::WorkoutCompleted(_)))
            .count()
    }

    fn max_day(
        clock: &ManualClock,
    ) -> (
        WorkoutSession<MemoryRecordStore>,
        UnboundedReceiver<SessionEvent>,
    ) {
        let record = WorkoutRecord::with_date(WorkoutType::MaxDay, start());
        let mut store = MemoryRecordStore::new();
        store.insert(&record).unwrap();
        WorkoutSession::max_day(record, store, Arc::new(clock.clone())).unwrap()
    }

    fn ladder(
        clock: &ManualClock,
        recording: LadderRecording,
    ) -> (
        WorkoutSession<MemoryRecordStore>,
        UnboundedReceiver<SessionEvent>,
    ) {
        let record = WorkoutRecord::with_date(WorkoutType::LadderVolume, start());
        let spec = ProtocolSpec::ladder().with_ladder_recording(recording);
        WorkoutSession::new(spec, record, MemoryRecordStore::new(), Arc::new(clock.clone()))
            .unwrap()
    }

    fn rest_out(session: &mut WorkoutSession<MemoryRecordStore>, clock: &ManualClock) -> bool {
        clock.advance_secs(i64::from(session.spec().rest_seconds));
        session.tick()
    }

    struct FailingStore;

    impl RecordStore for FailingStore {
        fn insert(&mut self, _record: &WorkoutRecord) -> Result<(), StorageError> {
            Ok(())
        }
        fn save(&mut self, _record: &WorkoutRecord) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed {
                reason: "disk full".to_string(),
            })
        }
        fn delete(&mut self, _id: Uuid) -> Result<(), StorageError> {
            Ok(())
        }
        fn get(&self, _id: Uuid) -> Result<Option<WorkoutRecord>, StorageError> {
            Ok(None)
        }
        fn list(&self) -> Result<Vec<WorkoutRecord>, StorageError> {
            Ok(Vec::new())
        }
        fn latest_completed(
            &self,
            _workout_type: WorkoutType,
        ) -> Result<Option<WorkoutRecord>, StorageError> {
            Ok(None)
        }
    }

    #[test]
    fn test_max_day_end_to_end() {
        let clock = ManualClock::new(start());
        let (mut session, mut rx) = max_day(&clock);

        // Set 1: entry starts at zero with the seed ceiling
        session.complete_set().unwrap();
        assert_eq!(session.candidate(), 0);
        assert_eq!(session.current_ceiling(), Some(20));
        session.select_reps(10).unwrap();
        assert!(rest_out(&mut session, &clock));
        assert_eq!(session.state(), SessionState::Active { set_index: 1 });

        // Set 2: capped by set 1
        session.complete_set().unwrap();
        assert_eq!(session.current_ceiling(), Some(10));
        assert_eq!(session.candidate(), 10);
        session.select_reps(8).unwrap();
        assert!(rest_out(&mut session, &clock));

        // Set 3: no rest, finished by hand
        session.complete_set().unwrap();
        assert_eq!(session.state(), SessionState::FinalEntry { set_index: 2 });
        assert_eq!(session.current_ceiling(), Some(8));
        session.select_reps(5).unwrap();
        session.complete_workout().unwrap();

        assert!(session.is_complete());
        assert_eq!(session.record().sets(), &[10, 8, 5]);
        assert_eq!(session.total_reps(), 23);
        assert!(session.record().is_completed());

        let events = drain(&mut rx);
        assert_eq!(completions(&events), 1);
        assert_eq!(session.complete_workout(), Err(SessionError::AlreadyComplete));
        assert_eq!(completions(&drain(&mut rx)), 0);
    }

    #[test]
    fn test_ceiling_follows_recorded_set() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = max_day(&clock);

        session.complete_set().unwrap();
        session.select_reps(8).unwrap();
        rest_out(&mut session, &clock);

        session.complete_set().unwrap();
        assert_eq!(session.current_ceiling(), Some(8));
        assert_eq!(session.select_reps(12).unwrap(), 8);
        rest_out(&mut session, &clock);

        session.complete_set().unwrap();
        assert_eq!(session.current_ceiling(), Some(8));
    }

    #[test]
    fn test_zero_reps_refused_on_expiry() {
        let clock = ManualClock::new(start());
        let (mut session, mut rx) = max_day(&clock);

        session.complete_set().unwrap();
        drain(&mut rx);
        assert!(rest_out(&mut session, &clock));

        assert_eq!(
            session.state(),
            SessionState::Resting {
                set_index: 0,
                expired: true
            }
        );
        assert!(session.record().sets().is_empty());
        assert_eq!(
            drain(&mut rx),
            vec![SessionEvent::InvalidRepSelection { set_index: 0 }]
        );

        // Later ticks do nothing until the user picks a value
        clock.advance_secs(10);
        assert!(!session.tick());
        assert_eq!(
            session.finish_rest(),
            Err(SessionError::InvalidRepSelection { set_index: 0 })
        );

        session.select_reps(7).unwrap();
        session.finish_rest().unwrap();
        assert_eq!(session.record().sets(), &[7]);
        assert_eq!(session.state(), SessionState::Active { set_index: 1 });
    }

    #[test]
    fn test_final_entry_requires_reps() {
        let clock = ManualClock::new(start());
        let record = WorkoutRecord::with_date(WorkoutType::MaxDay, start());
        let spec = ProtocolSpec::max_day().with_total_units(1);
        let (mut session, _rx) =
            WorkoutSession::new(spec, record, MemoryRecordStore::new(), Arc::new(clock)).unwrap();

        session.complete_set().unwrap();
        assert!(!session.can_complete());
        assert_eq!(
            session.complete_workout(),
            Err(SessionError::InvalidRepSelection { set_index: 0 })
        );
        session.select_reps(3).unwrap();
        assert!(session.can_complete());
        session.complete_workout().unwrap();
        assert_eq!(session.record().sets(), &[3]);
    }

    #[test]
    fn test_sub_max_seeds_target() {
        let clock = ManualClock::new(start());
        let record = WorkoutRecord::with_date(WorkoutType::SubMaxVolume, start());
        let (mut session, _rx) =
            WorkoutSession::sub_max(record, 6, MemoryRecordStore::new(), Arc::new(clock.clone()))
                .unwrap();

        session.complete_set().unwrap();
        assert_eq!(session.candidate(), 6);
        assert_eq!(session.current_ceiling(), Some(20));
        session.select_reps(4).unwrap();
        rest_out(&mut session, &clock);

        session.complete_set().unwrap();
        assert_eq!(session.current_ceiling(), Some(4));
        assert_eq!(session.candidate(), 4);
        assert_eq!(session.spec().total_units, 10);
        assert_eq!(session.timer().total_seconds(), 60);
    }

    #[test]
    fn test_rest_survives_suspension() {
        let clock = ManualClock::new(start());
        let (mut session, mut rx) = max_day(&clock);

        session.complete_set().unwrap();
        session.select_reps(9).unwrap();
        drain(&mut rx);

        // Suspended for longer than the rest
        clock.advance_secs(400);
        assert!(session.tick());
        assert_eq!(session.record().sets(), &[9]);

        let recorded = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::SetRecorded { .. }))
            .count();
        assert_eq!(recorded, 1);
        assert!(!session.tick());
    }

    #[test]
    fn test_restored_timer_completes_on_later_tick() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = max_day(&clock);

        session.complete_set().unwrap();
        session.select_reps(9).unwrap();
        let snapshot = session.timer_snapshot().unwrap();

        clock.advance_secs(600);
        session.restore_timer(snapshot).unwrap();
        assert_eq!(session.timer().remaining_whole_seconds(), 0);
        assert!(session.record().sets().is_empty());

        assert!(!session.tick());
        clock.advance(Duration::milliseconds(100));
        assert!(session.tick());
        assert_eq!(session.record().sets(), &[9]);
    }

    #[test]
    fn test_fast_forward_rest() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = max_day(&clock);
        assert!(!session.fast_forward_rest(5));

        session.complete_set().unwrap();
        session.select_reps(10).unwrap();
        assert!(session.fast_forward_rest(5));
        clock.advance_secs(5);
        assert!(session.tick());
        assert_eq!(session.record().sets(), &[10]);
    }

    #[test]
    fn test_storage_failure_keeps_session_going() {
        let clock = ManualClock::new(start());
        let record = WorkoutRecord::with_date(WorkoutType::MaxDay, start());
        let (mut session, mut rx) =
            WorkoutSession::max_day(record, FailingStore, Arc::new(clock.clone())).unwrap();

        session.complete_set().unwrap();
        session.select_reps(10).unwrap();
        clock.advance_secs(300);
        assert!(session.tick());

        assert_eq!(session.record().sets(), &[10]);
        assert_eq!(session.state(), SessionState::Active { set_index: 1 });
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SessionEvent::StorageWriteFailed { .. })));
    }

    #[test]
    fn test_ladder_confirm_records_atomic_reps() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = ladder(&clock, LadderRecording::PerRep);

        for _ in 0..2 {
            session.complete_rep().unwrap();
            session.finish_rest().unwrap();
        }
        session.complete_rep().unwrap();
        assert_eq!(
            session.state(),
            SessionState::RestingAfterRep {
                ladder_index: 0,
                rep_in_ladder: 3
            }
        );

        session.confirm_set().unwrap();
        assert!(session.is_confirmed());
        assert_eq!(session.completed_ladders(), &[3]);
        assert_eq!(session.record().sets(), &[1, 1, 1]);
        assert_eq!(session.total_reps(), 6);
    }

    #[test]
    fn test_ladder_undo_keeps_atomic_reps() {
        let clock = ManualClock::new(start());
        let (mut session, mut rx) = ladder(&clock, LadderRecording::PerRep);

        for _ in 0..2 {
            session.complete_rep().unwrap();
            session.finish_rest().unwrap();
        }
        session.complete_rep().unwrap();
        session.confirm_set().unwrap();
        drain(&mut rx);

        session.undo_confirm().unwrap();
        assert!(session.completed_ladders().is_empty());
        assert!(!session.is_confirmed());
        assert_eq!(session.record().sets().len(), 3);
        assert_eq!(
            drain(&mut rx),
            vec![SessionEvent::LadderConfirmationUndone {
                ladder_index: 0,
                max_reps: 3
            }]
        );

        // Keep climbing after the undo
        session.finish_rest().unwrap();
        assert_eq!(
            session.state(),
            SessionState::ActiveRep {
                ladder_index: 0,
                rep_in_ladder: 4
            }
        );
    }

    #[test]
    fn test_ladder_per_ladder_recording_is_symmetric() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = ladder(&clock, LadderRecording::PerLadder);

        session.complete_rep().unwrap();
        session.finish_rest().unwrap();
        session.complete_rep().unwrap();
        session.confirm_set().unwrap();
        assert_eq!(session.record().sets(), &[2]);

        session.undo_confirm().unwrap();
        assert!(session.record().sets().is_empty());
    }

    #[test]
    fn test_ladder_confirmed_rest_advances_ladder() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = ladder(&clock, LadderRecording::PerRep);

        session.complete_rep().unwrap();
        session.confirm_set().unwrap();
        assert!(rest_out(&mut session, &clock));
        assert_eq!(
            session.state(),
            SessionState::ActiveRep {
                ladder_index: 1,
                rep_in_ladder: 1
            }
        );
        assert_eq!(session.progress().labels(), vec!["1", "↓", "-", "-", "-"]);
    }

    #[test]
    fn test_ladder_confirm_while_active() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = ladder(&clock, LadderRecording::PerRep);

        // Nothing performed yet
        assert!(session.confirm_set().is_err());

        session.complete_rep().unwrap();
        session.finish_rest().unwrap();
        session.confirm_set().unwrap();
        assert_eq!(session.completed_ladders(), &[1]);
        assert_eq!(
            session.state(),
            SessionState::ActiveRep {
                ladder_index: 1,
                rep_in_ladder: 1
            }
        );
    }

    #[test]
    fn test_ladder_rep_guard_confirms() {
        let clock = ManualClock::new(start());
        let record = WorkoutRecord::with_date(WorkoutType::LadderVolume, start());
        let spec = ProtocolSpec::ladder().with_ladder_rep_guard(2);
        let (mut session, _rx) =
            WorkoutSession::new(spec, record, MemoryRecordStore::new(), Arc::new(clock)).unwrap();

        for _ in 0..2 {
            session.complete_rep().unwrap();
            session.finish_rest().unwrap();
        }
        session.complete_rep().unwrap();
        assert_eq!(session.completed_ladders(), &[3]);
        assert_eq!(session.state(), SessionState::ConfirmedRest { ladder_index: 0 });
    }

    #[test]
    fn test_final_ladder_completes_workout() {
        let clock = ManualClock::new(start());
        let (mut session, mut rx) = ladder(&clock, LadderRecording::PerRep);

        for ladder_index in 0..5 {
            session.complete_rep().unwrap();
            session.confirm_set().unwrap();
            if ladder_index < 4 {
                session.finish_rest().unwrap();
            }
        }

        assert!(session.is_complete());
        assert_eq!(session.completed_ladders(), &[1, 1, 1, 1, 1]);
        assert!(!session.timer().is_running());
        assert_eq!(completions(&drain(&mut rx)), 1);
        assert!(session.undo_confirm().is_err());
    }

    #[test]
    fn test_ladder_summary_uses_confirmed_ladders() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = ladder(&clock, LadderRecording::PerRep);

        for _ in 0..5 {
            for _ in 0..2 {
                session.complete_rep().unwrap();
                session.finish_rest().unwrap();
            }
            session.complete_rep().unwrap();
            session.confirm_set().unwrap();
            if !session.is_complete() {
                session.finish_rest().unwrap();
            }
        }

        assert!(session.is_complete());
        assert_eq!(session.record().sets().len(), 15);

        let summary = session.summary();
        assert_eq!(summary.total_reps, 30);
        assert_eq!(summary.total_reps, session.total_reps());
        assert_eq!(summary.completed_sets, 5);
        assert_eq!(summary.average_set, 3.0);
        assert_eq!(summary.sets, vec![3, 3, 3, 3, 3]);
    }

    #[test]
    fn test_sub_max_summary_carries_target() {
        let clock = ManualClock::new(start());
        let record = WorkoutRecord::with_date(WorkoutType::SubMaxVolume, start());
        let spec = ProtocolSpec::sub_max(5).with_total_units(2);
        let (mut session, _rx) =
            WorkoutSession::new(spec, record, MemoryRecordStore::new(), Arc::new(clock.clone()))
                .unwrap();

        session.complete_set().unwrap();
        rest_out(&mut session, &clock);
        session.complete_set().unwrap();
        session.select_reps(4).unwrap();
        session.complete_workout().unwrap();

        let target = session.summary().target.unwrap();
        assert_eq!(target.target_reps, 5);
        assert_eq!(target.sets_on_target, 1);
        assert_eq!(target.percent_of_target, 90);
    }

    #[test]
    fn test_progress_projection() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = max_day(&clock);
        assert_eq!(session.progress().labels(), vec!["↓", "-", "-"]);
        assert!(!session.has_progress());

        session.complete_set().unwrap();
        session.select_reps(11).unwrap();
        assert_eq!(session.progress().labels(), vec!["11", "-", "-"]);
        assert!(session.is_partial());

        rest_out(&mut session, &clock);
        assert_eq!(session.progress().labels(), vec!["11", "↓", "-"]);
        assert_eq!(session.remaining_units(), 2);
    }

    #[test]
    fn test_actions_refused_in_wrong_state() {
        let clock = ManualClock::new(start());
        let (mut session, _rx) = max_day(&clock);

        assert!(matches!(
            session.select_reps(3),
            Err(SessionError::InvalidAction { .. })
        ));
        assert!(matches!(
            session.complete_rep(),
            Err(SessionError::InvalidAction { .. })
        ));
        assert!(session.finish_rest().is_err());
        assert!(session.restore_timer(TimerSnapshot {
            end_time: start(),
            total_seconds: 300
        })
        .is_err());
    }

    #[test]
    fn test_rejects_incompatible_record() {
        let clock = ManualClock::new(start());
        let record = WorkoutRecord::with_date(WorkoutType::LadderVolume, start());
        let result = WorkoutSession::max_day(record, MemoryRecordStore::new(), Arc::new(clock));
        assert!(matches!(
            result,
            Err(SessionError::IncompatibleRecord { .. })
        ));
    }
}
