//! Glue between a running session and the rest of the app.
//!
//! [`WorkoutHost`] owns the record store, the sync channel and the
//! configuration. [`ActiveWorkout`] is the handle a screen holds while one
//! workout is in progress: it pumps the rest timer, persists the timer across
//! suspension, forwards completed workouts to the counterpart device and
//! applies the abandon policy on exit.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::ceiling::{sub_max_target, DEFAULT_SUB_MAX_TARGET};
use crate::config::{AbandonPolicy, AppConfig};
use crate::database::RecordStore;
use crate::error::{PullupError, StorageError, TransportError};
use crate::models::{WorkoutRecord, WorkoutType};
use crate::session::{SessionEvent, SessionState, WorkoutSession};
use crate::sync::{import_received, DeliveryStatus, ImportReport, SyncChannel, SyncEvent, WatchLink};
use crate::timer::{Clock, TimerStateStore};

/// What leaving the workout screen should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Workout finished; nothing to clean up
    Leave,
    /// Delete the record without asking
    Discard,
    /// Ask the user before deleting partial progress
    ConfirmDiscard,
    /// Keep the partial record
    Keep,
}

/// Policy decision for leaving a workout with the given progress
pub fn exit_decision(policy: AbandonPolicy, is_complete: bool, has_progress: bool) -> ExitDecision {
    if is_complete {
        return ExitDecision::Leave;
    }
    match (policy, has_progress) {
        (_, false) | (AbandonPolicy::DiscardSilently, true) => ExitDecision::Discard,
        (AbandonPolicy::ConfirmIfStarted, true) => ExitDecision::ConfirmDiscard,
        (AbandonPolicy::KeepPartial, true) => ExitDecision::Keep,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    /// The user declined to discard; the workout continues
    Stayed,
    Discarded,
    Kept(WorkoutRecord),
    Finished(WorkoutRecord),
}

pub struct WorkoutHost<S, L>
where
    S: RecordStore + TimerStateStore,
    L: WatchLink,
{
    store: S,
    sync: SyncChannel<L>,
    sync_events: UnboundedReceiver<SyncEvent>,
    config: AppConfig,
    clock: Arc<dyn Clock>,
}

impl<S, L> WorkoutHost<S, L>
where
    S: RecordStore + TimerStateStore,
    L: WatchLink,
{
    pub fn new(store: S, link: L, config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        let (sync, sync_events) = SyncChannel::new(link);
        Self {
            store,
            sync,
            sync_events,
            config,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn sync(&self) -> &SyncChannel<L> {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncChannel<L> {
        &mut self.sync
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Sub-Max target from the latest completed Max Day
    pub fn sub_max_target(&self) -> Result<u32, StorageError> {
        let last_max_day = self.store.latest_completed(WorkoutType::MaxDay)?;
        Ok(sub_max_target(last_max_day.as_ref()))
    }

    /// Create the record for a new workout and start its session
    pub fn begin(
        &mut self,
        workout_type: WorkoutType,
    ) -> Result<ActiveWorkout<'_, S, L>, PullupError> {
        let target = match workout_type {
            WorkoutType::SubMaxVolume => self.sub_max_target().unwrap_or_else(|e| {
                warn!(error = %e, "Max Day history unavailable, using default target");
                DEFAULT_SUB_MAX_TARGET
            }),
            _ => DEFAULT_SUB_MAX_TARGET,
        };
        let spec = self.config.protocol_spec(workout_type, target);
        let record = WorkoutRecord::with_date(workout_type, self.clock.now());

        let Self {
            store,
            sync,
            config,
            clock,
            ..
        } = self;

        let mut startup_events = Vec::new();
        if let Err(e) = store.insert(&record) {
            let error = PullupError::from(e);
            error.log(&format!("Failed to insert new workout {}", record.id()));
            startup_events.push(SessionEvent::StorageWriteFailed {
                message: error.user_message(),
            });
        }

        info!(
            record_id = %record.id(),
            workout_type = %workout_type,
            total_units = spec.total_units,
            "Workout started"
        );

        let (session, events) = WorkoutSession::new(spec, record, store, Arc::clone(clock))?;
        Ok(ActiveWorkout {
            session: session.with_redelivery_delay(config.redelivery_delay()),
            events,
            startup_events,
            sync,
            config,
        })
    }

    /// Decode a message from the counterpart and import what it carried
    pub fn receive(&mut self, message: &Value) -> Result<ImportReport, TransportError> {
        self.sync.receive(message)?;
        Ok(self.import_received())
    }

    /// Import workouts already decoded by the sync channel
    pub fn import_received(&mut self) -> ImportReport {
        import_received(&mut self.store, &mut self.sync_events)
    }
}

/// One workout in progress
pub struct ActiveWorkout<'a, S, L>
where
    S: RecordStore + TimerStateStore,
    L: WatchLink,
{
    session: WorkoutSession<&'a mut S>,
    events: UnboundedReceiver<SessionEvent>,
    startup_events: Vec<SessionEvent>,
    sync: &'a mut SyncChannel<L>,
    config: &'a AppConfig,
}

impl<'a, S, L> ActiveWorkout<'a, S, L>
where
    S: RecordStore + TimerStateStore,
    L: WatchLink,
{
    pub fn session(&self) -> &WorkoutSession<&'a mut S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut WorkoutSession<&'a mut S> {
        &mut self.session
    }

    fn timer_key(&self) -> String {
        self.session.record().id().to_string()
    }

    /// Tick the rest timer and collect everything the session published.
    ///
    /// A completed workout is handed to the sync channel here.
    pub fn pump(&mut self) -> Vec<SessionEvent> {
        self.session.tick();

        let mut events = std::mem::take(&mut self.startup_events);
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }

        for event in &events {
            if let SessionEvent::WorkoutCompleted(record) = event {
                self.clear_timer_state();
                match self.sync.send_workout(record) {
                    Ok(DeliveryStatus::Failed) | Err(_) => {
                        debug!(record_id = %record.id(), "Workout not delivered to counterpart")
                    }
                    Ok(status) => debug!(record_id = %record.id(), ?status, "Workout handed to sync"),
                }
            }
        }
        events
    }

    /// Tick on the configured interval until the current rest is over
    pub async fn wait_for_rest(&mut self) -> Vec<SessionEvent> {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        let mut events = Vec::new();

        while self.rest_pending() {
            interval.tick().await;
            events.extend(self.pump());
        }
        events
    }

    fn rest_pending(&self) -> bool {
        match self.session.state() {
            SessionState::Resting { expired, .. } => !expired,
            state => state.is_resting(),
        }
    }

    /// Skip most of the rest if the shortcut is enabled
    pub fn fast_forward(&mut self) -> bool {
        match self.config.fast_forward_seconds() {
            Some(seconds) => self.session.fast_forward_rest(seconds),
            None => false,
        }
    }

    /// Persist the rest timer before the host is suspended
    pub fn suspend(&mut self) -> Result<(), StorageError> {
        let key = self.timer_key();
        match self.session.timer_snapshot() {
            Some(snapshot) => {
                debug!(record_id = %key, end_time = %snapshot.end_time, "Persisting rest timer");
                self.session.store_mut().save_timer(&key, &snapshot)
            }
            None => self.session.store_mut().clear_timer(&key),
        }
    }

    /// Rebuild the rest timer after the host resumes
    pub fn resume(&mut self) -> Result<(), PullupError> {
        let key = self.timer_key();
        let Some(snapshot) = self.session.store().load_timer(&key)? else {
            return Ok(());
        };

        if self.session.state().is_resting() {
            self.session.restore_timer(snapshot)?;
        }
        self.session.store_mut().clear_timer(&key)?;
        Ok(())
    }

    /// Policy decision for leaving now. Only sets already written to the
    /// record count as progress; a record with no sets is always deleted.
    pub fn exit_decision(&self) -> ExitDecision {
        exit_decision(
            self.config.session.abandon_policy,
            self.session.is_complete(),
            !self.session.record().sets().is_empty(),
        )
    }

    /// Leave the workout, applying the abandon policy.
    ///
    /// `confirmed` is the user's answer when the policy asks before
    /// discarding; without it the workout continues.
    pub fn exit(&mut self, confirmed: bool) -> Result<ExitOutcome, PullupError> {
        let decision = self.exit_decision();
        if decision == ExitDecision::ConfirmDiscard && !confirmed {
            return Ok(ExitOutcome::Stayed);
        }

        self.session.cancel();
        self.clear_timer_state();
        let record = self.session.record().clone();

        match decision {
            ExitDecision::Leave => Ok(ExitOutcome::Finished(record)),
            ExitDecision::Discard | ExitDecision::ConfirmDiscard => {
                match self.session.store_mut().delete(record.id()) {
                    Ok(()) | Err(StorageError::NotFound { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                info!(record_id = %record.id(), sets = record.sets().len(), "Workout discarded");
                Ok(ExitOutcome::Discarded)
            }
            ExitDecision::Keep => {
                self.session.store_mut().save(&record)?;
                info!(record_id = %record.id(), sets = record.sets().len(), "Partial workout kept");
                Ok(ExitOutcome::Kept(record))
            }
        }
    }

    fn clear_timer_state(&mut self) {
        let key = self.timer_key();
        if let Err(e) = self.session.store_mut().clear_timer(&key) {
            warn!(record_id = %key, error = %e, "Failed to clear rest timer state");
        }
    }
}
