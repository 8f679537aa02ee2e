use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::ceiling::{validate_progression, CeilingRule};
use crate::database::RecordStore;
use crate::error::{PullupError, StorageError, TransportError};
use crate::models::{WorkoutRecord, WorkoutType};
use crate::sync::payload::{decode_message, encode_message, InboundMessage};

/// Device-to-device transport primitives
pub trait WatchLink {
    /// Whether the counterpart can take an immediate message right now
    fn is_reachable(&self) -> bool;

    /// Real-time delivery
    fn send_message(&mut self, message: &Value) -> Result<(), TransportError>;

    /// Replace the latest-state snapshot seen by the counterpart
    fn update_application_context(&mut self, message: &Value) -> Result<(), TransportError>;

    /// Queue a guaranteed background delivery
    fn transfer_user_info(&mut self, message: &Value) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTier {
    Immediate,
    ApplicationContext,
    BackgroundTransfer,
}

impl fmt::Display for DeliveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryTier::Immediate => "immediate",
            DeliveryTier::ApplicationContext => "application_context",
            DeliveryTier::BackgroundTransfer => "background_transfer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Held until the channel is activated
    Queued,
    Delivered(DeliveryTier),
    /// Every tier failed; the message is dropped
    Failed,
}

/// What the receiving side hands to the record store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    WorkoutReceived(WorkoutRecord),
    LegacyCompletion,
}

/// Outbound queue plus three-tier delivery cascade over a [`WatchLink`]
pub struct SyncChannel<L: WatchLink> {
    link: L,
    activated: bool,
    pending: VecDeque<Value>,
    events: UnboundedSender<SyncEvent>,
}

impl<L: WatchLink> SyncChannel<L> {
    /// New, not yet activated channel and the receiver for inbound workouts
    pub fn new(link: L) -> (Self, UnboundedReceiver<SyncEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let channel = Self {
            link,
            activated: false,
            pending: VecDeque::new(),
            events,
        };
        (channel, receiver)
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Send a finished workout to the counterpart
    pub fn send_workout(&mut self, record: &WorkoutRecord) -> Result<DeliveryStatus, TransportError> {
        let message = encode_message(record)?;
        debug!(record_id = %record.id(), "Sending workout");
        Ok(self.send_message(message))
    }

    /// Send now if activated, otherwise queue in order
    pub fn send_message(&mut self, message: Value) -> DeliveryStatus {
        if !self.activated {
            self.pending.push_back(message);
            debug!(pending = self.pending.len(), "Channel not activated, message queued");
            return DeliveryStatus::Queued;
        }
        self.deliver(&message)
    }

    /// Activation finished: flush everything queued, oldest first
    pub fn on_activation(&mut self) -> Vec<DeliveryStatus> {
        self.activated = true;
        if !self.pending.is_empty() {
            info!(pending = self.pending.len(), "Channel activated, flushing queued messages");
        }

        let mut results = Vec::with_capacity(self.pending.len());
        while let Some(message) = self.pending.pop_front() {
            results.push(self.deliver(&message));
        }
        results
    }

    /// Back to queueing until the next activation
    pub fn on_deactivated(&mut self) {
        self.activated = false;
        debug!("Channel deactivated");
    }

    /// Escalate immediate → application context → background transfer
    fn deliver(&mut self, message: &Value) -> DeliveryStatus {
        if self.link.is_reachable() {
            match self.link.send_message(message) {
                Ok(()) => return DeliveryStatus::Delivered(DeliveryTier::Immediate),
                Err(e) => debug!(error = %e, "Immediate send failed, falling back"),
            }
        } else {
            debug!("Counterpart not reachable, using application context");
        }

        match self.link.update_application_context(message) {
            Ok(()) => return DeliveryStatus::Delivered(DeliveryTier::ApplicationContext),
            Err(e) => warn!(
                tier = %DeliveryTier::ApplicationContext,
                error = %e,
                "Delivery tier failed, falling back"
            ),
        }

        match self.link.transfer_user_info(message) {
            Ok(()) => DeliveryStatus::Delivered(DeliveryTier::BackgroundTransfer),
            Err(e) => {
                debug!(tier = %DeliveryTier::BackgroundTransfer, error = %e, "Delivery tier failed");
                PullupError::from(TransportError::AllTiersFailed).log("Workout not delivered");
                DeliveryStatus::Failed
            }
        }
    }

    /// Handle a message from the counterpart, arriving on any tier
    pub fn receive(&self, message: &Value) -> Result<(), TransportError> {
        let event = match decode_message(message)? {
            InboundMessage::Workout(payload) => {
                let record = payload.into_record();
                info!(
                    record_id = %record.id(),
                    workout_type = %record.workout_type(),
                    sets = record.sets().len(),
                    "Received workout"
                );
                SyncEvent::WorkoutReceived(record)
            }
            InboundMessage::LegacyCompletion => {
                warn!("Received legacy completion flag without workout data");
                SyncEvent::LegacyCompletion
            }
        };

        if self.events.send(event).is_err() {
            debug!("Sync event receiver dropped");
        }
        Ok(())
    }
}

/// Outcome of draining received workouts into a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub duplicates: usize,
    pub legacy_flags: usize,
    /// Received workouts the store could not take; the caller may retry them
    pub failed: Vec<WorkoutRecord>,
}

/// Save every received workout not already in the store.
///
/// A storage failure does not stop the drain: the record is handed back in
/// [`ImportReport::failed`] and the remaining events are still imported.
pub fn import_received<S: RecordStore + ?Sized>(
    store: &mut S,
    events: &mut UnboundedReceiver<SyncEvent>,
) -> ImportReport {
    let mut report = ImportReport::default();

    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::WorkoutReceived(record) => match import_one(store, &record) {
                Ok(true) => report.imported += 1,
                Ok(false) => {
                    debug!(record_id = %record.id(), "Workout already stored, skipping");
                    report.duplicates += 1;
                }
                Err(e) => {
                    PullupError::from(e).log("Failed to import received workout");
                    report.failed.push(record);
                }
            },
            SyncEvent::LegacyCompletion => report.legacy_flags += 1,
        }
    }

    if report.imported > 0 || !report.failed.is_empty() {
        info!(
            imported = report.imported,
            duplicates = report.duplicates,
            failed = report.failed.len(),
            "Imported received workouts"
        );
    }
    report
}

/// Returns `false` when the record was already stored
fn import_one<S: RecordStore + ?Sized>(
    store: &mut S,
    record: &WorkoutRecord,
) -> Result<bool, StorageError> {
    if store.get(record.id())?.is_some() {
        return Ok(false);
    }

    if record.workout_type() != WorkoutType::LadderVolume {
        let rule = CeilingRule::for_type(record.workout_type());
        if let Err(e) = validate_progression(&rule, record.sets()) {
            warn!(record_id = %record.id(), error = %e, "Received workout breaks set ceilings");
        }
    }

    store.save(record)?;
    Ok(true)
}
