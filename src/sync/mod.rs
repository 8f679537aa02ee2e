//! Phone/watch workout synchronisation.
//!
//! Outbound workouts are queued until the link is activated, then delivered
//! through the first transport tier that accepts them. Inbound workouts are
//! decoded into [`SyncEvent`]s and imported into the record store by the
//! receiver of that channel.

pub mod channel;
pub mod payload;

pub use channel::{
    import_received, DeliveryStatus, DeliveryTier, ImportReport, SyncChannel, SyncEvent, WatchLink,
};
pub use payload::{decode_message, encode_message, InboundMessage, WorkoutPayload};
