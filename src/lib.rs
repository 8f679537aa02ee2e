// Library interface for pullup-mastery
// Workout session core shared by the phone and watch apps

pub mod ceiling;
pub mod config;
pub mod database;
pub mod error;
pub mod host;
pub mod logging;
pub mod models;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod summary;
pub mod sync;
pub mod timer;

// Re-export commonly used types for convenience
pub use models::*;
pub use ceiling::{rep_ceiling, sub_max_target, CeilingRule};
pub use config::{AbandonPolicy, AppConfig};
pub use database::{MemoryRecordStore, RecordStore, SqliteRecordStore};
pub use error::{PullupError, Result};
pub use host::{ActiveWorkout, ExitDecision, ExitOutcome, WorkoutHost};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use progress::{SetProgress, SetSlot, SetStatus};
pub use protocol::{Granularity, LadderRecording, ProtocolSpec};
pub use session::{
    LadderSession, MaxDaySession, SessionEvent, SessionState, SubMaxSession, WorkoutSession,
};
pub use summary::WorkoutSummary;
pub use sync::{DeliveryStatus, DeliveryTier, SyncChannel, SyncEvent, WatchLink};
pub use timer::{Clock, ManualClock, RestTimer, SystemClock, TimerSnapshot, TimerStateStore};
