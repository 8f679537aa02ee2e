//! Unified error hierarchy for pullup-mastery
//!
//! Every failure in the workout core is recoverable: storage errors are
//! surfaced to the host while the session continues in memory, invalid rep
//! selections are refused, and transport failures are only logged once every
//! delivery tier has been exhausted.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for all pullup-mastery operations
#[derive(Debug, Error)]
pub enum PullupError {
    /// Record store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Workout session state machine errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Phone/watch transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Workout record validation errors
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write (insert/save/delete) could not be committed
    #[error("Write failed: {reason}")]
    WriteFailed { reason: String },

    /// Record not found
    #[error("Record not found: {id}")]
    NotFound { id: Uuid },

    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored data could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Workout session errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The user tried to end a rest (or finish the workout) with zero reps selected
    #[error("No reps selected for set {}", .set_index + 1)]
    InvalidRepSelection { set_index: usize },

    /// The requested action is not legal in the current state
    #[error("Cannot {action} while {state}")]
    InvalidAction {
        action: &'static str,
        state: String,
    },

    /// The workout has already been completed
    #[error("Workout already complete")]
    AlreadyComplete,

    /// A session can only drive a fresh, in-progress record of its own protocol
    #[error("Record cannot start a session: {reason}")]
    IncompatibleRecord { reason: String },
}

/// Phone/watch transport errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Counterpart device is not reachable for an immediate send
    #[error("Counterpart not reachable")]
    Unreachable,

    /// Immediate message send failed
    #[error("Message send failed: {reason}")]
    MessageFailed { reason: String },

    /// Application context snapshot could not be updated
    #[error("Application context update failed: {reason}")]
    ContextUpdateFailed { reason: String },

    /// Background transfer could not be queued
    #[error("Background transfer failed: {reason}")]
    TransferFailed { reason: String },

    /// Inbound payload could not be decoded
    #[error("Payload decode failed: {reason}")]
    Decode { reason: String },

    /// Every delivery tier failed
    #[error("All delivery tiers failed")]
    AllTiersFailed,
}

/// Workout record validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// More sets than the protocol allows
    #[error("Too many sets: protocol allows {max}, got {got}")]
    TooManySets { max: usize, got: usize },

    /// Manual entries must fill every set of the protocol
    #[error("Expected {expected} sets, got {got}")]
    WrongSetCount { expected: usize, got: usize },

    /// A manually entered set is outside the selectable range
    #[error("Set {} has {value} reps, allowed range is 1..={max}", .index + 1)]
    RepsOutOfRange { index: usize, value: u32, max: u32 },

    /// Workouts cannot be logged in the future
    #[error("Workout date is in the future")]
    FutureDate,

    /// A set exceeds the ceiling derived from the previous set
    #[error("Set {} has {value} reps, ceiling is {ceiling}", .index + 1)]
    CeilingExceeded { index: usize, value: u32, ceiling: u32 },

    /// Completed records are read-only history
    #[error("Workout is completed and read-only")]
    Completed,
}

/// Result type alias for pullup-mastery operations
pub type Result<T> = std::result::Result<T, PullupError>;

impl PullupError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PullupError::Storage(StorageError::WriteFailed { .. })
                | PullupError::Transport(TransportError::Unreachable)
                | PullupError::Transport(TransportError::AllTiersFailed)
                | PullupError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PullupError::Session(SessionError::InvalidRepSelection { .. }) => ErrorSeverity::Info,
            PullupError::Session(_) => ErrorSeverity::Warning,
            PullupError::Record(_) => ErrorSeverity::Warning,
            PullupError::Transport(TransportError::AllTiersFailed) => ErrorSeverity::Error,
            PullupError::Transport(_) => ErrorSeverity::Warning,
            PullupError::Storage(StorageError::NotFound { .. })
            | PullupError::Storage(StorageError::WriteFailed { .. }) => ErrorSeverity::Warning,
            PullupError::Storage(_) => ErrorSeverity::Error,
            PullupError::Configuration(_) => ErrorSeverity::Error,
            PullupError::Io(_) => ErrorSeverity::Error,
        }
    }

    /// Emit a tracing event at the level matching this error's severity
    pub fn log(&self, message: &str) {
        let level = self.severity().to_tracing_level();
        let retryable = self.is_retryable();
        if level == tracing::Level::ERROR {
            tracing::error!(error = %self, retryable, "{}", message);
        } else if level == tracing::Level::WARN {
            tracing::warn!(error = %self, retryable, "{}", message);
        } else {
            tracing::info!(error = %self, retryable, "{}", message);
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            PullupError::Session(SessionError::InvalidRepSelection { .. }) => {
                "Select how many reps you completed before starting the next set.".to_string()
            }
            PullupError::Storage(StorageError::WriteFailed { .. }) => {
                "Your workout could not be saved right now. Progress is kept until you finish."
                    .to_string()
            }
            PullupError::Record(RecordError::CeilingExceeded { index, ceiling, .. }) => {
                format!(
                    "Set {} can't have more reps than the set before it ({}).",
                    index + 1,
                    ceiling
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents an operation but the app can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Expected user-facing refusal
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
