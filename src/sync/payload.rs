//! Wire format shared by phone and watch.
//!
//! A workout travels as `{ id, date, type, sets }` inside a
//! `{ "messageType": "workoutData", "workoutData": ... }` envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::TransportError;
use crate::models::{RecordStatus, WorkoutRecord, WorkoutType};

pub const MESSAGE_TYPE_KEY: &str = "messageType";
pub const WORKOUT_DATA_KEY: &str = "workoutData";
pub const WORKOUT_DATA_MESSAGE: &str = "workoutData";

/// Flag sent by older builds in place of workout data
pub const LEGACY_COMPLETED_KEY: &str = "workoutCompleted";

/// One workout as exchanged between devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutPayload {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub workout_type: WorkoutType,
    pub sets: Vec<u32>,
}

impl From<&WorkoutRecord> for WorkoutPayload {
    fn from(record: &WorkoutRecord) -> Self {
        Self {
            id: record.id(),
            date: record.date(),
            workout_type: record.workout_type(),
            sets: record.sets().to_vec(),
        }
    }
}

impl WorkoutPayload {
    /// Received workouts are finished history on the receiving side
    pub fn into_record(self) -> WorkoutRecord {
        WorkoutRecord::from_parts(
            self.id,
            self.date,
            self.workout_type,
            self.sets,
            RecordStatus::Completed,
        )
    }
}

/// Decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Workout(WorkoutPayload),
    /// Completion flag with no workout attached
    LegacyCompletion,
}

/// Wrap a record in the outbound envelope
pub fn encode_message(record: &WorkoutRecord) -> Result<Value, TransportError> {
    let payload = serde_json::to_value(WorkoutPayload::from(record)).map_err(|e| {
        TransportError::Decode {
            reason: e.to_string(),
        }
    })?;

    Ok(json!({
        MESSAGE_TYPE_KEY: WORKOUT_DATA_MESSAGE,
        WORKOUT_DATA_KEY: payload,
    }))
}

/// Decode an inbound message.
///
/// Accepts the full envelope, a bare `workoutData` key, or the legacy
/// completion flag, in that order of preference.
pub fn decode_message(message: &Value) -> Result<InboundMessage, TransportError> {
    if let Some(data) = message.get(WORKOUT_DATA_KEY) {
        match message.get(MESSAGE_TYPE_KEY).and_then(Value::as_str) {
            None | Some(WORKOUT_DATA_MESSAGE) => {
                let payload = WorkoutPayload::deserialize(data).map_err(|e| {
                    TransportError::Decode {
                        reason: e.to_string(),
                    }
                })?;
                return Ok(InboundMessage::Workout(payload));
            }
            Some(other) => {
                return Err(TransportError::Decode {
                    reason: format!("Unknown message type: {}", other),
                })
            }
        }
    }

    if message.get(LEGACY_COMPLETED_KEY).and_then(Value::as_bool) == Some(true) {
        return Ok(InboundMessage::LegacyCompletion);
    }

    Err(TransportError::Decode {
        reason: "Message carries no workout data".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record() -> WorkoutRecord {
        let date = Utc.with_ymd_and_hms(2025, 12, 22, 18, 5, 9).unwrap()
            + Duration::microseconds(250_001);
        WorkoutRecord::manual(WorkoutType::SubMaxVolume, date, vec![6, 6, 6, 6, 5, 5, 5, 5, 4, 4])
            .unwrap()
    }

    #[test]
    fn test_envelope_shape() {
        let record = record();
        let message = encode_message(&record).unwrap();

        assert_eq!(message["messageType"], "workoutData");
        let data = &message["workoutData"];
        assert_eq!(data["id"], record.id().to_string());
        assert_eq!(data["type"], "Sub Max Volume");
        assert_eq!(data["date"], "2025-12-22T18:05:09.250001Z");
        assert_eq!(data["sets"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_decode_preserves_id_and_date() {
        let record = record();
        let message = encode_message(&record).unwrap();

        let InboundMessage::Workout(payload) = decode_message(&message).unwrap() else {
            panic!("expected workout payload");
        };
        assert_eq!(payload.into_record(), record);
    }

    #[test]
    fn test_decode_bare_workout_data() {
        let message = json!({
            "workoutData": {
                "id": "0F8FAD5B-D9CB-469F-A165-70867728950E",
                "date": "2025-10-28T07:15:00Z",
                "type": "Max Day",
                "sets": [12, 10, 9]
            }
        });

        let InboundMessage::Workout(payload) = decode_message(&message).unwrap() else {
            panic!("expected workout payload");
        };
        assert_eq!(payload.workout_type, WorkoutType::MaxDay);
        assert_eq!(payload.sets, vec![12, 10, 9]);
        assert_eq!(
            payload.id,
            Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap()
        );
    }

    #[test]
    fn test_decode_oversized_ladder_totals_saturate() {
        let message = json!({
            "workoutData": {
                "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
                "date": "2025-10-28T07:15:00Z",
                "type": "Ladder Volume",
                "sets": [70000, 3]
            }
        });

        let InboundMessage::Workout(payload) = decode_message(&message).unwrap() else {
            panic!("expected workout payload");
        };
        let record = payload.into_record();
        assert_eq!(record.total_reps(), u32::MAX);

        let summary = crate::summary::WorkoutSummary::from_record(&record, None);
        assert_eq!(summary.total_reps, u32::MAX);
        assert_eq!(summary.best_set, Some(70_000));
    }

    #[test]
    fn test_decode_legacy_flag() {
        let message = json!({ "workoutCompleted": true });
        assert_eq!(
            decode_message(&message).unwrap(),
            InboundMessage::LegacyCompletion
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_message(&json!({ "workoutCompleted": false })).is_err());
        assert!(decode_message(&json!({ "workoutData": { "id": "nope" } })).is_err());
        assert!(decode_message(&json!({
            "messageType": "ping",
            "workoutData": {}
        }))
        .is_err());

        let bad_type = json!({
            "workoutData": {
                "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
                "date": "2025-10-28T07:15:00Z",
                "type": "Tempo Run",
                "sets": [1]
            }
        });
        assert!(matches!(
            decode_message(&bad_type),
            Err(TransportError::Decode { .. })
        ));
    }
}
