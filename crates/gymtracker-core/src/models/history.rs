use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CachedRecord;
use crate::remote::RemoteDocument;
use crate::utils::format_sets_short;

use super::de::{known_or_none, lenient_count, lenient_number, null_as_default};
use super::routine::Measurement;
use super::timestamp::parse_timestamp;

/// One logged set of a played exercise.
///
/// Current clients log `weight`; older records carry the amount in `value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySet {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: f64,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_repetitions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_weight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_time: Option<bool>,
}

impl HistorySet {
    /// A weighted set as logged by the play flow.
    pub fn weighted(weight: f64, reps: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            weight: Some(weight),
            reps: Some(reps),
            has_weight: Some(true),
            has_repetitions: Some(true),
            ..Default::default()
        }
    }

    /// A timed set, `seconds` long.
    pub fn timed(seconds: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            time: Some(seconds),
            has_time: Some(true),
            ..Default::default()
        }
    }

    /// Amount lifted: `weight` when logged, otherwise the legacy `value`.
    pub fn amount(&self) -> f64 {
        self.weight.unwrap_or(self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseHistoryRecord {
    pub doc_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exercise_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sets: Vec<HistorySet>,
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Measurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_unit: Option<String>,
    /// Perceived difficulty, 1 (easy) to 5 (hard).
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl ExerciseHistoryRecord {
    /// A record for a just-played exercise, stamped with a fresh local id.
    pub fn new(exercise_id: &str, title: &str, sets: Vec<HistorySet>, at: DateTime<Utc>) -> Self {
        Self {
            doc_id: uuid::Uuid::new_v4().to_string(),
            uid: String::new(),
            exercise_id: exercise_id.to_string(),
            title: title.to_string(),
            sets,
            measurement: None,
            measurement_unit: None,
            difficulty: None,
            timestamp: at.timestamp_millis(),
        }
    }

    pub fn summary(&self) -> String {
        format_sets_short(&self.sets, self.measurement_unit.as_deref())
    }
}

impl CachedRecord for ExerciseHistoryRecord {
    fn entity_kind() -> &'static str {
        "exerciseHistory"
    }

    fn collection() -> &'static str {
        "exercise_history"
    }

    fn id_field() -> &'static str {
        "docId"
    }

    fn record_id(&self) -> &str {
        &self.doc_id
    }

    fn set_record_id(&mut self, id: String) {
        self.doc_id = id;
    }

    fn from_remote(doc: RemoteDocument, now: DateTime<Utc>) -> serde_json::Result<Self> {
        let mut fields = doc.fields;
        let timestamp = fields
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or(now);
        fields.insert("timestamp".to_string(), Value::from(timestamp.timestamp_millis()));
        fields.insert("docId".to_string(), Value::String(doc.id));
        serde_json::from_value(Value::Object(fields))
    }
}
