use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CachedRecord;
use crate::remote::{Document, RemoteDocument};
use crate::utils::cmp_ignore_case;

use super::de::{known_or_none, lenient_count, lenient_number, null_as_default};
use super::timestamp::parse_timestamp;

/// Title given to routines created from the "new routine" action.
pub const UNTITLED_ROUTINE: &str = "Untitled routine";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurement {
    Time,
    Weight,
    #[serde(rename = "Body Weight")]
    BodyWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementUnit {
    Unit,
    Kg,
    Lb,
    Plate,
    Hole,
}

impl MeasurementUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementUnit::Unit => "Unit",
            MeasurementUnit::Kg => "Kg",
            MeasurementUnit::Lb => "Lb",
            MeasurementUnit::Plate => "Plate",
            MeasurementUnit::Hole => "Hole",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetItem {
    #[serde(default)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_reps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_time: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_weight: Option<bool>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Measurement>,
    /// Placeholder units such as `"None"` read as no unit.
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub measurement_unit: Option<MeasurementUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_repetitions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_time: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_weight: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sets: Vec<SetItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exercises: Vec<Exercise>,
}

impl Exercise {
    /// An exercise with no sets and a client-generated id.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            ..Default::default()
        }
    }
}

impl Routine {
    /// A fresh, empty routine with a client-generated id.
    pub fn untitled(uid: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: UNTITLED_ROUTINE.to_string(),
            created_at,
            uid: uid.to_string(),
            exercises: Vec::new(),
        }
    }

    pub fn exercise(&self, exercise_id: &str) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == exercise_id)
    }
}

impl CachedRecord for Routine {
    fn entity_kind() -> &'static str {
        "routines"
    }

    fn collection() -> &'static str {
        "routines"
    }

    fn id_field() -> &'static str {
        "id"
    }

    fn record_id(&self) -> &str {
        &self.id
    }

    fn set_record_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_remote(doc: RemoteDocument, now: DateTime<Utc>) -> serde_json::Result<Self> {
        let mut fields = doc.fields;
        let created_at = fields
            .get("createdAt")
            .and_then(parse_timestamp)
            .unwrap_or(now);
        fields.insert("createdAt".to_string(), Value::String(created_at.to_rfc3339()));
        fields.insert("id".to_string(), Value::String(doc.id));
        serde_json::from_value(Value::Object(fields))
    }

    /// Title first (case-insensitive), newest first among equal titles.
    fn sort_snapshot(records: &mut [Self]) {
        records.sort_by(|a, b| {
            cmp_ignore_case(&a.title, &b.title).then_with(|| b.created_at.cmp(&a.created_at))
        });
    }
}

/// Partial update of a routine. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutinePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercises: Option<Vec<Exercise>>,
}

impl RoutinePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn exercises(exercises: Vec<Exercise>) -> Self {
        Self {
            exercises: Some(exercises),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.exercises.is_none()
    }

    pub fn into_fields(self) -> serde_json::Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Document::new()),
        }
    }
}
