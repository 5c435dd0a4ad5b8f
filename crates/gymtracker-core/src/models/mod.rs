//! Data models for cached GymTracker entities.
//!
//! - `Routine`, `Exercise`, `SetItem`: workout routines and their exercises
//! - `RoutinePatch`: typed partial update of a routine
//! - `ExerciseHistoryRecord`, `HistorySet`: logged sets of a played exercise

mod de;
pub mod history;
pub mod routine;
pub mod timestamp;

pub use history::{ExerciseHistoryRecord, HistorySet};
pub use routine::{Exercise, Measurement, MeasurementUnit, Routine, RoutinePatch, SetItem};
