use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::models::HistorySet;

/// Compare two strings ignoring ASCII case
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an epoch-millisecond timestamp as a short day/month/year date
pub fn format_date(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(dt) => dt.format("%d/%m/%Y").to_string(),
        None => "-".to_string(),
    }
}

fn describe_set(set: &HistorySet, unit: Option<&str>) -> String {
    let timed = set.time.map_or(false, |t| t > 0.0);
    let mut desc = match unit {
        Some(unit) if !unit.is_empty() && unit != "None" && !(timed && set.amount() == 0.0) => {
            format!("{}{}", set.amount(), unit.chars().take(2).collect::<String>())
        }
        _ => String::new(),
    };
    if let Some(time) = set.time.filter(|t| *t > 0.0) {
        if !desc.is_empty() {
            desc.push(' ');
        }
        desc.push_str(&format!("{}s", time));
    }
    if let Some(reps) = set.reps.filter(|r| *r > 0) {
        if !desc.is_empty() {
            desc.push(' ');
        }
        desc.push_str(&format!("x{}", reps));
    }
    desc
}

/// Short description of logged sets: "3 x (20Kg x10)" when every set is the
/// same, otherwise a comma-separated list.
pub fn format_sets_short(sets: &[HistorySet], unit: Option<&str>) -> String {
    let Some(first) = sets.first() else {
        return String::new();
    };
    let first_desc = describe_set(first, unit);
    if sets.len() == 1 {
        return first_desc;
    }
    if sets.iter().all(|s| describe_set(s, unit) == first_desc) {
        format!("{} x ({})", sets.len(), first_desc)
    } else {
        sets.iter()
            .map(|s| describe_set(s, unit))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
