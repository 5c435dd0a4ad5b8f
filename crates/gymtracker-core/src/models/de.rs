//! Lenient field deserializers for documents written by older clients.
//!
//! Remote documents are not schema-checked: titles can be `null`, units can
//! carry placeholder strings such as `"None"` and numeric inputs sometimes
//! arrive as strings. A single odd field must not make the whole document
//! unreadable.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};

// Helper to treat an explicit null like a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Helper to map values outside the known set (e.g. "None") to None
pub(crate) fn known_or_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

// Helper to deserialize a number, a numeric string or null as Option<f64>
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct NumberVisitor;

    impl<'de> de::Visitor<'de> for NumberVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number or numeric string")
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.trim().parse().ok())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(NumberVisitor)
}

// Helper for repetition counts: accepts 8, 8.0, "8" or null
pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.round().min(u32::MAX as f64) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct LooseFields {
        #[serde(default, deserialize_with = "null_as_default")]
        title: String,
        #[serde(default, deserialize_with = "lenient_number")]
        weight: Option<f64>,
        #[serde(default, deserialize_with = "lenient_count")]
        reps: Option<u32>,
    }

    #[test]
    fn test_null_and_strings_are_tolerated() {
        let parsed: LooseFields =
            serde_json::from_value(json!({"title": null, "weight": "42.5", "reps": 8.0})).unwrap();
        assert_eq!(parsed.title, "");
        assert_eq!(parsed.weight, Some(42.5));
        assert_eq!(parsed.reps, Some(8));

        let missing: LooseFields = serde_json::from_value(json!({"weight": "", "reps": null})).unwrap();
        assert_eq!(missing.weight, None);
        assert_eq!(missing.reps, None);
    }
}
