//! Filament record and status types exchanged with the host

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::value::Value;

/// Minimal poll result: is a spool present, and does its tag hold a valid record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub present: bool,
    pub nfc_valid: bool,
}

impl StatusSnapshot {
    /// A record can be read only when both flags are set
    pub fn has_record(&self) -> bool {
        self.present && self.nfc_valid
    }
}

/// Contents of a spool's NFC tag
///
/// Mandatory fields are always transferred; `optional` holds only the fields
/// whose bitmap bit is set, keyed by register name. Serializes flat, e.g.
/// `{"id": 7, "name": "PLA", "spool_weight": 200, "total_weight": 950, "pressure_advance": 0.045}`.
/// Extra keys whose values are not scalars (strings, null, arrays, objects)
/// are dropped while deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentRecord {
    pub id: i32,
    pub name: String,
    pub spool_weight: i32,
    pub total_weight: i32,
    #[serde(flatten, deserialize_with = "scalar_fields")]
    pub optional: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtraField {
    Scalar(Value),
    Other(IgnoredAny),
}

fn scalar_fields<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let fields = BTreeMap::<String, ExtraField>::deserialize(deserializer)?;
    Ok(fields
        .into_iter()
        .filter_map(|(key, field)| match field {
            ExtraField::Scalar(value) => Some((key, value)),
            ExtraField::Other(_) => None,
        })
        .collect())
}

impl FilamentRecord {
    pub fn new(id: i32, name: impl Into<String>, spool_weight: i32, total_weight: i32) -> Self {
        Self {
            id,
            name: name.into(),
            spool_weight,
            total_weight,
            optional: BTreeMap::new(),
        }
    }

    /// Add an optional field
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.optional.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.optional.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_flat() {
        let record = FilamentRecord::new(7, "PLA", 200, 950)
            .with_field("pressure_advance", Value::Float32(0.5))
            .with_field("extr_temp", Value::Int32(215));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            json!({
                "id": 7,
                "name": "PLA",
                "spool_weight": 200,
                "total_weight": 950,
                "pressure_advance": 0.5,
                "extr_temp": 215
            })
        );
    }

    #[test]
    fn test_record_from_flat_mapping() {
        let record: FilamentRecord = serde_json::from_value(json!({
            "id": 3,
            "name": "PETG Black",
            "spool_weight": 250,
            "total_weight": 1250,
            "bed_temp": 80
        }))
        .unwrap();

        assert_eq!(record.id, 3);
        assert_eq!(record.name, "PETG Black");
        assert_eq!(record.optional.len(), 1);
        assert_eq!(record.field("bed_temp"), Some(&Value::Int32(80)));
    }

    #[test]
    fn test_record_drops_non_scalar_extras() {
        let record: FilamentRecord = serde_json::from_value(json!({
            "id": 7,
            "name": "PLA",
            "spool_weight": 200,
            "total_weight": 950,
            "vendor": "Prusament",
            "color": null,
            "tags": ["matte", "pla"],
            "meta": {"lot": 12},
            "extr_temp": 215
        }))
        .unwrap();

        assert_eq!(record.name, "PLA");
        assert_eq!(record.optional.len(), 1);
        assert_eq!(record.field("extr_temp"), Some(&Value::Int32(215)));
    }

    #[test]
    fn test_record_requires_mandatory_fields() {
        let result: Result<FilamentRecord, _> = serde_json::from_value(json!({
            "id": 3,
            "name": "PLA"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_status_has_record() {
        assert!(StatusSnapshot { present: true, nfc_valid: true }.has_record());
        assert!(!StatusSnapshot { present: true, nfc_valid: false }.has_record());
        assert!(!StatusSnapshot::default().has_record());
    }
}
