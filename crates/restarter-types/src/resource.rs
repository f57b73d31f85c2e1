//! Resource types for Restarter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identity of a resource.
///
/// Zero means "not yet persisted"; the store never hands out zero.
pub type ResourceId = i64;

/// A persisted resource.
///
/// Values returned by the store are owned snapshots: mutating one does not
/// touch the persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique identifier.
    pub id: ResourceId,
    /// Short, mutable label.
    pub label: String,
    /// Creation timestamp. Never changes after insert.
    pub time_created: DateTime<Utc>,
    /// Last modification timestamp.
    pub time_updated: DateTime<Utc>,
}

impl Resource {
    /// Returns true once the store has assigned an identity.
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Returns true if the resource was modified strictly after `threshold`.
    pub fn updated_after(&self, threshold: DateTime<Utc>) -> bool {
        self.time_updated > threshold
    }
}

/// Request body accepted by the create and update endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInput {
    /// New label value. Absent means empty.
    #[serde(default)]
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Resource {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Resource {
            id: 7,
            label: "test".into(),
            time_created: at,
            time_updated: at,
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["label"], "test");
        assert_eq!(json["timeCreated"], "2024-03-01T12:00:00Z");
        assert_eq!(json["timeUpdated"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn test_parse_rfc3339_offsets() {
        let resource: Resource = serde_json::from_str(
            r#"{"id":1,"label":"x","timeCreated":"2024-03-01T14:00:00+02:00","timeUpdated":"2024-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(resource.time_created, resource.time_updated);
    }

    #[test]
    fn test_updated_after_is_strict() {
        let resource = sample();
        assert!(!resource.updated_after(resource.time_updated));
        assert!(resource.updated_after(resource.time_updated - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_label_input_defaults_missing_label() {
        assert!(serde_json::from_str::<LabelInput>(r#"{"label":"a"}"#).is_ok());
        let empty = serde_json::from_str::<LabelInput>("{}").unwrap();
        assert_eq!(empty.label, "");
        assert!(serde_json::from_str::<LabelInput>(r#"{"label":3}"#).is_err());
        assert!(serde_json::from_str::<LabelInput>("not json").is_err());
    }

    #[test]
    fn test_is_persisted() {
        let mut resource = sample();
        assert!(resource.is_persisted());
        resource.id = 0;
        assert!(!resource.is_persisted());
    }
}
