//! Case-management records as read from the remote system.
//!
//! Only the fields the engine reads or writes are modelled. Unknown fields
//! are ignored on deserialization. Decoding is lenient: one odd record must
//! not fail a whole search page, so nulls decode to empty values and tag
//! entries that are not objects are dropped.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A person/case record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// National identifier. Stable natural key, used as the work item reference.
    /// Empty when the remote record has none.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cpr: String,

    /// The remote system's internal id, when it exposes one.
    #[serde(
        rename = "id",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub citizen_id: Option<String>,

    #[serde(default)]
    pub prolongation: Option<ProlongationInfo>,

    /// Markers (tags) on the record, in remote order. `null` is treated as empty.
    #[serde(default, deserialize_with = "lenient_markers")]
    pub tags: Option<Vec<Marker>>,
}

impl Entity {
    /// Markers on the record; an absent collection yields none.
    pub fn markers(&self) -> &[Marker] {
        self.tags.as_deref().unwrap_or_default()
    }

    /// Whether the record carries a national identifier.
    pub fn has_cpr(&self) -> bool {
        !self.cpr.is_empty()
    }

    /// Key used to address the record when writing to it.
    pub fn remote_key(&self) -> &str {
        self.citizen_id.as_deref().unwrap_or(&self.cpr)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProlongationInfo {
    #[serde(default)]
    pub reason_name: Option<String>,
}

/// A timestamped annotation on a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    /// Empty when the remote title is null.
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub start: Option<String>,
    /// Absent or null while the marker is active.
    #[serde(default, deserialize_with = "lenient_text")]
    pub end: Option<String>,
}

impl Marker {
    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Any non-null value; non-strings keep their JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Keeps object entries only; anything else in the array is skipped.
fn lenient_markers<'de, D>(deserializer: D) -> Result<Option<Vec<Marker>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(entries)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let markers = entries
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    Ok(Some(markers))
}

/// One page of results from an entity query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPage {
    #[serde(default)]
    pub data: Vec<Entity>,
    #[serde(default)]
    pub has_more: bool,
}

/// A query filter forwarded verbatim to the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    #[serde(default)]
    pub custom_filter: String,
    pub field_name: String,
    pub values: Vec<String>,
}

impl QueryFilter {
    pub fn new(field_name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            custom_filter: String::new(),
            field_name: field_name.into(),
            values,
        }
    }

    /// Select records in the given target group.
    pub fn target_group(code: impl Into<String>) -> Self {
        Self::new("targetGroupCode", vec![code.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_tags_and_missing_prolongation_deserialize() {
        let entity: Entity = serde_json::from_value(json!({
            "cpr": "0101011234",
            "tags": null,
            "targetGroupCode": "6.6"
        }))
        .unwrap();
        assert!(entity.prolongation.is_none());
        assert!(entity.markers().is_empty());
        assert_eq!(entity.remote_key(), "0101011234");
    }

    #[test]
    fn marker_without_end_is_active() {
        let entity: Entity = serde_json::from_value(json!({
            "cpr": "1",
            "id": "abc-123",
            "tags": [
                {"title": "a", "end": null},
                {"title": "b", "end": "2024-01-01T00:00:00Z"},
                {"title": "c"}
            ]
        }))
        .unwrap();
        let active: Vec<bool> = entity.markers().iter().map(Marker::is_active).collect();
        assert_eq!(active, vec![true, false, true]);
        assert_eq!(entity.remote_key(), "abc-123");
    }

    #[test]
    fn odd_records_do_not_fail_the_page() {
        let page: EntityPage = serde_json::from_value(json!({
            "data": [
                {"cpr": null, "tags": "n/a"},
                {"prolongation": null},
                {
                    "cpr": "0101011234",
                    "tags": [
                        "legacy",
                        42,
                        null,
                        {"title": null, "end": null},
                        {"title": "a", "start": 20240101, "end": {"at": "2024-02-01"}}
                    ]
                }
            ],
            "hasMore": false
        }))
        .unwrap();

        assert_eq!(page.data.len(), 3);
        assert!(!page.data[0].has_cpr());
        assert!(page.data[0].markers().is_empty());
        assert!(!page.data[1].has_cpr());

        let markers = page.data[2].markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].title, "");
        assert!(markers[0].is_active());
        assert_eq!(markers[1].start.as_deref(), Some("20240101"));
        assert!(!markers[1].is_active());
    }

    #[test]
    fn filter_serializes_in_remote_shape() {
        let value = serde_json::to_value(QueryFilter::target_group("6.6")).unwrap();
        assert_eq!(
            value,
            json!({"customFilter": "", "fieldName": "targetGroupCode", "values": ["6.6"]})
        );
    }
}
