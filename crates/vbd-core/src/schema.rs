//! Shared dataset document schema and index mapping types.
//!
//! Every source-specific index is built from the same shared field set
//! ([`SHARED_FIELDS`]) plus the fields its source adds. Mappings are always
//! constructed through [`IndexMapping::try_merge`] so the shared set has a
//! single owner and no source carries a private copy of it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::AppError;

pub const FIELD_ID: &str = "id";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_DB: &str = "db";
pub const FIELD_DB_URL: &str = "dbUrl";
pub const FIELD_AUTHOR_URL: &str = "authorUrl";
pub const FIELD_PUB_DATE: &str = "pubDate";

/// Mapping type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Exact-match value, never tokenized. Used for identifiers and facets.
    Keyword,
    /// Full-text value, tokenized for ranking.
    Text,
    /// Calendar date (`YYYY-MM-DD`) or full timestamp.
    Date,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Keyword => "keyword",
            FieldType::Text => "text",
            FieldType::Date => "date",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static declaration of one document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

/// Fields carried by every dataset document regardless of source.
///
/// Adding a field to [`DatasetDoc`] without adding it here makes strict
/// indexes reject every document that sets it.
pub const SHARED_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: FIELD_ID,
        field_type: FieldType::Keyword,
        required: true,
    },
    FieldSpec {
        name: FIELD_TITLE,
        field_type: FieldType::Text,
        required: false,
    },
    FieldSpec {
        name: FIELD_DESCRIPTION,
        field_type: FieldType::Text,
        required: false,
    },
    FieldSpec {
        name: FIELD_DB,
        field_type: FieldType::Keyword,
        required: true,
    },
    FieldSpec {
        name: FIELD_DB_URL,
        field_type: FieldType::Keyword,
        required: true,
    },
    FieldSpec {
        name: FIELD_AUTHOR_URL,
        field_type: FieldType::Keyword,
        required: false,
    },
    FieldSpec {
        name: FIELD_PUB_DATE,
        field_type: FieldType::Date,
        required: false,
    },
];

/// One entry of a mapping's `properties` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl From<FieldType> for Property {
    fn from(field_type: FieldType) -> Self {
        Self { field_type }
    }
}

/// Field name to mapping property. Ordered so serialized mappings are stable.
pub type Properties = BTreeMap<String, Property>;

/// Converts a static field list into a property map.
///
/// Returns `AppError::DuplicateProperty` if the same name appears twice.
pub fn properties_from(fields: &[FieldSpec]) -> Result<Properties, AppError> {
    let mut properties = Properties::new();
    for field in fields {
        if properties
            .insert(field.name.to_string(), field.field_type.into())
            .is_some()
        {
            return Err(AppError::DuplicateProperty(field.name.to_string()));
        }
    }
    Ok(properties)
}

/// The shared mapping properties reused by every source index.
pub fn shared_properties() -> Result<Properties, AppError> {
    properties_from(SHARED_FIELDS)
}

/// Names of the shared fields every document must carry.
pub fn shared_required_fields() -> impl Iterator<Item = &'static str> {
    SHARED_FIELDS.iter().filter(|f| f.required).map(|f| f.name)
}

/// How the search engine treats fields that are not in the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dynamic {
    /// Reject the whole document.
    Strict,
    /// Add the field to the mapping.
    True,
    /// Keep the field in `_source` without indexing it.
    False,
}

/// Mapping descriptor sent to the search engine at index creation.
///
/// Serializes to exactly `{"dynamic": ..., "properties": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMapping {
    pub dynamic: Dynamic,
    pub properties: Properties,
}

impl IndexMapping {
    /// Builds a strict mapping from the shared properties and a source's own fields.
    ///
    /// `shared` is only read. A source field that redeclares a shared one is
    /// rejected instead of silently overriding it.
    ///
    /// # Examples
    ///
    /// ```
    /// use vbd_core::schema::{shared_properties, Dynamic, FieldSpec, FieldType, IndexMapping};
    ///
    /// let shared = shared_properties().unwrap();
    /// let own = [FieldSpec { name: "license", field_type: FieldType::Keyword, required: false }];
    /// let mapping = IndexMapping::try_merge(&shared, &own).unwrap();
    ///
    /// assert_eq!(mapping.dynamic, Dynamic::Strict);
    /// assert_eq!(mapping.properties.len(), shared.len() + 1);
    /// ```
    pub fn try_merge(shared: &Properties, own: &[FieldSpec]) -> Result<Self, AppError> {
        let mut properties = shared.clone();
        for field in own {
            if properties
                .insert(field.name.to_string(), field.field_type.into())
                .is_some()
            {
                return Err(AppError::DuplicateProperty(field.name.to_string()));
            }
        }

        Ok(Self {
            dynamic: Dynamic::Strict,
            properties,
        })
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.properties.get(name).map(|p| p.field_type)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<Value, AppError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Difference between a mapping already live in the search engine and the
/// mapping this build wants.
///
/// New fields can be added to a live index in place. Changed or removed
/// fields, or a different `dynamic` mode, need a reindex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingDiff {
    /// Declared here, absent from the live index.
    pub added: Vec<String>,
    /// Present in both with different types: `(field, live type, wanted type)`.
    pub changed: Vec<(String, String, FieldType)>,
    /// Present in the live index, no longer declared here.
    pub removed: Vec<String>,
    /// Live `dynamic` setting when it differs from the wanted one.
    pub dynamic_changed: Option<String>,
}

impl MappingDiff {
    /// Compares the live mapping JSON (as returned by `GET /{index}/_mapping`,
    /// already unwrapped to the `mappings` object) against `desired`.
    pub fn between(existing: &Value, desired: &IndexMapping) -> Self {
        let mut diff = Self::default();

        let live_dynamic = match existing.get("dynamic") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => "true".to_string(),
        };
        let wanted_dynamic = match desired.dynamic {
            Dynamic::Strict => "strict",
            Dynamic::True => "true",
            Dynamic::False => "false",
        };
        if live_dynamic != wanted_dynamic {
            diff.dynamic_changed = Some(live_dynamic);
        }

        let empty = serde_json::Map::new();
        let live = existing
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        for (name, property) in &desired.properties {
            match live.get(name) {
                None => diff.added.push(name.clone()),
                Some(live_prop) => {
                    // Object fields have no "type" key.
                    let live_type = live_prop
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("object");
                    if live_type != property.field_type.as_str() {
                        diff.changed
                            .push((name.clone(), live_type.to_string(), property.field_type));
                    }
                }
            }
        }

        for name in live.keys() {
            if !desired.properties.contains_key(name) {
                diff.removed.push(name.clone());
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.removed.is_empty()
            && self.dynamic_changed.is_none()
    }

    /// True when the live index can be brought up to date with a put-mapping call.
    pub fn is_compatible(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty() && self.dynamic_changed.is_none()
    }

    /// Human-readable summary of the incompatible parts.
    pub fn describe_conflicts(&self) -> String {
        let mut parts = Vec::new();
        if let Some(live) = &self.dynamic_changed {
            parts.push(format!("dynamic is '{}'", live));
        }
        for (field, live, wanted) in &self.changed {
            parts.push(format!("'{}' is {} (wanted {})", field, live, wanted));
        }
        if !self.removed.is_empty() {
            parts.push(format!("undeclared fields: {}", self.removed.join(", ")));
        }
        parts.join("; ")
    }
}

/// Minimum shape of every dataset document.
///
/// `D` is the type of the `db` discriminant. The shared shape keeps it a
/// plain string; source documents narrow it to a single literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDoc<D = String> {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub db: D,
    pub db_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_pub_date"
    )]
    pub pub_date: Option<NaiveDate>,
}

/// Parses a `pubDate` value: a plain `YYYY-MM-DD` date or an RFC 3339
/// timestamp, whose date part in its own offset is kept.
///
/// The validator and the typed documents both go through this, so anything
/// the validator lets into an index reads back as a typed document.
pub fn parse_pub_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn deserialize_pub_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        parse_pub_date(&s).ok_or_else(|| {
            de::Error::invalid_value(Unexpected::Str(&s), &"a YYYY-MM-DD date or RFC 3339 timestamp")
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_doc() -> DatasetDoc {
        DatasetDoc {
            id: "x".to_string(),
            title: Some("Y".to_string()),
            description: Some("Mosquito occurrences".to_string()),
            db: "gbif".to_string(),
            db_url: "https://www.gbif.org/dataset/x".to_string(),
            author_url: Some("https://www.gbif.org/publisher/p".to_string()),
            pub_date: NaiveDate::from_ymd_opt(2021, 3, 4),
        }
    }

    #[test]
    fn test_every_doc_field_is_declared() {
        let shared = shared_properties().unwrap();
        let value = serde_json::to_value(full_doc()).unwrap();

        for key in value.as_object().unwrap().keys() {
            assert!(shared.contains_key(key), "undeclared shared field {}", key);
        }
        assert_eq!(value.as_object().unwrap().len(), shared.len());
    }

    #[test]
    fn test_shared_properties_types() {
        let shared = shared_properties().unwrap();
        assert_eq!(shared["id"].field_type, FieldType::Keyword);
        assert_eq!(shared["title"].field_type, FieldType::Text);
        assert_eq!(shared["description"].field_type, FieldType::Text);
        assert_eq!(shared["pubDate"].field_type, FieldType::Date);
        assert_eq!(shared["db"].field_type, FieldType::Keyword);
    }

    #[test]
    fn test_required_fields() {
        let required: Vec<_> = shared_required_fields().collect();
        assert_eq!(required, vec!["id", "db", "dbUrl"]);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let doc = DatasetDoc {
            id: "x".to_string(),
            title: None,
            description: None,
            db: "gbif".to_string(),
            db_url: "http://example.org".to_string(),
            author_url: None,
            pub_date: None,
        };
        let value = serde_json::to_value(doc).unwrap();
        assert_eq!(
            value,
            json!({"id": "x", "db": "gbif", "dbUrl": "http://example.org"})
        );
    }

    #[test]
    fn test_pub_date_accepts_timestamp() {
        let doc: DatasetDoc = serde_json::from_value(json!({
            "id": "x",
            "db": "gbif",
            "dbUrl": "http://a",
            "pubDate": "2020-02-29T23:30:00-02:00"
        }))
        .unwrap();
        assert_eq!(doc.pub_date, NaiveDate::from_ymd_opt(2020, 2, 29));
        // Written back as a plain date.
        assert_eq!(serde_json::to_value(&doc).unwrap()["pubDate"], "2020-02-29");
    }

    #[test]
    fn test_pub_date_rejects_garbage() {
        let result: Result<DatasetDoc, _> = serde_json::from_value(json!({
            "id": "x",
            "db": "gbif",
            "dbUrl": "http://a",
            "pubDate": "29/02/2020"
        }));
        assert!(result.is_err());
        assert_eq!(parse_pub_date("2021-02-29"), None);
    }

    #[test]
    fn test_pub_date_format() {
        let value = serde_json::to_value(full_doc()).unwrap();
        assert_eq!(value["pubDate"], "2021-03-04");
    }

    #[test]
    fn test_duplicate_in_field_list() {
        let fields = [
            FieldSpec {
                name: "a",
                field_type: FieldType::Keyword,
                required: false,
            },
            FieldSpec {
                name: "a",
                field_type: FieldType::Text,
                required: false,
            },
        ];
        let err = properties_from(&fields).unwrap_err();
        assert!(matches!(err, AppError::DuplicateProperty(name) if name == "a"));
    }

    #[test]
    fn test_merge_rejects_redeclared_shared_field() {
        let shared = shared_properties().unwrap();
        let own = [FieldSpec {
            name: "title",
            field_type: FieldType::Keyword,
            required: false,
        }];
        assert!(IndexMapping::try_merge(&shared, &own).is_err());
    }

    #[test]
    fn test_merge_leaves_shared_untouched() {
        let shared = shared_properties().unwrap();
        let before = shared.clone();
        let own = [FieldSpec {
            name: "license",
            field_type: FieldType::Keyword,
            required: false,
        }];
        let _ = IndexMapping::try_merge(&shared, &own).unwrap();
        assert_eq!(shared, before);
    }

    #[test]
    fn test_mapping_serialization_shape() {
        let mut shared = Properties::new();
        shared.insert("id".into(), FieldType::Keyword.into());
        shared.insert("pubDate".into(), FieldType::Date.into());
        let own = [FieldSpec {
            name: "license",
            field_type: FieldType::Keyword,
            required: false,
        }];

        let mapping = IndexMapping::try_merge(&shared, &own).unwrap();
        assert_eq!(
            mapping.to_json().unwrap(),
            json!({
                "dynamic": "strict",
                "properties": {
                    "id": {"type": "keyword"},
                    "license": {"type": "keyword"},
                    "pubDate": {"type": "date"}
                }
            })
        );
    }

    #[test]
    fn test_diff_identical_mapping() {
        let shared = shared_properties().unwrap();
        let mapping = IndexMapping::try_merge(&shared, &[]).unwrap();
        let live = mapping.to_json().unwrap();

        let diff = MappingDiff::between(&live, &mapping);
        assert!(diff.is_empty());
        assert!(diff.is_compatible());
    }

    #[test]
    fn test_diff_added_field_is_compatible() {
        let shared = shared_properties().unwrap();
        let old = IndexMapping::try_merge(&shared, &[]).unwrap();
        let new = IndexMapping::try_merge(
            &shared,
            &[FieldSpec {
                name: "license",
                field_type: FieldType::Keyword,
                required: false,
            }],
        )
        .unwrap();

        let diff = MappingDiff::between(&old.to_json().unwrap(), &new);
        assert_eq!(diff.added, vec!["license".to_string()]);
        assert!(diff.is_compatible());
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_diff_changed_type_conflicts() {
        let live = json!({
            "dynamic": "strict",
            "properties": {"id": {"type": "text"}}
        });
        let mut properties = Properties::new();
        properties.insert("id".into(), FieldType::Keyword.into());
        let desired = IndexMapping {
            dynamic: Dynamic::Strict,
            properties,
        };

        let diff = MappingDiff::between(&live, &desired);
        assert!(!diff.is_compatible());
        assert_eq!(diff.changed.len(), 1);
        assert!(diff.describe_conflicts().contains("'id' is text"));
    }

    #[test]
    fn test_diff_removed_field_and_dynamic() {
        let live = json!({
            "properties": {"id": {"type": "keyword"}, "legacy": {"type": "keyword"}}
        });
        let mut properties = Properties::new();
        properties.insert("id".into(), FieldType::Keyword.into());
        let desired = IndexMapping {
            dynamic: Dynamic::Strict,
            properties,
        };

        let diff = MappingDiff::between(&live, &desired);
        assert_eq!(diff.removed, vec!["legacy".to_string()]);
        assert_eq!(diff.dynamic_changed.as_deref(), Some("true"));
        assert!(!diff.is_compatible());
    }
}
