//! GBIF (Global Biodiversity Information Facility) dataset documents.

use std::fmt;

use serde::de::{self, Deserializer, Unexpected};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::AppError;
use crate::schema::{DatasetDoc, FieldSpec, FieldType, IndexMapping, Properties};

/// Name of the physical index holding GBIF documents.
///
/// Writes, queries and index creation all key off this value. Renaming it
/// orphans every document stored under the old name.
pub const GBIF_INDEX: &str = "gbif";

/// Value of the `db` discriminant on every GBIF document.
pub const GBIF_DB: &str = "gbif";

pub const FIELD_LICENSE: &str = "license";

/// Fields GBIF documents add on top of the shared schema.
pub const GBIF_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: FIELD_LICENSE,
    field_type: FieldType::Keyword,
    required: false,
}];

/// The `db` literal `"gbif"`.
///
/// Serializes as the literal and refuses to deserialize from anything else,
/// so a [`GbifDoc`] can only ever carry the GBIF discriminant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GbifDb;

impl Serialize for GbifDb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(GBIF_DB)
    }
}

impl<'de> Deserialize<'de> for GbifDb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        if value == GBIF_DB {
            Ok(GbifDb)
        } else {
            Err(de::Error::invalid_value(Unexpected::Str(&value), &GBIF_DB))
        }
    }
}

impl fmt::Display for GbifDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(GBIF_DB)
    }
}

/// A dataset document stored in the [`GBIF_INDEX`] index.
///
/// # Examples
///
/// ```
/// use vbd_core::sources::gbif::GbifDoc;
///
/// let doc = GbifDoc::new("x", "http://www.gbif.org/dataset/x")
///     .with_title("Y")
///     .with_license("CC-BY");
///
/// let json = serde_json::to_value(&doc).unwrap();
/// assert_eq!(json["db"], "gbif");
/// assert_eq!(json["license"], "CC-BY");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GbifDoc {
    #[serde(flatten)]
    pub base: DatasetDoc<GbifDb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl GbifDoc {
    pub fn new(id: impl Into<String>, db_url: impl Into<String>) -> Self {
        Self {
            base: DatasetDoc {
                id: id.into(),
                title: None,
                description: None,
                db: GbifDb,
                db_url: db_url.into(),
                author_url: None,
                pub_date: None,
            },
            license: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.base.title = Some(title.into());
        self
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.base.id
    }
}

/// Declares the GBIF index mapping: strict, shared properties plus `license`.
///
/// Pure function of `shared`; calling it twice yields equal mappings.
pub fn gbif_mapping(shared: &Properties) -> Result<IndexMapping, AppError> {
    IndexMapping::try_merge(shared, GBIF_FIELDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{shared_properties, Dynamic};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn test_mapping_is_strict() {
        let mapping = gbif_mapping(&shared_properties().unwrap()).unwrap();
        assert_eq!(mapping.dynamic, Dynamic::Strict);
        assert_eq!(mapping.field_type("license"), Some(FieldType::Keyword));
    }

    #[test]
    fn test_mapping_is_union_of_shared_and_own() {
        let shared = shared_properties().unwrap();
        let mapping = gbif_mapping(&shared).unwrap();

        let expected: BTreeSet<&str> = shared
            .keys()
            .map(String::as_str)
            .chain(GBIF_FIELDS.iter().map(|f| f.name))
            .collect();
        let actual: BTreeSet<&str> = mapping.field_names().collect();

        assert_eq!(actual, expected);
        assert_eq!(mapping.properties.len(), shared.len() + GBIF_FIELDS.len());
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let shared = shared_properties().unwrap();
        let first = gbif_mapping(&shared).unwrap();
        let second = gbif_mapping(&shared).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_index_and_db_match() {
        assert_eq!(GBIF_INDEX, GBIF_DB);
        assert_eq!(GBIF_INDEX, GBIF_INDEX.to_lowercase());
    }

    #[test]
    fn test_serialize_doc() {
        let mut doc = GbifDoc::new("x", "http://www.gbif.org/dataset/x")
            .with_title("Y")
            .with_license("CC-BY");
        doc.base.pub_date = NaiveDate::from_ymd_opt(2019, 12, 1);

        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({
                "id": "x",
                "title": "Y",
                "db": "gbif",
                "dbUrl": "http://www.gbif.org/dataset/x",
                "pubDate": "2019-12-01",
                "license": "CC-BY"
            })
        );
    }

    #[test]
    fn test_deserialize_doc() {
        let doc: GbifDoc = serde_json::from_value(json!({
            "id": "abc",
            "db": "gbif",
            "dbUrl": "https://www.gbif.org/dataset/abc",
            "license": "CC0_1_0"
        }))
        .unwrap();

        assert_eq!(doc.id(), "abc");
        assert_eq!(doc.license.as_deref(), Some("CC0_1_0"));
        assert!(doc.base.title.is_none());
    }

    #[test]
    fn test_deserialize_rejects_other_db() {
        let result: Result<GbifDoc, _> = serde_json::from_value(json!({
            "id": "abc",
            "db": "other-source",
            "dbUrl": "https://example.org"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_requires_db_url() {
        let result: Result<GbifDoc, _> = serde_json::from_value(json!({
            "id": "abc",
            "db": "gbif"
        }));
        assert!(result.is_err());
    }
}
