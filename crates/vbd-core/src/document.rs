//! Heterogeneous dataset documents and the `db` discriminator.
//!
//! Query results spanning several indexes come back as [`AnyDatasetDoc`].
//! Consumers branch on the variant before touching source-specific fields,
//! and must handle [`AnyDatasetDoc::Unknown`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::schema::FIELD_DB;
use crate::source::Source;
use crate::sources::gbif::GbifDoc;

/// A typed document that belongs to exactly one source index.
pub trait SourceDocument: Serialize + DeserializeOwned + Send + Sync {
    const SOURCE: Source;

    /// Stable id, used as the engine `_id`.
    fn doc_id(&self) -> &str;

    fn index_name() -> &'static str {
        Self::SOURCE.index_name()
    }
}

impl SourceDocument for GbifDoc {
    const SOURCE: Source = Source::Gbif;

    fn doc_id(&self) -> &str {
        self.id()
    }
}

/// A dataset document from any source.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyDatasetDoc {
    Gbif(GbifDoc),
    /// `db` is missing, not a string, names no known source, or the payload
    /// does not fit the shape of the source it names.
    Unknown(Value),
}

impl AnyDatasetDoc {
    /// Narrows a raw document on its `db` field.
    ///
    /// Never fails: anything that cannot be narrowed is kept as `Unknown`.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use vbd_core::AnyDatasetDoc;
    ///
    /// let doc = AnyDatasetDoc::from_value(json!({
    ///     "id": "x", "db": "gbif", "dbUrl": "http://www.gbif.org/dataset/x"
    /// }));
    /// assert!(matches!(doc, AnyDatasetDoc::Gbif(_)));
    ///
    /// let doc = AnyDatasetDoc::from_value(json!({"id": "x", "db": "other-source"}));
    /// assert!(matches!(doc, AnyDatasetDoc::Unknown(_)));
    /// ```
    pub fn from_value(value: Value) -> Self {
        let source = discriminant(&value).and_then(Source::from_name);

        match source {
            Some(Source::Gbif) => match GbifDoc::deserialize(&value) {
                Ok(doc) => AnyDatasetDoc::Gbif(doc),
                Err(e) => {
                    debug!("Document tagged gbif does not fit GBIF shape: {}", e);
                    AnyDatasetDoc::Unknown(value)
                }
            },
            None => AnyDatasetDoc::Unknown(value),
        }
    }

    /// Source of this document, `None` for unknown documents.
    pub fn source(&self) -> Option<Source> {
        match self {
            AnyDatasetDoc::Gbif(_) => Some(Source::Gbif),
            AnyDatasetDoc::Unknown(_) => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            AnyDatasetDoc::Gbif(doc) => Some(doc.id()),
            AnyDatasetDoc::Unknown(value) => value.get("id").and_then(Value::as_str),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            AnyDatasetDoc::Gbif(doc) => doc.base.title.as_deref(),
            AnyDatasetDoc::Unknown(value) => value.get("title").and_then(Value::as_str),
        }
    }

    pub fn as_gbif(&self) -> Option<&GbifDoc> {
        match self {
            AnyDatasetDoc::Gbif(doc) => Some(doc),
            AnyDatasetDoc::Unknown(_) => None,
        }
    }
}

impl From<GbifDoc> for AnyDatasetDoc {
    fn from(doc: GbifDoc) -> Self {
        AnyDatasetDoc::Gbif(doc)
    }
}

impl Serialize for AnyDatasetDoc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AnyDatasetDoc::Gbif(doc) => doc.serialize(serializer),
            AnyDatasetDoc::Unknown(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AnyDatasetDoc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(AnyDatasetDoc::from_value(value))
    }
}

/// Returns true iff `doc` is a GBIF document.
pub fn is_gbif_doc(doc: &AnyDatasetDoc) -> bool {
    matches!(doc, AnyDatasetDoc::Gbif(_))
}

/// Checks the raw `db` field of an un-narrowed document against `source`.
///
/// Missing or non-string `db` yields false.
pub fn is_source_doc_value(value: &Value, source: Source) -> bool {
    discriminant(value) == Some(source.name())
}

fn discriminant(value: &Value) -> Option<&str> {
    value.get(FIELD_DB).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceRegistry;
    use crate::validate::validate_for_source;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use serde_json::json;

    fn gbif_value(db: &str) -> Value {
        json!({
            "id": "x",
            "title": "Y",
            "db": db,
            "dbUrl": "http://www.gbif.org/dataset/x",
            "license": "CC-BY"
        })
    }

    #[test]
    fn test_source_document_index() {
        assert_eq!(GbifDoc::index_name(), "gbif");
        let doc = GbifDoc::new("abc", "http://a");
        assert_eq!(doc.doc_id(), "abc");
    }

    #[test]
    fn test_gbif_doc_narrows() {
        let doc = AnyDatasetDoc::from_value(gbif_value("gbif"));
        assert!(is_gbif_doc(&doc));
        assert_eq!(doc.source(), Some(Source::Gbif));
        assert_eq!(doc.as_gbif().unwrap().license.as_deref(), Some("CC-BY"));
    }

    #[test]
    fn test_other_source_is_unknown() {
        let doc = AnyDatasetDoc::from_value(gbif_value("other-source"));
        assert!(!is_gbif_doc(&doc));
        assert_eq!(doc.source(), None);
        assert_eq!(doc.id(), Some("x"));
    }

    #[test]
    fn test_missing_db_is_unknown() {
        let doc = AnyDatasetDoc::from_value(json!({"id": "x", "dbUrl": "http://a"}));
        assert!(!is_gbif_doc(&doc));
    }

    #[test]
    fn test_non_string_db_is_unknown() {
        let value = json!({"id": "x", "db": 7, "dbUrl": "http://a"});
        assert!(!is_source_doc_value(&value, Source::Gbif));
        assert!(!is_gbif_doc(&AnyDatasetDoc::from_value(value)));
    }

    #[test]
    fn test_malformed_gbif_payload_is_unknown() {
        // Tagged gbif but missing the required dbUrl.
        let doc = AnyDatasetDoc::from_value(json!({"id": "x", "db": "gbif"}));
        assert!(matches!(doc, AnyDatasetDoc::Unknown(_)));
        assert_eq!(doc.title(), None);
    }

    #[test]
    fn test_timestamp_pub_date_validates_and_narrows() {
        let value = json!({
            "id": "x",
            "db": "gbif",
            "dbUrl": "http://www.gbif.org/dataset/x",
            "pubDate": "2020-02-29T10:00:00Z"
        });

        let registry = SourceRegistry::new().unwrap();
        assert!(validate_for_source(&value, registry.entry(Source::Gbif)).is_empty());

        let doc = AnyDatasetDoc::from_value(value);
        assert_eq!(
            doc.as_gbif().unwrap().base.pub_date,
            NaiveDate::from_ymd_opt(2020, 2, 29)
        );
    }

    #[test]
    fn test_deserialize_mixed_hits() {
        let hits: Vec<AnyDatasetDoc> = serde_json::from_value(json!([
            gbif_value("gbif"),
            gbif_value("vectorbase"),
            {"id": "z"}
        ]))
        .unwrap();

        let gbif = hits.iter().filter(|d| is_gbif_doc(d)).count();
        assert_eq!(gbif, 1);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_serialize_roundtrip_keeps_unknown_payload() {
        let raw = json!({"id": "z", "db": "vectorbase", "extra": [1, 2]});
        let doc = AnyDatasetDoc::from_value(raw.clone());
        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    proptest! {
        #[test]
        fn prop_only_gbif_literal_narrows(db in "[a-zA-Z0-9_-]{0,12}") {
            let doc = AnyDatasetDoc::from_value(gbif_value(&db));
            prop_assert_eq!(is_gbif_doc(&doc), db == "gbif");
            prop_assert_eq!(is_source_doc_value(&gbif_value(&db), Source::Gbif), db == "gbif");
        }

        #[test]
        fn prop_gbif_docs_always_narrow(
            id in "[a-f0-9-]{1,36}",
            title in proptest::option::of(".{0,40}"),
            license in proptest::option::of("[A-Z0-9_]{1,12}"),
        ) {
            let mut doc = GbifDoc::new(id, "https://www.gbif.org/dataset/x");
            doc.base.title = title;
            doc.license = license;

            let value = serde_json::to_value(&doc).unwrap();
            let narrowed = AnyDatasetDoc::from_value(value);
            prop_assert_eq!(narrowed, AnyDatasetDoc::Gbif(doc));
        }
    }
}
