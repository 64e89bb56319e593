//! Offline check of documents against a strict index mapping.
//!
//! Mirrors what the search engine enforces at write time so the pipeline can
//! drop defective documents before sending them, and so exported document
//! files can be checked without a live cluster.

use std::fmt;

use serde_json::Value;

use crate::schema::{parse_pub_date, Dynamic, FieldType, IndexMapping, FIELD_DB};
use crate::source::SourceEntry;

/// One reason a document does not satisfy a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    NotAnObject,
    UnknownField(String),
    MissingField(String),
    WrongType { field: String, expected: FieldType },
    /// `db` is a string but not the name of the index's source.
    WrongDiscriminant { expected: String, found: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotAnObject => write!(f, "document is not a JSON object"),
            Violation::UnknownField(name) => write!(f, "field '{}' is not in the mapping", name),
            Violation::MissingField(name) => write!(f, "required field '{}' is missing", name),
            Violation::WrongType { field, expected } => {
                write!(f, "field '{}' is not a valid {} value", field, expected)
            }
            Violation::WrongDiscriminant { expected, found } => {
                write!(f, "db is '{}' but this index only holds '{}'", found, expected)
            }
        }
    }
}

/// Checks `doc` against `mapping` and the list of required fields.
///
/// Returns every violation found; an empty list means the document would be
/// accepted. Unknown fields are only reported when the mapping is strict.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use vbd_core::validate::{validate_document, Violation};
/// use vbd_core::{Source, SourceRegistry};
///
/// let registry = SourceRegistry::new().unwrap();
/// let entry = registry.entry(Source::Gbif);
///
/// let doc = json!({"id": "x", "db": "gbif", "dbUrl": "http://a", "foo": "bar"});
/// let violations = validate_document(&doc, &entry.mapping, &entry.required_fields);
/// assert_eq!(violations, vec![Violation::UnknownField("foo".to_string())]);
/// ```
pub fn validate_document(doc: &Value, mapping: &IndexMapping, required: &[&str]) -> Vec<Violation> {
    let Some(fields) = doc.as_object() else {
        return vec![Violation::NotAnObject];
    };

    let mut violations = Vec::new();

    for (name, value) in fields {
        match mapping.field_type(name) {
            None => {
                if mapping.dynamic == Dynamic::Strict {
                    violations.push(Violation::UnknownField(name.clone()));
                }
            }
            Some(field_type) => {
                if !value_fits(value, field_type) {
                    violations.push(Violation::WrongType {
                        field: name.clone(),
                        expected: field_type,
                    });
                }
            }
        }
    }

    for &name in required {
        match fields.get(name) {
            None | Some(Value::Null) => violations.push(Violation::MissingField(name.to_string())),
            Some(_) => {}
        }
    }

    violations
}

/// Checks `doc` against a source's mapping and its `db` literal.
///
/// Every document in a source's index carries that source's name as `db`;
/// a mismatch is reported on top of the mapping violations.
pub fn validate_for_source(doc: &Value, entry: &SourceEntry) -> Vec<Violation> {
    let mut violations = validate_document(doc, &entry.mapping, &entry.required_fields);

    if let Some(found) = doc.get(FIELD_DB).and_then(Value::as_str) {
        let expected = entry.source.name();
        if found != expected {
            violations.push(Violation::WrongDiscriminant {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }

    violations
}

fn value_fits(value: &Value, field_type: FieldType) -> bool {
    match (value, field_type) {
        (Value::Null, _) => true,
        (Value::String(_), FieldType::Keyword | FieldType::Text) => true,
        (Value::String(s), FieldType::Date) => is_date(s),
        _ => false,
    }
}

fn is_date(s: &str) -> bool {
    parse_pub_date(s).is_some()
}
