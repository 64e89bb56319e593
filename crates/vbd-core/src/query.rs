//! Search requests against dataset indexes and parsing of their results.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::document::AnyDatasetDoc;
use crate::error::AppError;
use crate::schema::{FIELD_DESCRIPTION, FIELD_PUB_DATE, FIELD_TITLE};
use crate::source::Source;
use crate::sources::gbif::FIELD_LICENSE;

/// Name of the license facet in query aggregations.
pub const LICENSE_FACET: &str = "licenses";

const DEFAULT_LIMIT: usize = 10;
const FACET_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Relevance,
    /// Most recent `pubDate` first, undated documents last.
    Newest,
}

/// A full-text query with optional facet filters.
///
/// # Examples
///
/// ```
/// use vbd_core::query::SearchRequest;
///
/// let request = SearchRequest::new("aedes albopictus").with_license("CC_BY_4_0");
/// let body = request.to_query_body();
/// assert_eq!(body["query"]["bool"]["filter"][0]["term"]["license"], "CC_BY_4_0");
/// assert_eq!(request.index_path(), "gbif");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub text: String,
    /// Restricts the query to these sources; empty means all.
    pub sources: Vec<Source>,
    pub license: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub sort: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            sources: Vec::new(),
            license: None,
            from_date: None,
            to_date: None,
            sort: SortOrder::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    /// Comma-separated index list for the `/{indices}/_search` path.
    pub fn index_path(&self) -> String {
        let sources: &[Source] = if self.sources.is_empty() {
            Source::ALL
        } else {
            &self.sources
        };

        let mut names: Vec<&str> = sources.iter().map(|s| s.index_name()).collect();
        names.sort_unstable();
        names.dedup();
        names.join(",")
    }

    /// Builds the engine query body.
    pub fn to_query_body(&self) -> Value {
        let text = self.text.trim();
        let must = if text.is_empty() {
            json!({"match_all": {}})
        } else {
            json!({
                "multi_match": {
                    "query": text,
                    "fields": [format!("{}^2", FIELD_TITLE), FIELD_DESCRIPTION]
                }
            })
        };

        let mut filter = Vec::new();
        if let Some(license) = &self.license {
            filter.push(json!({"term": {FIELD_LICENSE: license}}));
        }
        if self.from_date.is_some() || self.to_date.is_some() {
            let mut range = serde_json::Map::new();
            if let Some(from) = self.from_date {
                range.insert("gte".to_string(), json!(from.format("%Y-%m-%d").to_string()));
            }
            if let Some(to) = self.to_date {
                range.insert("lte".to_string(), json!(to.format("%Y-%m-%d").to_string()));
            }
            filter.push(json!({"range": {FIELD_PUB_DATE: range}}));
        }

        let mut body = json!({
            "from": self.offset,
            "size": self.limit,
            "track_total_hits": true,
            "query": {"bool": {"must": [must], "filter": filter}},
            "aggs": {
                LICENSE_FACET: {"terms": {"field": FIELD_LICENSE, "size": FACET_SIZE}}
            }
        });

        if self.sort == SortOrder::Newest {
            body["sort"] = json!([
                {FIELD_PUB_DATE: {"order": "desc", "missing": "_last"}},
                "_score"
            ]);
        }

        body
    }
}

/// One matching document.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub index: String,
    pub score: Option<f64>,
    pub doc: AnyDatasetDoc,
}

/// One bucket of a facet aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FacetCount {
    pub key: String,
    #[serde(rename = "doc_count")]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
    pub licenses: Vec<FacetCount>,
}

#[derive(Deserialize)]
struct RawResponse {
    hits: RawHits,
    #[serde(default)]
    aggregations: Option<RawAggregations>,
}

#[derive(Deserialize)]
struct RawHits {
    total: RawTotal,
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Object { value: u64 },
    Number(u64),
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: AnyDatasetDoc,
}

#[derive(Deserialize)]
struct RawAggregations {
    licenses: Option<RawTerms>,
}

#[derive(Deserialize)]
struct RawTerms {
    buckets: Vec<FacetCount>,
}

impl SearchResults {
    /// Parses a `_search` response body.
    pub fn from_response(body: Value) -> Result<Self, AppError> {
        let raw: RawResponse = serde_json::from_value(body)?;

        let total = match raw.hits.total {
            RawTotal::Object { value } => value,
            RawTotal::Number(n) => n,
        };

        let hits = raw
            .hits
            .hits
            .into_iter()
            .map(|h| SearchHit {
                index: h.index,
                score: h.score,
                doc: h.source,
            })
            .collect();

        let licenses = raw
            .aggregations
            .and_then(|a| a.licenses)
            .map(|t| t.buckets)
            .unwrap_or_default();

        Ok(Self {
            total,
            hits,
            licenses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_matches_all() {
        let body = SearchRequest::default().to_query_body();
        assert_eq!(body["query"]["bool"]["must"][0], json!({"match_all": {}}));
        assert_eq!(body["size"], 10);
        assert!(body.get("sort").is_none());
    }

    #[test]
    fn test_text_query_weights_title() {
        let body = SearchRequest::new("  malaria vectors ").to_query_body();
        let mm = &body["query"]["bool"]["must"][0]["multi_match"];
        assert_eq!(mm["query"], "malaria vectors");
        assert_eq!(mm["fields"], json!(["title^2", "description"]));
    }

    #[test]
    fn test_date_range_filter() {
        let request = SearchRequest {
            from_date: NaiveDate::from_ymd_opt(2010, 1, 1),
            ..SearchRequest::new("ticks")
        };
        let body = request.to_query_body();
        assert_eq!(
            body["query"]["bool"]["filter"][0],
            json!({"range": {"pubDate": {"gte": "2010-01-01"}}})
        );
    }

    #[test]
    fn test_newest_sort() {
        let request = SearchRequest {
            sort: SortOrder::Newest,
            ..SearchRequest::default()
        };
        let body = request.to_query_body();
        assert_eq!(body["sort"][0]["pubDate"]["order"], "desc");
    }

    #[test]
    fn test_license_facet_requested() {
        let body = SearchRequest::default().to_query_body();
        assert_eq!(body["aggs"]["licenses"]["terms"]["field"], "license");
    }

    #[test]
    fn test_index_path_dedups() {
        let request = SearchRequest::default().with_sources(vec![Source::Gbif, Source::Gbif]);
        assert_eq!(request.index_path(), "gbif");
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "took": 3,
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "hits": [
                    {
                        "_index": "gbif",
                        "_id": "x",
                        "_score": 1.5,
                        "_source": {"id": "x", "db": "gbif", "dbUrl": "http://a", "license": "CC0_1_0"}
                    },
                    {
                        "_index": "legacy",
                        "_id": "y",
                        "_score": null,
                        "_source": {"id": "y", "db": "legacy"}
                    }
                ]
            },
            "aggregations": {
                "licenses": {"buckets": [{"key": "CC0_1_0", "doc_count": 1}]}
            }
        });

        let results = SearchResults::from_response(body).unwrap();
        assert_eq!(results.total, 2);
        assert_eq!(results.hits.len(), 2);
        assert!(matches!(results.hits[0].doc, AnyDatasetDoc::Gbif(_)));
        assert!(matches!(results.hits[1].doc, AnyDatasetDoc::Unknown(_)));
        assert_eq!(results.hits[1].score, None);
        assert_eq!(
            results.licenses,
            vec![FacetCount {
                key: "CC0_1_0".to_string(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_parse_response_without_aggregations() {
        let body = json!({"hits": {"total": 0, "hits": []}});
        let results = SearchResults::from_response(body).unwrap();
        assert_eq!(results.total, 0);
        assert!(results.licenses.is_empty());
    }

    #[test]
    fn test_parse_error() {
        let result = SearchResults::from_response(json!({"error": "boom"}));
        assert!(matches!(result, Err(AppError::SerializationError(_))));
    }
}
