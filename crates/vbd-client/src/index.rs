//! Client for the Elasticsearch-compatible REST API holding the dataset indexes.

use std::collections::HashMap;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;
use vbd_core::{
    AppError, HttpConfig, IndexMapping, MappingDiff, SearchRequest, SearchResults, SourceDocument,
    SourceEntry,
};

use crate::http::send_with_retry;

/// Default search engine location for local development.
pub const DEFAULT_SEARCH_URL: &str = "http://localhost:9200";

/// Error types the engine uses when a document does not fit the mapping.
const SCHEMA_ERROR_TYPES: &[&str] = &[
    "strict_dynamic_mapping_exception",
    "mapper_parsing_exception",
    "document_parsing_exception",
];

/// What [`SearchClient::ensure_index`] had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    Created,
    UpToDate,
    /// New fields were added to the live mapping.
    Extended(Vec<String>),
}

/// Per-document result of a bulk request.
#[derive(Debug)]
pub enum BulkItemOutcome {
    Created(String),
    Updated(String),
    Deleted(String),
    /// Delete of a document that was already gone.
    NotFound(String),
    Rejected { id: String, error: AppError },
}

impl BulkItemOutcome {
    pub fn id(&self) -> &str {
        match self {
            BulkItemOutcome::Created(id)
            | BulkItemOutcome::Updated(id)
            | BulkItemOutcome::Deleted(id)
            | BulkItemOutcome::NotFound(id) => id,
            BulkItemOutcome::Rejected { id, .. } => id,
        }
    }
}

#[derive(Deserialize)]
struct BulkResponse {
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<EngineError>,
}

#[derive(Deserialize, Debug, Clone)]
struct EngineError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct MgetResponse {
    docs: Vec<MgetDoc>,
}

#[derive(Deserialize)]
struct MgetDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Value>,
}

/// HTTP client for the search engine.
///
/// # Examples
///
/// ```no_run
/// use vbd_client::SearchClient;
/// use vbd_core::SearchRequest;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SearchClient::new("http://localhost:9200")?;
/// let results = client.search(&SearchRequest::new("anopheles")).await?;
/// println!("{} hits", results.total);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SearchClient {
    client: Client,
    base_url: Url,
    http: HttpConfig,
}

impl SearchClient {
    pub fn new(base_url_str: &str) -> Result<Self, AppError> {
        Self::with_config(base_url_str, HttpConfig::default())
    }

    pub fn with_config(base_url_str: &str, http: HttpConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url_str).map_err(|_| {
            AppError::InvalidUrl(format!("Invalid search engine URL: {}", base_url_str))
        })?;

        let client = Client::builder()
            .timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            http,
        })
    }

    fn url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::InvalidUrl(e.to_string()))
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool, AppError> {
        let url = self.url(index)?;
        let resp = send_with_retry(&self.http, url.as_str(), || self.client.head(url.clone()))
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(engine_error(resp).await),
        }
    }

    /// Creates `index` with `mapping`.
    pub async fn create_index(&self, index: &str, mapping: &IndexMapping) -> Result<(), AppError> {
        let url = self.url(index)?;
        let body = json!({ "mappings": mapping });

        let resp = send_with_retry(&self.http, url.as_str(), || {
            self.client.put(url.clone()).json(&body)
        })
        .await?;
        ensure_success(resp).await?;

        info!("Created index '{}'", index);
        Ok(())
    }

    /// Returns the live `mappings` object of `index`.
    pub async fn get_mapping(&self, index: &str) -> Result<Value, AppError> {
        let url = self.url(&format!("{}/_mapping", index))?;
        let resp =
            send_with_retry(&self.http, url.as_str(), || self.client.get(url.clone())).await?;
        let body: Value = ensure_success(resp).await?.json().await.map_err(client_error)?;

        // The response is keyed by concrete index name, which differs from
        // `index` when it is an alias.
        body.as_object()
            .and_then(|indices| indices.values().next())
            .and_then(|entry| entry.get("mappings"))
            .cloned()
            .ok_or(AppError::EmptyResponse)
    }

    /// Adds fields to the live mapping of `index`.
    pub async fn put_mapping(&self, index: &str, mapping: &IndexMapping) -> Result<(), AppError> {
        let url = self.url(&format!("{}/_mapping", index))?;
        let resp = send_with_retry(&self.http, url.as_str(), || {
            self.client.put(url.clone()).json(mapping)
        })
        .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Makes sure the source's index exists with a compatible mapping.
    ///
    /// Missing indexes are created. New fields are added in place. Changed
    /// or removed fields fail with `AppError::MappingConflict`; the live
    /// index is left untouched and must be reindexed by hand.
    pub async fn ensure_index(&self, entry: &SourceEntry) -> Result<IndexStatus, AppError> {
        let index = entry.index_name;

        if !self.index_exists(index).await? {
            self.create_index(index, &entry.mapping).await?;
            return Ok(IndexStatus::Created);
        }

        let live = self.get_mapping(index).await?;
        let diff = MappingDiff::between(&live, &entry.mapping);

        if diff.is_empty() {
            debug!("Index '{}' mapping is up to date", index);
            return Ok(IndexStatus::UpToDate);
        }

        if !diff.is_compatible() {
            return Err(AppError::MappingConflict {
                index: index.to_string(),
                details: diff.describe_conflicts(),
            });
        }

        self.put_mapping(index, &entry.mapping).await?;
        info!(
            "Extended index '{}' mapping with: {}",
            index,
            diff.added.join(", ")
        );
        Ok(IndexStatus::Extended(diff.added))
    }

    /// Fetches the stored `_source` of each id that exists in `index`.
    pub async fn fetch_sources(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Value>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = self.url(&format!("{}/_mget", index))?;
        let body = json!({ "ids": ids });
        let resp = send_with_retry(&self.http, url.as_str(), || {
            self.client.post(url.clone()).json(&body)
        })
        .await?;

        let parsed: MgetResponse = ensure_success(resp).await?.json().await.map_err(client_error)?;

        Ok(parsed
            .docs
            .into_iter()
            .filter(|d| d.found)
            .filter_map(|d| d.source.map(|s| (d.id, s)))
            .collect())
    }

    /// Writes documents with their ids as `_id`, overwriting existing ones.
    pub async fn bulk_index<'a, D, I>(&self, docs: I) -> Result<Vec<BulkItemOutcome>, AppError>
    where
        D: SourceDocument + 'a,
        I: IntoIterator<Item = &'a D>,
    {
        let body = index_ndjson(docs)?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        self.bulk(body).await
    }

    /// Deletes documents by id.
    pub async fn bulk_delete(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<Vec<BulkItemOutcome>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = delete_ndjson(index, ids)?;
        self.bulk(body).await
    }

    async fn bulk(&self, body: String) -> Result<Vec<BulkItemOutcome>, AppError> {
        let url = self.url("_bulk")?;
        let resp = send_with_retry(&self.http, url.as_str(), || {
            self.client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(body.clone())
        })
        .await?;

        let parsed: Value = ensure_success(resp).await?.json().await.map_err(client_error)?;
        parse_bulk_response(parsed)
    }

    /// Every document id in `index`, paged with `search_after` on `id`.
    pub async fn list_ids(&self, index: &str, page_size: usize) -> Result<Vec<String>, AppError> {
        let url = self.url(&format!("{}/_search", index))?;
        let mut ids = Vec::new();
        let mut after: Option<Value> = None;

        loop {
            let mut body = json!({
                "size": page_size,
                "_source": false,
                "query": {"match_all": {}},
                "sort": [{"id": "asc"}]
            });
            if let Some(cursor) = &after {
                body["search_after"] = cursor.clone();
            }

            let resp = send_with_retry(&self.http, url.as_str(), || {
                self.client.post(url.clone()).json(&body)
            })
            .await?;
            let page: Value = ensure_success(resp).await?.json().await.map_err(client_error)?;

            let hits = page["hits"]["hits"].as_array().cloned().unwrap_or_default();
            if hits.is_empty() {
                break;
            }

            for hit in &hits {
                if let Some(id) = hit["_id"].as_str() {
                    ids.push(id.to_string());
                }
            }

            after = hits.last().and_then(|h| h.get("sort")).cloned();
            if after.is_none() || hits.len() < page_size {
                break;
            }
        }

        Ok(ids)
    }

    /// Runs a query across the indexes it names.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults, AppError> {
        let mut url = self.url(&format!("{}/_search", request.index_path()))?;
        url.query_pairs_mut()
            .append_pair("ignore_unavailable", "true");
        let body = request.to_query_body();

        let resp = send_with_retry(&self.http, url.as_str(), || {
            self.client.post(url.clone()).json(&body)
        })
        .await?;
        let parsed: Value = ensure_success(resp).await?.json().await.map_err(client_error)?;

        SearchResults::from_response(parsed)
    }

    /// Number of documents in `index`.
    pub async fn count(&self, index: &str) -> Result<u64, AppError> {
        let url = self.url(&format!("{}/_count", index))?;
        let resp =
            send_with_retry(&self.http, url.as_str(), || self.client.get(url.clone())).await?;
        let parsed: Value = ensure_success(resp).await?.json().await.map_err(client_error)?;

        parsed["count"].as_u64().ok_or(AppError::EmptyResponse)
    }
}

fn client_error(e: reqwest::Error) -> AppError {
    AppError::ClientError(e.to_string())
}

async fn ensure_success(resp: Response) -> Result<Response, AppError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(engine_error(resp).await)
    }
}

/// Builds an error from a non-success engine response.
async fn engine_error(resp: Response) -> AppError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();

    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| body.get("error").cloned())
        .map(|error| match error {
            Value::String(s) => s,
            other => serde_json::from_value::<EngineError>(other)
                .map(|e| format!("{}: {}", e.kind, e.reason.unwrap_or_default()))
                .unwrap_or_else(|_| text.clone()),
        })
        .unwrap_or(text);

    AppError::SearchEngineError { status, message }
}

fn index_ndjson<'a, D, I>(docs: I) -> Result<String, AppError>
where
    D: SourceDocument + 'a,
    I: IntoIterator<Item = &'a D>,
{
    let mut body = String::new();
    for doc in docs {
        let action = json!({"index": {"_index": D::index_name(), "_id": doc.doc_id()}});
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(doc)?);
        body.push('\n');
    }
    Ok(body)
}

fn delete_ndjson(index: &str, ids: &[String]) -> Result<String, AppError> {
    let mut body = String::new();
    for id in ids {
        let action = json!({"delete": {"_index": index, "_id": id}});
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
    }
    Ok(body)
}

fn parse_bulk_response(body: Value) -> Result<Vec<BulkItemOutcome>, AppError> {
    let parsed: BulkResponse = serde_json::from_value(body)?;

    let outcomes = parsed
        .items
        .into_iter()
        .filter_map(|item| item.into_iter().next())
        .map(|(action, item)| {
            let id = item.id.unwrap_or_default();

            if let Some(error) = item.error {
                let reason = error.reason.clone().unwrap_or_else(|| error.kind.clone());
                let error = if SCHEMA_ERROR_TYPES.contains(&error.kind.as_str()) {
                    AppError::SchemaViolation {
                        id: id.clone(),
                        reason,
                    }
                } else {
                    AppError::SearchEngineError {
                        status: item.status,
                        message: format!("{}: {}", error.kind, reason),
                    }
                };
                return BulkItemOutcome::Rejected { id, error };
            }

            match (action.as_str(), item.result.as_deref()) {
                ("delete", Some("not_found")) => BulkItemOutcome::NotFound(id),
                ("delete", _) => BulkItemOutcome::Deleted(id),
                (_, Some("created")) => BulkItemOutcome::Created(id),
                (_, Some("updated")) | (_, Some("noop")) => BulkItemOutcome::Updated(id),
                (_, other) => {
                    warn!("Unexpected bulk result {:?} for {}", other, id);
                    BulkItemOutcome::Updated(id)
                }
            }
        })
        .collect();

    Ok(outcomes)
}
