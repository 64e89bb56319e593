use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;
use vbd_core::config::SourceSettings;
use vbd_core::{AppError, GbifDoc, HttpConfig};

use crate::http::send_with_retry;

/// Public GBIF API root.
pub const GBIF_API_URL: &str = "https://api.gbif.org";

/// Landing pages on the public GBIF site.
const GBIF_SITE_URL: &str = "https://www.gbif.org";

/// GBIF caps `limit` on the dataset search endpoint.
const MAX_PAGE_SIZE: u32 = 1000;

/// One page of a GBIF paged response.
///
/// GBIF API reference: <https://techdocs.gbif.org/en/openapi/v1/registry>
///
/// ```json
/// {
///     "offset": 0,
///     "limit": 20,
///     "endOfRecords": false,
///     "count": 1234,
///     "results": [ ... ]
/// }
/// ```
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GbifPage<T> {
    pub offset: u64,
    pub limit: u64,
    pub end_of_records: bool,
    #[serde(default)]
    pub count: Option<u64>,
    pub results: Vec<T>,
    /// Records dropped because they did not parse as `T`.
    #[serde(skip)]
    pub skipped: usize,
}

impl GbifPage<Value> {
    /// Parses each raw record on its own, dropping the ones that do not fit.
    pub fn into_datasets(self) -> GbifPage<GbifDataset> {
        let mut skipped = self.skipped;
        let results = self
            .results
            .into_iter()
            .filter_map(|raw| {
                let key = raw.get("key").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<GbifDataset>(raw) {
                    Ok(dataset) => Some(dataset),
                    Err(e) => {
                        warn!("Skipping malformed GBIF dataset {}: {}", key, e);
                        skipped += 1;
                        None
                    }
                }
            })
            .collect();

        GbifPage {
            offset: self.offset,
            limit: self.limit,
            end_of_records: self.end_of_records,
            count: self.count,
            results,
            skipped,
        }
    }
}

/// Data Transfer Object for a GBIF dataset search result.
///
/// Only the fields that feed the index document are typed; the rest are kept
/// in `extras`.
///
/// # Examples
///
/// ```
/// use vbd_client::gbif::GbifDataset;
///
/// let json = r#"{
///     "key": "4fa7b334-ce0d-4e88-aaae-2e0c138d049e",
///     "title": "Mosquito occurrences",
///     "license": "CC_BY_4_0",
///     "type": "OCCURRENCE"
/// }"#;
///
/// let dataset: GbifDataset = serde_json::from_str(json).unwrap();
/// assert_eq!(dataset.title.as_deref(), Some("Mosquito occurrences"));
/// assert!(dataset.extras.contains_key("type"));
/// ```
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GbifDataset {
    pub key: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub publishing_organization_key: Option<Uuid>,
    #[serde(default)]
    pub pub_date: Option<String>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// HTTP client for the GBIF registry API.
///
/// # Examples
///
/// ```no_run
/// use vbd_client::GbifClient;
/// use vbd_core::SourcesConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GbifClient::new("https://api.gbif.org")?;
/// let settings = &SourcesConfig::default().sources[0];
/// let page = client.search_datasets(settings, 0, 20).await?;
/// println!("{} matching datasets", page.count.unwrap_or_default());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GbifClient {
    client: Client,
    base_url: Url,
    http: HttpConfig,
}

impl GbifClient {
    /// Creates a client for the GBIF API at `base_url_str`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the URL is malformed.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(base_url_str: &str) -> Result<Self, AppError> {
        Self::with_config(base_url_str, HttpConfig::default())
    }

    pub fn with_config(base_url_str: &str, http: HttpConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url_str)
            .map_err(|_| AppError::InvalidUrl(format!("Invalid GBIF URL: {}", base_url_str)))?;

        let client = Client::builder()
            .user_agent("vbd-hub/0.1 (dataset-sync)")
            .timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            http,
        })
    }

    /// Fetches one page of `GET /v1/dataset/search` filtered by `settings`.
    ///
    /// A record that does not parse is counted in `skipped` and left out;
    /// the rest of the page is kept.
    pub async fn search_datasets(
        &self,
        settings: &SourceSettings,
        offset: u64,
        limit: u32,
    ) -> Result<GbifPage<GbifDataset>, AppError> {
        let url = self.search_url(settings, offset, limit)?;
        debug!("GET {}", url);

        let resp = send_with_retry(&self.http, url.as_str(), || {
            self.client.get(url.clone())
        })
        .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::ClientError(format!(
                "HTTP {} from {}",
                status.as_u16(),
                url
            )));
        }

        let page: GbifPage<Value> = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        Ok(page.into_datasets())
    }

    fn search_url(
        &self,
        settings: &SourceSettings,
        offset: u64,
        limit: u32,
    ) -> Result<Url, AppError> {
        let mut url = self
            .base_url
            .join("v1/dataset/search")
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            if let Some(q) = settings.query.as_deref().filter(|q| !q.trim().is_empty()) {
                pairs.append_pair("q", q);
            }
            for keyword in &settings.keywords {
                pairs.append_pair("keyword", keyword);
            }
            for dataset_type in &settings.dataset_types {
                pairs.append_pair("type", dataset_type);
            }
            pairs.append_pair("offset", &offset.to_string());
            pairs.append_pair("limit", &limit.clamp(1, MAX_PAGE_SIZE).to_string());
        }

        Ok(url)
    }

    /// Converts a GBIF dataset into its index document.
    ///
    /// The document id is the GBIF dataset key, so the same upstream dataset
    /// always maps to the same document.
    ///
    /// # Examples
    ///
    /// ```
    /// use vbd_client::GbifClient;
    /// use vbd_client::gbif::GbifDataset;
    ///
    /// let dataset: GbifDataset = serde_json::from_str(r#"{
    ///     "key": "4fa7b334-ce0d-4e88-aaae-2e0c138d049e",
    ///     "title": "Ticks of Europe",
    ///     "license": "CC0_1_0",
    ///     "pubDate": "2019-06-01T00:00:00.000+0000"
    /// }"#).unwrap();
    ///
    /// let doc = GbifClient::into_doc(dataset);
    /// assert_eq!(doc.id(), "4fa7b334-ce0d-4e88-aaae-2e0c138d049e");
    /// assert_eq!(doc.base.db_url, "https://www.gbif.org/dataset/4fa7b334-ce0d-4e88-aaae-2e0c138d049e");
    /// assert_eq!(doc.base.pub_date.unwrap().to_string(), "2019-06-01");
    /// ```
    pub fn into_doc(dataset: GbifDataset) -> GbifDoc {
        let id = dataset.key.to_string();
        let mut doc = GbifDoc::new(id.clone(), format!("{}/dataset/{}", GBIF_SITE_URL, id));

        doc.base.title = non_empty(dataset.title);
        doc.base.description = non_empty(dataset.description);
        doc.base.author_url = dataset
            .publishing_organization_key
            .map(|key| format!("{}/publisher/{}", GBIF_SITE_URL, key));
        doc.base.pub_date = dataset.pub_date.as_deref().and_then(parse_pub_date);
        doc.license = non_empty(dataset.license);

        doc
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parses the date part of a GBIF timestamp (`2019-06-01T00:00:00.000+0000`).
fn parse_pub_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.get(..10)?;
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            debug!("Ignoring unparseable pubDate '{}': {}", raw, e);
            None
        }
    }
}
