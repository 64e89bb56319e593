//! VBD Hub Core - dataset document schema, index mappings and sync bookkeeping.

pub mod config;
pub mod document;
pub mod error;
pub mod query;
pub mod schema;
pub mod source;
pub mod sources;
pub mod sync;
pub mod validate;

pub use config::{
    default_config_path, load_sources_config, HttpConfig, SourceSettings, SourcesConfig,
    SyncConfig,
};
pub use document::{is_gbif_doc, is_source_doc_value, AnyDatasetDoc, SourceDocument};
pub use error::AppError;
pub use query::{FacetCount, SearchHit, SearchRequest, SearchResults, SortOrder};
pub use schema::{DatasetDoc, Dynamic, FieldType, IndexMapping, MappingDiff, Properties};
pub use source::{Source, SourceEntry, SourceRegistry};
pub use sources::gbif::{gbif_mapping, GbifDoc, GBIF_DB, GBIF_INDEX};
pub use sync::{
    content_hash, needs_reprocessing, BatchSyncSummary, ReprocessingDecision, SourceSyncResult,
    SyncOutcome, SyncStats,
};
pub use validate::{validate_document, validate_for_source, Violation};
