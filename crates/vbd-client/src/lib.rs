//! VBD Hub Client - HTTP clients for external APIs
//!
//! This crate provides HTTP clients for interacting with:
//!
//! - [`gbif`] - the GBIF registry dataset search API
//! - [`index`] - the Elasticsearch-compatible engine holding the dataset indexes
//!
//! Both clients share one retry policy for transient failures.

pub mod gbif;
pub mod index;

mod http;

// Re-export main client types
pub use gbif::{GbifClient, GbifDataset, GbifPage};
pub use index::{BulkItemOutcome, IndexStatus, SearchClient, DEFAULT_SEARCH_URL};
