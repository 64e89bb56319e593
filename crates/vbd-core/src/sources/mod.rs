//! Per-source document shapes and mappings.

pub mod gbif;

pub use gbif::{gbif_mapping, GbifDb, GbifDoc, GBIF_DB, GBIF_INDEX};
