//! Registry of known upstream sources and their indexes.
//!
//! The set of sources is closed: every source has a [`Source`] variant, one
//! index name and one mapping. The registry is built once at startup and
//! only read afterwards.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::schema::{shared_properties, shared_required_fields, FieldSpec, IndexMapping};
use crate::sources::gbif::{self, GBIF_DB, GBIF_INDEX};

/// An upstream data source with its own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Gbif,
}

impl Source {
    /// Every known source, in registry order.
    pub const ALL: &'static [Source] = &[Source::Gbif];

    /// Registered name, also the `db` discriminant of its documents.
    pub fn name(self) -> &'static str {
        match self {
            Source::Gbif => GBIF_DB,
        }
    }

    pub fn index_name(self) -> &'static str {
        match self {
            Source::Gbif => GBIF_INDEX,
        }
    }

    /// Fields this source declares on top of the shared schema.
    pub fn own_fields(self) -> &'static [FieldSpec] {
        match self {
            Source::Gbif => gbif::GBIF_FIELDS,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }

    fn ordinal(self) -> usize {
        match self {
            Source::Gbif => 0,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| AppError::UnknownSource(s.to_string()))
    }
}

/// Everything the pipeline and query path need to know about one source.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub source: Source,
    pub index_name: &'static str,
    pub mapping: IndexMapping,
    pub required_fields: Vec<&'static str>,
}

/// Read-only lookup from source to index name and mapping.
///
/// # Examples
///
/// ```
/// use vbd_core::{Source, SourceRegistry};
///
/// let registry = SourceRegistry::new().unwrap();
/// assert_eq!(registry.entry(Source::Gbif).index_name, "gbif");
/// assert!(registry.by_index("gbif").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    // Stored in `Source::ALL` order, indexed by `Source::ordinal`.
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    /// Builds every source's mapping from the shared properties.
    ///
    /// Fails if a source redeclares a shared field or two sources claim the
    /// same index name.
    pub fn new() -> Result<Self, AppError> {
        let shared = shared_properties()?;
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(Source::ALL.len());

        for &source in Source::ALL {
            if !seen.insert(source.index_name()) {
                return Err(AppError::DuplicateIndexName(
                    source.index_name().to_string(),
                ));
            }

            let mapping = IndexMapping::try_merge(&shared, source.own_fields())?;
            let required_fields = shared_required_fields()
                .chain(
                    source
                        .own_fields()
                        .iter()
                        .filter(|f| f.required)
                        .map(|f| f.name),
                )
                .collect();

            entries.push(SourceEntry {
                source,
                index_name: source.index_name(),
                mapping,
                required_fields,
            });
        }

        Ok(Self { entries })
    }

    pub fn entry(&self, source: Source) -> &SourceEntry {
        &self.entries[source.ordinal()]
    }

    pub fn by_index(&self, index_name: &str) -> Option<&SourceEntry> {
        self.entries.iter().find(|e| e.index_name == index_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceEntry> {
        self.entries.iter()
    }

    pub fn index_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.index_name).collect()
    }
}
