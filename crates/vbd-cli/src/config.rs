use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vbd_core::Source;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "vbd")]
#[command(
    author,
    version,
    about = "Dataset indexes for the Vector-Borne Diseases Hub"
)]
#[command(after_help = "Examples:
  vbd init
  vbd sync --prune
  vbd search \"aedes albopictus\" --license CC_BY_4_0
  vbd mapping gbif
  vbd validate datasets.jsonl
  vbd stats")]
pub struct Config {
    /// Base URL of the Elasticsearch-compatible search engine
    #[arg(long, env = "SEARCH_URL", default_value = "http://localhost:9200")]
    pub search_url: String,

    /// Base URL of the GBIF API
    #[arg(long, env = "GBIF_API_URL", default_value = "https://api.gbif.org")]
    pub gbif_url: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create missing indexes and extend outdated mappings
    Init,
    /// Pull datasets from upstream sources into their indexes
    #[command(after_help = "Examples:
  vbd sync                           # Sync all enabled sources from config
  vbd sync --source gbif             # Sync a single source
  vbd sync --config ~/custom.toml    # Use custom config file
  vbd sync --prune                   # Also delete documents gone upstream")]
    Sync {
        /// Sync a single source by name
        #[arg(short, long, value_name = "NAME")]
        source: Option<Source>,

        /// Custom path to sources.toml configuration file
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Delete indexed documents that the source no longer returns
        #[arg(long)]
        prune: bool,

        /// Sources synced in parallel
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },
    /// Print the index mapping of a source
    Mapping {
        /// Source name
        source: Source,
    },
    /// Full-text search across the dataset indexes
    #[command(after_help = "Example: vbd search \"tick-borne encephalitis\" --from 2015-01-01 --newest")]
    Search {
        /// Search query text (empty matches everything)
        #[arg(default_value = "")]
        query: String,
        /// Restrict to these sources (repeatable)
        #[arg(short, long = "source", value_name = "NAME")]
        sources: Vec<Source>,
        /// Only datasets with this license
        #[arg(long)]
        license: Option<String>,
        /// Only datasets published on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Only datasets published on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Newest first instead of by relevance
        #[arg(long)]
        newest: bool,
        /// Maximum number of results to return
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Number of results to skip
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Check documents in a JSON Lines file against their index mapping
    Validate {
        /// File with one JSON document per line
        file: PathBuf,
        /// Validate every line against this source instead of its `db` field
        #[arg(short, long, value_name = "NAME")]
        source: Option<Source>,
    },
    /// Show document counts per index
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync() {
        let config = Config::try_parse_from(["vbd", "sync", "--source", "gbif", "--prune"]).unwrap();
        match config.command {
            Command::Sync {
                source,
                prune,
                concurrency,
                ..
            } => {
                assert_eq!(source, Some(Source::Gbif));
                assert!(prune);
                assert_eq!(concurrency, 4);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_source_fails() {
        assert!(Config::try_parse_from(["vbd", "mapping", "vectorbase"]).is_err());
    }

    #[test]
    fn test_parse_search_filters() {
        let config = Config::try_parse_from([
            "vbd", "search", "aedes", "--from", "2020-01-01", "--license", "CC0_1_0", "--newest",
        ])
        .unwrap();
        match config.command {
            Command::Search {
                query,
                from,
                license,
                newest,
                sources,
                ..
            } => {
                assert_eq!(query, "aedes");
                assert_eq!(from, NaiveDate::from_ymd_opt(2020, 1, 1));
                assert_eq!(license.as_deref(), Some("CC0_1_0"));
                assert!(newest);
                assert!(sources.is_empty());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
