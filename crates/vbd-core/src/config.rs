//! Configuration types for VBD Hub components.
//!
//! Runtime knobs (`HttpConfig`, `SyncConfig`) carry defaults. Which sources
//! to sync, and with which upstream filters, comes from a TOML file:
//!
//! ```toml
//! [[sources]]
//! name = "gbif"
//! enabled = true
//! query = "vector borne disease"
//! dataset_types = ["OCCURRENCE"]
//! page_size = 100
//! max_records = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AppError;
use crate::source::Source;

/// Default free-text filter for the built-in GBIF entry.
pub const DEFAULT_GBIF_QUERY: &str = "vector borne disease";

/// HTTP client configuration for external API calls.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Synchronization configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sources synced in parallel.
    pub concurrency: usize,
    /// Upstream page size when a source entry sets none.
    pub page_size: u32,
    /// Documents per bulk delete request when pruning.
    pub delete_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            page_size: 100,
            delete_batch_size: 500,
        }
    }
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceSettings {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Upstream free-text filter.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub dataset_types: Vec<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Stop after this many upstream records.
    #[serde(default)]
    pub max_records: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl SourceSettings {
    /// Registry source this entry configures. Validated at load time.
    pub fn source(&self) -> Result<Source, AppError> {
        self.name.parse()
    }
}

/// Contents of `sources.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            sources: vec![SourceSettings {
                name: Source::Gbif.name().to_string(),
                enabled: true,
                query: Some(DEFAULT_GBIF_QUERY.to_string()),
                keywords: Vec::new(),
                dataset_types: Vec::new(),
                page_size: None,
                max_records: None,
            }],
        }
    }
}

impl SourcesConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        let config: SourcesConfig =
            toml::from_str(content).map_err(|e| AppError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        let mut seen = Vec::new();
        for entry in &self.sources {
            let source = Source::from_name(&entry.name).ok_or_else(|| {
                AppError::ConfigError(format!("unknown source '{}'", entry.name))
            })?;
            if seen.contains(&source) {
                return Err(AppError::ConfigError(format!(
                    "source '{}' is configured twice",
                    entry.name
                )));
            }
            if entry.page_size == Some(0) {
                return Err(AppError::ConfigError(format!(
                    "source '{}': page_size must be positive",
                    entry.name
                )));
            }
            seen.push(source);
        }
        Ok(())
    }

    /// Enabled entries, in file order.
    pub fn enabled(&self) -> impl Iterator<Item = &SourceSettings> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn find(&self, name: &str) -> Option<&SourceSettings> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// `~/.config/vbd-hub/sources.toml` (platform config dir).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vbd-hub").join("sources.toml"))
}

/// Loads the sources file.
///
/// An explicit `path` must exist. Without one, the default location is tried
/// and the built-in configuration is used when it is absent.
pub fn load_sources_config(path: Option<&Path>) -> Result<SourcesConfig, AppError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => {
                debug!("No config directory on this platform, using built-in sources");
                return Ok(SourcesConfig::default());
            }
        },
    };

    if !path.exists() {
        if explicit {
            return Err(AppError::ConfigError(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        debug!("{} not found, using built-in sources", path.display());
        return Ok(SourcesConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| AppError::ConfigError(format!("{}: {}", path.display(), e)))?;
    let config = SourcesConfig::from_toml(&content)?;
    info!(
        "Loaded {} source(s) from {}",
        config.sources.len(),
        path.display()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.page_size, 100);
    }

    #[test]
    fn test_default_sources() {
        let config = SourcesConfig::default();
        let enabled: Vec<_> = config.enabled().collect();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].source().unwrap(), Source::Gbif);
        assert_eq!(enabled[0].query.as_deref(), Some(DEFAULT_GBIF_QUERY));
    }

    #[test]
    fn test_parse_toml() {
        let config = SourcesConfig::from_toml(
            r#"
            [[sources]]
            name = "gbif"
            query = "aedes"
            keywords = ["mosquito", "dengue"]
            dataset_types = ["OCCURRENCE"]
            page_size = 50
            max_records = 1000
            "#,
        )
        .unwrap();

        let gbif = config.find("gbif").unwrap();
        assert!(gbif.enabled);
        assert_eq!(gbif.keywords, vec!["mosquito", "dengue"]);
        assert_eq!(gbif.page_size, Some(50));
        assert_eq!(gbif.max_records, Some(1000));
    }

    #[test]
    fn test_disabled_source_skipped() {
        let config = SourcesConfig::from_toml(
            r#"
            [[sources]]
            name = "gbif"
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.enabled().count(), 0);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let err = SourcesConfig::from_toml(
            r#"
            [[sources]]
            name = "vectorbase"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown source 'vectorbase'"));
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let err = SourcesConfig::from_toml(
            r#"
            [[sources]]
            name = "gbif"

            [[sources]]
            name = "gbif"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let result = SourcesConfig::from_toml(
            r#"
            [[sources]]
            name = "gbif"
            page_size = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[sources]]\nname = \"gbif\"\nquery = \"ticks\"").unwrap();

        let config = load_sources_config(Some(file.path())).unwrap();
        assert_eq!(config.find("gbif").unwrap().query.as_deref(), Some("ticks"));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_sources_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_default_config_path_suffix() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("vbd-hub/sources.toml"));
        }
    }
}
