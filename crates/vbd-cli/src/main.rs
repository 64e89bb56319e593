use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use vbd_cli::{check_lines, Command, Config, Syncer};
use vbd_client::{GbifClient, IndexStatus, SearchClient};
use vbd_core::{
    load_sources_config, AnyDatasetDoc, SearchRequest, SortOrder, Source, SourceRegistry,
    SourcesConfig, SyncConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Parse command line arguments
    let config = Config::parse();

    // Setup logging (stderr to keep stdout clean for mapping output)
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    let registry = SourceRegistry::new().context("Invalid source registry")?;

    match config.command {
        Command::Init => {
            let search = search_client(&config.search_url)?;
            init(&search, &registry).await?;
        }
        Command::Sync {
            source,
            config: config_path,
            prune,
            concurrency,
        } => {
            let search = search_client(&config.search_url)?;
            let gbif = GbifClient::new(&config.gbif_url).context("Invalid GBIF API URL")?;
            let sync_config = SyncConfig {
                concurrency,
                ..SyncConfig::default()
            };
            let syncer = Syncer::new(search, gbif, registry, sync_config);
            sync(&syncer, source, config_path.as_deref(), prune).await?;
        }
        Command::Mapping { source } => {
            let entry = registry.entry(source);
            println!("{}", serde_json::to_string_pretty(&entry.mapping)?);
        }
        Command::Search {
            query,
            sources,
            license,
            from,
            to,
            newest,
            limit,
            offset,
        } => {
            let search = search_client(&config.search_url)?;
            let request = SearchRequest {
                text: query,
                sources,
                license,
                from_date: from,
                to_date: to,
                sort: if newest {
                    SortOrder::Newest
                } else {
                    SortOrder::Relevance
                },
                limit,
                offset,
            };
            run_search(&search, &request).await?;
        }
        Command::Validate { file, source } => {
            validate_file(&registry, &file, source)?;
        }
        Command::Stats => {
            let search = search_client(&config.search_url)?;
            show_stats(&search, &registry).await?;
        }
    }

    Ok(())
}

fn search_client(url: &str) -> anyhow::Result<SearchClient> {
    SearchClient::new(url).context("Invalid search engine URL")
}

/// Create or extend every registered index
async fn init(search: &SearchClient, registry: &SourceRegistry) -> anyhow::Result<()> {
    for entry in registry.iter() {
        let status = search
            .ensure_index(entry)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))
            .with_context(|| format!("Failed to prepare index '{}'", entry.index_name))?;

        match status {
            IndexStatus::Created => println!("  {:<12} created", entry.index_name),
            IndexStatus::UpToDate => println!("  {:<12} up to date", entry.index_name),
            IndexStatus::Extended(fields) => println!(
                "  {:<12} extended with {}",
                entry.index_name,
                fields.join(", ")
            ),
        }
    }
    Ok(())
}

/// Sync configured sources into their indexes
async fn sync(
    syncer: &Syncer,
    only: Option<Source>,
    config_path: Option<&Path>,
    prune: bool,
) -> anyhow::Result<()> {
    let mut sources = load_sources_config(config_path).context("Failed to load sources config")?;

    if let Some(source) = only {
        // A source missing from the file falls back to its built-in settings.
        let settings = sources
            .find(source.name())
            .cloned()
            .or_else(|| SourcesConfig::default().find(source.name()).cloned())
            .with_context(|| format!("Source '{}' has no settings", source))?;
        sources = SourcesConfig {
            sources: vec![settings],
        };
        sources.sources[0].enabled = true;
    }

    let summary = syncer.sync_all(&sources, prune).await;

    for result in &summary.results {
        match &result.error {
            None => info!(
                "{}: {} processed, {} written, {} deleted",
                result.source,
                result.stats.total(),
                result.stats.written(),
                result.stats.deleted
            ),
            Some(e) => error!("{}: failed: {}", result.source, e),
        }
    }
    info!(
        "Sync complete: {} of {} source(s) successful, {} document(s) processed",
        summary.successful_count(),
        summary.total_sources(),
        summary.total_documents()
    );

    if summary.failed_count() > 0 {
        anyhow::bail!(
            "{} of {} source(s) failed",
            summary.failed_count(),
            summary.total_sources()
        );
    }
    Ok(())
}

/// Search across the dataset indexes
async fn run_search(search: &SearchClient, request: &SearchRequest) -> anyhow::Result<()> {
    info!(
        "Searching for: '{}' (limit: {})",
        request.text, request.limit
    );

    let results = search
        .search(request)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if results.hits.is_empty() {
        println!("\n🔍 No results found for: \"{}\"\n", request.text);
        return Ok(());
    }

    println!(
        "\n🔍 {} of {} matching datasets:\n",
        results.hits.len(),
        results.total
    );

    for (i, hit) in results.hits.iter().enumerate() {
        let title = hit.doc.title().unwrap_or("(untitled)");
        println!("{}. {} [{}]", request.offset + i + 1, title, hit.index);

        match &hit.doc {
            AnyDatasetDoc::Gbif(doc) => {
                println!("   🔗 {}", doc.base.db_url);
                if let Some(license) = &doc.license {
                    println!("   ⚖️  {}", license);
                }
                if let Some(date) = doc.base.pub_date {
                    println!("   📅 {}", date);
                }
                if let Some(desc) = &doc.base.description {
                    println!("   📝 {}", truncate_text(desc, 120));
                }
            }
            AnyDatasetDoc::Unknown(_) => {
                println!("   ❓ unrecognised document {}", hit.doc.id().unwrap_or("?"));
            }
        }
        println!();
    }

    if !results.licenses.is_empty() {
        println!("Licenses:");
        for facet in &results.licenses {
            println!("  {:<24} {}", facet.key, facet.count);
        }
        println!();
    }

    Ok(())
}

/// Truncate text to a maximum number of characters, adding ellipsis if needed
fn truncate_text(text: &str, max_len: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() <= max_len {
        cleaned
    } else {
        let head: String = cleaned.chars().take(max_len).collect();
        format!("{}...", head)
    }
}

/// Check a JSON Lines document file offline
fn validate_file(
    registry: &SourceRegistry,
    file: &Path,
    source: Option<Source>,
) -> anyhow::Result<()> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );
    let summary = check_lines(reader, registry, source)?;

    for report in &summary.invalid {
        println!(
            "line {} ({}):",
            report.line,
            report.id.as_deref().unwrap_or("no id")
        );
        for problem in &report.problems {
            println!("  - {}", problem);
        }
    }
    println!(
        "\n{} document(s) checked, {} valid, {} invalid",
        summary.checked,
        summary.valid(),
        summary.invalid.len()
    );

    if !summary.invalid.is_empty() {
        anyhow::bail!("{} invalid document(s)", summary.invalid.len());
    }
    Ok(())
}

/// Show document counts per index
async fn show_stats(search: &SearchClient, registry: &SourceRegistry) -> anyhow::Result<()> {
    println!("\n📊 Index Statistics\n");

    for entry in registry.iter() {
        let exists = search
            .index_exists(entry.index_name)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;

        if exists {
            let count = search
                .count(entry.index_name)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("  {:<12} {} documents", entry.index_name, count);
        } else {
            println!("  {:<12} (not created, run `vbd init`)", entry.index_name);
        }
    }
    println!();

    Ok(())
}
