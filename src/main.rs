use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use insightvault::feeds::NewSource;
use insightvault::{
    Config, Database, FeedUpdater, FetcherFactory, IngestionService, ItemRepository, Result,
    SourceRepository, VaultError,
};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let config = if Path::new(&cli.config).exists() {
        match Config::load_with_env(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {e}", cli.config);
                return ExitCode::FAILURE;
            }
        }
    } else {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    // Initialize logging
    if let Err(e) = insightvault::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        insightvault::logging::init_console_only(&config.logging.level);
    }

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    let db = Arc::new(Database::open(&config.database.path).await?);
    let factory = Arc::new(FetcherFactory::new(&config.fetch)?);

    match command {
        Command::AddSource {
            name,
            slug,
            endpoint,
            api_type,
            interval,
        } => {
            let mut new_source = NewSource::new(name, slug, endpoint).with_api_type(api_type);
            if let Some(secs) = interval {
                new_source = new_source.with_fetch_interval(secs);
            }
            let source = SourceRepository::new(db.pool()).create(&new_source).await?;
            info!("Registered source {} ({})", source.slug, source.api_type);
            println!("Added source {} (id {})", source.slug, source.id);
        }

        Command::ListSources => {
            for source in SourceRepository::new(db.pool()).list_all().await? {
                let last = source
                    .last_fetched
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<20} {:<8} {:<8} {:<26} {}",
                    source.slug,
                    source.api_type,
                    if source.enabled { "enabled" } else { "disabled" },
                    last,
                    source.endpoint
                );
            }
        }

        Command::Refresh { slug } => {
            let service = IngestionService::new(
                SourceRepository::new(db.pool()),
                ItemRepository::new(db.pool()),
                factory,
                config.ingest.clone(),
            );
            match slug {
                Some(slug) => {
                    let created = service.refresh_source(&slug).await?;
                    println!("{slug}: {created} new item(s)");
                }
                None => {
                    let report = service.refresh_all().await?;
                    println!(
                        "{} new item(s) from {} source(s)",
                        report.new_items, report.succeeded
                    );
                    for failure in &report.failures {
                        println!("  {} failed: {}", failure.slug, failure.error);
                    }
                }
            }
        }

        Command::Items { source, limit } => {
            let source_id = match source {
                Some(slug) => Some(
                    SourceRepository::new(db.pool())
                        .get_by_slug(&slug)
                        .await?
                        .ok_or_else(|| VaultError::NotFound(format!("source {slug}")))?
                        .id,
                ),
                None => None,
            };
            for item in ItemRepository::new(db.pool())
                .list_active(source_id, limit)
                .await?
            {
                let published = item
                    .published_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{published:<16} {}  {}", item.title, item.url);
                if let Some(video) = &item.video_url {
                    println!("{:<16} video: {video}", "");
                }
            }
        }

        Command::Watch => {
            let updater = FeedUpdater::new(Arc::clone(&db), factory, config.ingest.clone());
            tokio::select! {
                _ = updater.run() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutting down feed updater");
                }
            }
        }
    }

    db.close().await;
    Ok(())
}
