use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use reestr_core::Category;
use reestr_db::PgStore;
use reestr_harvest::{
    replay_failed, ChromeSessionFactory, CrawlSettings, Crawler, DetailFetcher, Direction,
    ImageBackfill,
};

#[derive(Debug, Parser)]
#[command(name = "reestr-cli")]
#[command(about = "Registry harvester command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDirection {
    Forward,
    Backward,
}

impl From<CliDirection> for Direction {
    fn from(d: CliDirection) -> Direction {
        match d {
            CliDirection::Forward => Direction::Forward,
            CliDirection::Backward => Direction::Backward,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl one category to completion.
    Crawl {
        /// Category token, e.g. Trademark or Invention.
        category: String,
        #[arg(long, value_enum, default_value = "forward")]
        direction: CliDirection,
        /// Sweep from both ends at once (overrides --direction).
        #[arg(long)]
        both: bool,
    },
    /// Crawl every category in crawl order.
    CrawlAll {
        #[arg(long, value_enum, default_value = "forward")]
        direction: CliDirection,
        /// Sweep each category from both ends at once.
        #[arg(long)]
        both: bool,
    },
    /// Re-fetch every unparsed failure ledger entry.
    ReplayFailed,
    /// Attach imagery to records persisted without it.
    Images {
        /// Restrict to one category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Run pending database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(reestr_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let pool_config = reestr_db::PoolConfig::from_app_config(&config);
    let pool = reestr_db::connect_pool(&config.database_url, pool_config).await?;

    if matches!(cli.command, Commands::Migrate) {
        reestr_db::run_migrations(&pool).await?;
        println!("migrations applied");
        return Ok(());
    }
    reestr_db::run_migrations(&pool).await?;

    let store = PgStore::new(pool);
    let factory = ChromeSessionFactory::new(config.headless, &config.detail_user_agent);
    let detail = DetailFetcher::new(
        store.clone(),
        &config.detail_user_agent,
        Duration::from_secs(config.detail_timeout_secs),
        config.retry_max_attempts,
        Duration::from_secs(config.retry_delay_secs),
    )?;

    match cli.command {
        Commands::Crawl {
            category,
            direction,
            both,
        } => {
            let category = Category::parse(&category)?;
            tracing::info!(%category, both, "starting crawl");
            let crawler = Crawler::new(
                factory.clone(),
                store,
                detail,
                CrawlSettings::from_app_config(&config),
            );
            let stats = if both {
                crawler.run_category_both(category).await?
            } else {
                crawler.run_category_from(category, direction.into()).await?
            };
            println!(
                "{category}: {} pages, {} cards, {} inserted, {} existing, {} rejected",
                stats.pages, stats.cards, stats.inserted, stats.skipped_existing, stats.rejected
            );
        }
        Commands::CrawlAll { direction, both } => {
            tracing::info!(both, "starting crawl of all categories");
            let crawler = Crawler::new(
                factory.clone(),
                store,
                detail,
                CrawlSettings::from_app_config(&config),
            );
            let stats = if both {
                crawler.run_all_categories_both().await
            } else {
                crawler.run_all_categories(direction.into()).await
            };
            println!(
                "all categories: {} pages, {} cards, {} inserted, {} existing, {} rejected",
                stats.pages, stats.cards, stats.inserted, stats.skipped_existing, stats.rejected
            );
        }
        Commands::ReplayFailed => {
            let stats = replay_failed(&detail, &store, &config.registry_base_url).await?;
            println!(
                "replayed {} entries: {} recovered, {} already persisted, {} still failing",
                stats.attempted, stats.recovered, stats.already_persisted, stats.still_failing
            );
        }
        Commands::Images { category } => {
            let backfill = ImageBackfill::new(factory.clone(), store, &config)?;
            let stats = match category {
                Some(name) => backfill.run_category(Category::parse(&name)?).await?,
                None => backfill.run().await?,
            };
            println!(
                "images: {} attempted, {} attached, {} failed",
                stats.attempted, stats.attached, stats.failed
            );
        }
        Commands::Migrate => unreachable!("handled above"),
    }

    factory.shutdown().await;
    Ok(())
}
