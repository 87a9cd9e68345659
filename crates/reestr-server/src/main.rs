mod api;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use reestr_db::PgStore;
use reestr_harvest::{ChromeSessionFactory, CrawlSettings, Crawler, DetailFetcher, ImageBackfill};

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(reestr_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = reestr_db::PoolConfig::from_app_config(&config);
    let pool = reestr_db::connect_pool(&config.database_url, pool_config).await?;
    reestr_db::run_migrations(&pool).await?;

    let store = PgStore::new(pool.clone());
    let factory = ChromeSessionFactory::new(config.headless, &config.detail_user_agent);
    let detail = DetailFetcher::new(
        store.clone(),
        &config.detail_user_agent,
        Duration::from_secs(config.detail_timeout_secs),
        config.retry_max_attempts,
        Duration::from_secs(config.retry_delay_secs),
    )?;
    let crawler = Crawler::new(
        factory.clone(),
        store.clone(),
        detail.clone(),
        CrawlSettings::from_app_config(&config),
    );
    let backfill = ImageBackfill::new(factory, store.clone(), &config)?;

    let state = AppState {
        pool,
        crawler,
        detail,
        backfill,
        store,
        base_url: config.registry_base_url.clone(),
    };

    let _scheduler = scheduler::build_scheduler(state.clone()).await?;

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
