mod api;
mod repository;
mod services;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zbi_manager::{ConfigCache, Repository, ResourceManagerFactory};

use api::AppState;
use repository::HttpRepository;
use services::LifecycleService;

#[derive(Parser, Debug)]
#[command(name = "zbi-control")]
#[command(about = "ZBI instance lifecycle control service", long_about = None)]
struct Args {
    /// Bind address for HTTP server
    #[arg(long, env = "ZBI_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Base URL of the repository service
    #[arg(long, env = "ZBI_REPOSITORY_URL", default_value = "http://localhost:8000/api/v1")]
    repository_url: String,

    /// Shared secret sent to the repository
    #[arg(long, env = "ZBI_INTERNAL_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    internal_secret: String,

    /// Blockchain whose node metadata and templates are cached
    #[arg(long, env = "ZBI_BLOCKCHAIN", default_value = "zcash")]
    blockchain: String,

    /// Seconds a cached configuration stays fresh
    #[arg(long, env = "ZBI_CONFIG_TTL_SECS", default_value_t = 300)]
    config_ttl_secs: u64,

    /// Seconds between background refreshes, 0 disables them
    #[arg(long, env = "ZBI_REFRESH_INTERVAL_SECS", default_value_t = 0)]
    refresh_interval_secs: u64,

    /// Log level
    #[arg(long, env = "ZBI_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting ZBI control service");

    if args.internal_secret.is_empty() {
        warn!("No internal client secret configured, repository calls are unauthenticated");
    }

    let repository: Arc<dyn Repository> = Arc::new(
        HttpRepository::new(&args.repository_url, &args.internal_secret)
            .context("Failed to create repository client")?,
    );

    let cache = Arc::new(ConfigCache::new(
        repository.clone(),
        &args.blockchain,
        Duration::from_secs(args.config_ttl_secs),
    ));

    // Warm the cache; the service still starts if the repository is down
    if let Err(e) = cache.refresh().await {
        warn!("Initial configuration load failed, will retry on demand: {}", e);
    }

    if args.refresh_interval_secs > 0 {
        cache
            .clone()
            .spawn_refresh(Duration::from_secs(args.refresh_interval_secs));
    }

    let factory = ResourceManagerFactory::new(cache);
    let state = Arc::new(AppState {
        lifecycle: LifecycleService::new(factory, repository),
    });

    // Create router
    let app = api::create_router(state);

    // Parse bind address
    let addr: SocketAddr = args.bind.parse().context("Invalid bind address")?;
    info!("Listening on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
