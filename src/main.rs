use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use lunchbox::config::{AppConfig, LoggingConfig, MetricsConfig};
use lunchbox::models::{LunchOffer, ProviderId, catalog_from_config};
use lunchbox::ocr::OcrClient;
use lunchbox::plugins::ResolverRegistry;
use lunchbox::repository::{LunchOfferRepository, SqliteOfferRepository};
use lunchbox::scheduler::OfferUpdateScheduler;
use lunchbox::web_scraper::WebScraper;
use lunchbox::{OfferUpdate, OfferUpdateWorker};

#[derive(Parser, Debug)]
#[command(name = "lunchbox", version, about = "Keeps daily lunch offers of many providers fresh")]
struct Cli {
    /// Additional configuration file layered over config/default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduled offer updates until Ctrl-C (default)
    Serve,
    /// Run a single update cycle, wait for every provider and print the report
    Refresh,
    /// Print stored offers as JSON
    Offers {
        /// Only offers of this day (YYYY-MM-DD)
        #[arg(long)]
        day: Option<NaiveDate>,
        /// Only offers of this provider
        #[arg(long)]
        provider: Option<String>,
        /// A single offer by id
        #[arg(long, conflicts_with_all = ["day", "provider"])]
        id: Option<i64>,
    },
    /// Print the provider catalog and whether a resolver is bound
    Providers,
}

struct App {
    config: AppConfig,
    repo: Arc<SqliteOfferRepository>,
    resolvers: Arc<ResolverRegistry>,
    update: Arc<OfferUpdate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed loading configuration")?;
    let _log_guard = init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    let app = build_app(config).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(app).await,
        Commands::Refresh => refresh(app).await,
        Commands::Offers { day, provider, id } => print_offers(&app, day, provider, id).await,
        Commands::Providers => print_providers(&app),
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.filter))?;

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "lunchbox.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn init_metrics(metrics: &MetricsConfig) -> Result<()> {
    if !metrics.enabled {
        return Ok(());
    }

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], metrics.port))
        .install()
        .context("failed installing Prometheus exporter")?;
    info!(port = metrics.port, "Prometheus exporter listening");
    Ok(())
}

async fn build_app(config: AppConfig) -> Result<App> {
    let timezone = config.scheduler.tz()?;

    let repo = Arc::new(SqliteOfferRepository::connect(&config.database).await?);
    let scraper = WebScraper::new(&config.scraper)?;
    let ocr = Arc::new(OcrClient::new(config.ocr.clone())?);
    let resolvers = Arc::new(ResolverRegistry::from_providers(
        &config.providers,
        &scraper,
        ocr,
        timezone,
    )?);

    let worker = Arc::new(OfferUpdateWorker::new(
        repo.clone(),
        Arc::clone(&resolvers),
        config.scheduler.resolve_timeout(),
    ));
    let providers = catalog_from_config(&config.providers);
    let update = Arc::new(OfferUpdate::new(repo.clone(), worker, providers, timezone));

    Ok(App {
        config,
        repo,
        resolvers,
        update,
    })
}

async fn serve(app: App) -> Result<()> {
    info!("Starting Lunchbox...");

    let mut scheduler = OfferUpdateScheduler::new(Arc::clone(&app.update), app.config.scheduler.clone()).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    scheduler.shutdown().await?;
    app.repo.pool().close().await;
    Ok(())
}

async fn refresh(app: App) -> Result<()> {
    let report = app.update.update_offers().await.wait().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    app.repo.pool().close().await;
    Ok(())
}

async fn print_offers(app: &App, day: Option<NaiveDate>, provider: Option<String>, id: Option<i64>) -> Result<()> {
    let offers: Vec<LunchOffer> = match (id, day) {
        (Some(id), _) => app.repo.find_by_id(id).await?.into_iter().collect(),
        (None, Some(day)) => app.repo.find_by_day(day).await?,
        (None, None) => app.repo.find_all().await?,
    };

    let provider = provider.map(ProviderId::from);
    let offers: Vec<_> = offers
        .into_iter()
        .filter(|offer| provider.as_ref().is_none_or(|p| &offer.provider == p))
        .collect();

    println!("{}", serde_json::to_string_pretty(&offers)?);
    Ok(())
}

fn print_providers(app: &App) -> Result<()> {
    for provider in app.update.providers() {
        let resolver = if app.resolvers.has_resolver(&provider.id) {
            "bound"
        } else {
            "missing"
        };
        println!(
            "{:<20} {:<30} {:<20} active={:<5} resolver={}",
            provider.id.as_str(),
            provider.label,
            provider.location,
            provider.active,
            resolver
        );
    }
    Ok(())
}
