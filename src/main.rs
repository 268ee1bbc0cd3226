use clap::{Parser, Subcommand};
use gastat::auth::TokenProvider;
use gastat::cache::CachePolicy;
use gastat::config::AppConfig;
use gastat::server::{self, AppState, ReportParams};
use gastat::{GoogleAnalyticsClient, ReportKind, Reporter, SessionStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

#[derive(Parser)]
#[command(name = "gastat", about = "Cached Google Analytics reports")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "gastat.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one report as JSON
    Report {
        /// visitors, pageviews, time-on-site, visits-per-hour, browsers,
        /// operating-systems, screen-resolutions, referrers, search-words
        kind: String,
        /// Profile id, e.g. ga:12345
        #[arg(long)]
        profile: Option<String>,
        /// Range start (YYYY-MM-DD)
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Range end (YYYY-MM-DD)
        #[arg(long, requires = "start")]
        end: Option<String>,
        #[arg(long, requires = "year", conflicts_with = "start")]
        month: Option<u32>,
        #[arg(long, requires = "month")]
        year: Option<i32>,
        /// Cache results in the session
        #[arg(long)]
        cache: bool,
        /// Cache lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Serve reports over HTTP
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so report JSON on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gastat=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    if let Err(msg) = config.validate() {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    let api = GoogleAnalyticsClient::new(&config.api)?;

    match cli.command {
        Command::Report {
            kind,
            profile,
            start,
            end,
            month,
            year,
            cache,
            ttl,
        } => {
            let params = ReportParams {
                profile_id: profile,
                start_date: start,
                end_date: end,
                month,
                year,
                cache: cache.then_some(true),
                ttl,
            };
            run_report(api, &config, &kind, &params).await
        }
        Command::Serve => serve(api, &config).await,
    }
}

async fn run_report(
    api: GoogleAnalyticsClient,
    config: &AppConfig,
    kind: &str,
    params: &ReportParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind: ReportKind = kind.parse()?;
    let mut reporter = Reporter::connect(
        api,
        TokenProvider::new(&config.service_account),
        SessionStore::new(),
        params.cache_policy(CachePolicy::from(&config.cache)),
    )
    .await?;
    params.apply(&mut reporter, config.report.profile_id.as_deref())?;

    let output = reporter.run(kind).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn serve(
    api: GoogleAnalyticsClient,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        api = %api.base_url(),
        cache_enabled = config.cache.enabled,
        "starting gastat"
    );

    let state = Arc::new(AppState::new(api, config));
    let app = server::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
}
