use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_cleaner::{
    config::Config,
    observability::AppObservability,
    services::{
        EngineContext, GqlTokenIssuer, Interceptor, StreamCleaner, TokenCache, TokenRelay,
    },
    utils::{HttpManifestFetcher, ManifestFetcher, build_client},
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "stream-cleaner")]
#[command(version)]
#[command(about = "HLS manifest ad-stripping proxy with alternate-source probing")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite a manifest file once and print the result
    Rewrite {
        /// Manifest file
        file: PathBuf,

        /// Upstream URL the manifest came from; enables alternate-source probing
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("stream_cleaner={},tower_http=trace", cli.log_level)
    } else {
        format!("stream_cleaner={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let observability = AppObservability::new("stream-cleaner")?;

    let client = build_client(config.web.upstream_timeout)?;
    let issuer = Arc::new(GqlTokenIssuer::new(
        client.clone(),
        config.token_endpoint.clone(),
    ));
    let tokens = TokenCache::new(issuer, &config.token_cache);
    let fetcher: Arc<dyn ManifestFetcher> = Arc::new(HttpManifestFetcher::new(client.clone()));
    let context = Arc::new(EngineContext::in_memory());
    context.load().await?;

    let result = match cli.command {
        Some(Command::Rewrite { file, url }) => {
            rewrite_once(&config, file, url, tokens, fetcher, context).await
        }
        None => {
            info!("Starting stream-cleaner v{}", env!("CARGO_PKG_VERSION"));
            let engine = StreamCleaner::from_config(&config, tokens.clone(), fetcher.clone(), context);
            let relay = TokenRelay::new(tokens, client, config.token_endpoint.clone());
            let state = AppState {
                config: Arc::new(config),
                interceptor: Interceptor::new(Arc::new(engine)),
                fetcher,
                relay,
                start_time: chrono::Utc::now(),
            };
            WebServer::new(state)?.serve().await
        }
    };

    observability.shutdown();
    result
}

async fn rewrite_once(
    config: &Config,
    file: PathBuf,
    url: Option<String>,
    tokens: TokenCache,
    fetcher: Arc<dyn ManifestFetcher>,
    context: Arc<EngineContext>,
) -> Result<()> {
    let text = tokio::fs::read_to_string(&file).await?;

    let mut config = config.clone();
    // Without an upstream URL there is nothing to probe against
    config.prober.enabled &= url.is_some();

    let engine = StreamCleaner::from_config(&config, tokens, fetcher, context);
    let processed = engine.process(&text, url.as_deref()).await;

    info!(
        "{}: {} segments removed, {} kept, source {:?}",
        file.display(),
        processed.outcome.segments_removed,
        processed.outcome.segments_kept,
        processed.source
    );
    print!("{}", processed.body);
    Ok(())
}
