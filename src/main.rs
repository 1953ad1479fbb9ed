use clap::Parser;
use config::ConfigError;
use oddsfeed::adapters::{HttpOddsFeed, WebDriverClient};
use oddsfeed::api::{create_router, AppState};
use oddsfeed::cli::{Cli, Commands};
use oddsfeed::config::{AppConfig, LoggingConfig, ServeMode};
use oddsfeed::error::{OddsError, Result};
use oddsfeed::scraper::{MarketPageSource, RetryPolicy};
use oddsfeed::services::{
    probe_event, ArbitrageEvaluator, ExtractionLauncher, IdleReaper, LockedBet, LoopContext,
    Metrics, OddsStore, QueryMode, QueryService,
};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;

    match cli.command {
        None => {
            let _guard = init_logging(&config.logging);
            run_server(config).await?;
        }
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.server.mode = ServeMode::Multi;
            let _guard = init_logging(&config.logging);
            run_server(config).await?;
        }
        Some(Commands::Watch { event, port }) => {
            if let Some(port) = port {
                config.server.port = port;
            }
            config.server.mode = ServeMode::Single;
            config.server.event = Some(event);
            let _guard = init_logging(&config.logging);
            run_server(config).await?;
        }
        Some(Commands::Arb {
            event,
            side,
            odds,
            stake,
            endpoint,
            interval,
        }) => {
            let arb = &mut config.arbitrage;
            if event.is_some() {
                arb.event = event;
            }
            if let Some(side) = side {
                arb.locked_side = side;
            }
            if let Some(odds) = odds {
                arb.locked_odds = odds;
            }
            if let Some(stake) = stake {
                arb.stake = stake;
            }
            if let Some(endpoint) = endpoint {
                arb.endpoint = endpoint;
            }
            if let Some(interval) = interval {
                arb.check_interval_secs = interval;
            }
            let _guard = init_logging(&config.logging);
            run_arbitrage(&config).await?;
        }
        Some(Commands::Probe { event }) => {
            init_logging_simple();
            run_probe(&config, &event).await?;
        }
    }

    Ok(())
}

fn validate(app: &AppConfig) -> Result<()> {
    app.validate().map_err(|errors| {
        OddsError::Config(ConfigError::Message(format!(
            "invalid configuration: {}",
            errors.join("; ")
        )))
    })
}

fn build_context(
    config: &AppConfig,
    store: Arc<OddsStore>,
    metrics: Arc<Metrics>,
) -> Result<LoopContext> {
    let retry = RetryPolicy::from_config(&config.extraction.retry);
    let source = MarketPageSource::new(&config.scraper, retry, Arc::clone(&metrics));
    let sessions = WebDriverClient::from_config(&config.scraper)?;

    Ok(LoopContext {
        store,
        source: Arc::new(source),
        sessions: Arc::new(sessions),
        metrics,
        scraper: config.scraper.clone(),
        poll_interval: config.extraction.poll_interval(),
    })
}

async fn run_server(config: AppConfig) -> Result<()> {
    validate(&config)?;

    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(OddsStore::new(config.registry.history_capacity));
    let ctx = build_context(&config, Arc::clone(&store), Arc::clone(&metrics))?;
    let launcher = Arc::new(ExtractionLauncher::new(ctx));

    let mode = match config.server.mode {
        ServeMode::Multi => QueryMode::Multi,
        ServeMode::Single => QueryMode::Single {
            event_id: config.server.event.clone().unwrap_or_default(),
        },
    };
    info!("Starting odds feed in {:?} mode", config.server.mode);

    let query = Arc::new(QueryService::new(
        Arc::clone(&store),
        launcher,
        Arc::clone(&metrics),
        mode,
    ));
    query.start_fixed_event().await;

    if let Some(reaper) =
        IdleReaper::from_config(&config.registry, Arc::clone(&store), Arc::clone(&metrics))
    {
        tokio::spawn(reaper.run(store.shutdown_token()));
    }

    let status_metrics = Arc::clone(&metrics);
    let status_shutdown = store.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = status_shutdown.cancelled() => break,
                _ = ticker.tick() => status_metrics.log_status(),
            }
        }
    });

    let app = create_router(AppState::new(query, metrics));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Odds API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, cancelling extraction loops");
    store.cancel_all();

    // Loops close their browser sessions on the way out
    let drain = async {
        while store.counts().await.1 > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        warn!("Some extraction loops did not stop within 5s");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn run_arbitrage(config: &AppConfig) -> Result<()> {
    config.validate_arbitrage().map_err(|errors| {
        OddsError::Config(ConfigError::Message(format!(
            "invalid arbitrage configuration: {}",
            errors.join("; ")
        )))
    })?;

    let arb = &config.arbitrage;

    let feed = HttpOddsFeed::new(&arb.endpoint, arb.event.as_deref())?;
    info!("Polling {} every {}s", feed.url(), arb.check_interval_secs);

    let bet = LockedBet {
        side: arb.locked_side,
        odds: arb.locked_odds,
        stake: arb.stake,
    };
    let evaluator = ArbitrageEvaluator::new(
        Arc::new(feed),
        bet,
        Duration::from_secs(arb.check_interval_secs.max(1)),
    );

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        stopper.cancel();
    });

    match evaluator.run(cancel).await? {
        Some(opportunity) => {
            println!("{}", serde_json::to_string_pretty(&opportunity)?);
        }
        None => info!("Stopped before an arbitrage appeared"),
    }
    Ok(())
}

async fn run_probe(config: &AppConfig, event_id: &str) -> Result<()> {
    validate(config)?;

    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(OddsStore::new(1));
    let ctx = build_context(config, store, metrics)?;

    let record = probe_event(&ctx, event_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    if let Some(margin) = record.margin() {
        println!("Bookmaker margin: {}%", margin);
    }
    Ok(())
}

/// Console logging plus an optional daily rolling file.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", config.level)));

    let (file_layer, guard) = match config.directory.as_deref() {
        Some(dir) => match open_log_file(Path::new(dir)) {
            Ok(file_appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true);
                (Some(layer), Some(guard))
            }
            Err(reason) => {
                eprintln!(
                    "Warning: Log directory {} is not writable ({}), file logging disabled",
                    dir, reason
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}

/// Daily rolling appender under `dir`, or the reason it cannot be used.
///
/// `rolling::daily` panics when the first file cannot be created, which
/// aborts under the release profile, so writability is checked up front.
fn open_log_file(dir: &Path) -> std::result::Result<RollingFileAppender, String> {
    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;

    let test_path = dir.join(".oddsfeed_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&test_path)
        .map_err(|e| e.to_string())?;
    let _ = std::fs::remove_file(&test_path);

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("oddsfeed.log")
        .build(dir)
        .map_err(|e| e.to_string())
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
