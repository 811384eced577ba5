use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use prediction_validator::{
    chat::ChatClient,
    config::{Config, LogFormat},
    cost::{CostLog, CostTracker},
    search::SearchClient,
    storage::{PgStorage, PostSource},
    validation::ValidatorPipeline,
    worker::Supervisor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging; the handle silences output on shutdown
    let filter_handle = init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = config.workers.count,
        "Prediction validator starting..."
    );

    // Initialize storage
    let storage = match PgStorage::connect(&config.database, config.validation.clone()).await {
        Ok(s) => {
            info!(
                max_connections = config.database.max_connections,
                "Database initialized"
            );
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize cost tracking, reloading history from the cost log
    let tracker = CostTracker::init(CostLog::new(&config.cost_log)).await;
    let startup = tracker.snapshot().await;
    info!(
        path = %config.cost_log.path.display(),
        historical_validations = startup.historical.validated,
        historical_cost_usd = format!("{:.2}", startup.historical.total_cost_usd()),
        "Cost tracker initialized"
    );

    // Initialize adapters (shared process-wide, stateless)
    let chat = match ChatClient::new(&config.chat) {
        Ok(c) => {
            info!(base_url = %config.chat.base_url, "Chat client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize chat client");
            return Err(e.into());
        }
    };

    let search = match SearchClient::new(&config.search) {
        Ok(c) => {
            info!(base_url = %config.search.base_url, "Search client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize search client");
            return Err(e.into());
        }
    };

    let pipeline = ValidatorPipeline::new(
        chat,
        search,
        config.chat.enhancer_model.clone(),
        config.chat.judge_model.clone(),
        config.validation.clone(),
    );

    let storage = Arc::new(storage);
    let posts: Arc<dyn PostSource> = storage.clone();

    let supervisor = Supervisor::new(
        storage,
        posts,
        pipeline,
        tracker,
        config.workers.clone(),
    )
    .on_shutdown(move || {
        // Shutdown display mode: stop further log output
        let _ = filter_handle.reload(EnvFilter::new("off"));
    });

    supervisor.run().await?;

    Ok(())
}

/// Initialize tracing/logging, returning the reload handle for the
/// shutdown path.
fn init_logging(config: &Config) -> reload::Handle<EnvFilter, Registry> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    handle
}
