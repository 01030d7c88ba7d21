//! # dropwatch-server
//!
//! Runs the drop-number pipeline as one process.
//!
//! This binary provides:
//! - **Event ingestion** from the chat protocol client (`POST /api/events`)
//!   feeding the bridge dispatcher
//! - **Review lifecycle** in the local SQLite store, mirrored into the
//!   project worksheets of a Google spreadsheet
//! - **Outbound send** and **on-demand media download** endpoints
//! - **QA feedback** rounds for reviews flagged incomplete

mod api;
mod config;
mod error;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dropwatch_bridge::feedback::{
    FeedbackGenerator, FeedbackService, HttpFeedbackGenerator, TemplateFeedback,
};
use dropwatch_bridge::transport::TransportFetcher;
use dropwatch_bridge::{spawn_dispatcher, ChatTransport, HttpTransport, PipelineContext};
use dropwatch_media::MediaDownloader;
use dropwatch_shared::PipelineConfig;
use dropwatch_sheets::{GoogleSheets, SheetSynchronizer};
use dropwatch_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,dropwatch_server=debug,dropwatch_bridge=debug")
            }),
        )
        .init();

    info!("Starting dropwatch v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let mut pipeline = match &config.pipeline_config {
        Some(path) => PipelineConfig::load(path)?,
        None => {
            let pipeline = PipelineConfig::default();
            pipeline.validate()?;
            pipeline
        }
    };
    if let Some(secs) = config.remote_timeout_secs {
        pipeline.remote_timeout_secs = secs;
    }
    let pipeline = Arc::new(pipeline);
    let timeout = pipeline.remote_timeout();

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let data_dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => dropwatch_store::database::default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)?;
    let db = Database::open_at(&data_dir.join("dropwatch.db"))?;
    info!(path = ?db.path(), "Database opened");

    let http = reqwest::Client::builder().timeout(timeout).build()?;

    let token = match config.resolve_sheets_token()? {
        Some(token) => token,
        None => {
            warn!("No SHEETS_TOKEN configured; sheet writes will fail and be logged");
            String::new()
        }
    };
    let backend = Arc::new(GoogleSheets::new(
        http.clone(),
        pipeline.sheet.spreadsheet_id.clone(),
        token,
    ));
    let sheets = Arc::new(SheetSynchronizer::new(backend, pipeline.sheet.clone(), timeout));

    let transport: Arc<dyn ChatTransport> = Arc::new(HttpTransport::new(
        http.clone(),
        config.transport_url.clone(),
        config.own_user.clone(),
    ));
    let media = Arc::new(MediaDownloader::new(
        data_dir.join("media"),
        Arc::new(TransportFetcher(transport.clone())),
        timeout,
    ));

    let ctx = PipelineContext::new(pipeline, Arc::new(Mutex::new(db)), transport, sheets, media)?;

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    let (events, connection, dispatcher) = spawn_dispatcher(ctx.clone());

    let feedback = if config.feedback_interval_secs > 0 {
        let generator: Arc<dyn FeedbackGenerator> = match &config.feedback_url {
            Some(url) => Arc::new(HttpFeedbackGenerator::new(http.clone(), url.clone())),
            None => Arc::new(TemplateFeedback),
        };
        let every = Duration::from_secs(config.feedback_interval_secs);
        info!(every_secs = config.feedback_interval_secs, "QA feedback loop enabled");
        Some(FeedbackService::new(ctx.clone(), generator).spawn(every))
    } else {
        info!("QA feedback loop disabled");
        None
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let app_state = AppState {
        ctx,
        events,
        connection,
    };

    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    if let Some(task) = feedback {
        task.abort();
    }
    dispatcher.abort();

    Ok(())
}
