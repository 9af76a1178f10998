//! # Whisper Jobs Backend - Main Application Entry Point
//!
//! An HTTP service that turns audio uploads into background transcription
//! jobs. One speech model lives in accelerator memory at a time; jobs queue
//! for admission, share the loaded model, and report progress through
//! status queries until they complete, fail, or are canceled.
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (TOML file + environment variables)
//! - **state**: Shared application state handed to request handlers
//! - **jobs**: Job records, registry, admission gate, cancellation, and the
//!   orchestrator driving each job to its terminal state
//! - **model**: The single model slot, its loader seam, idle eviction, and
//!   sibling-service memory coordination
//! - **worker**: Transcriber execution (child process or in-process task)
//!   and the status-line protocol decoder
//! - **audio**: ffprobe duration probe
//! - **handlers**: HTTP request handlers
//! - **error**: Job error taxonomy and HTTP error responses

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod jobs;
mod model;
mod state;
mod worker;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use jobs::gate::ConcurrencyGate;
use jobs::orchestrator::JobOrchestrator;
use jobs::registry::JobRegistry;
use model::device;
use model::loader::ProcessModelLoader;
use model::manager::ModelResourceManager;
use model::sibling::SiblingCoordinator;
use state::{AppState, JobMetrics};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worker::process::ProcessWorkerSettings;

/// Global shutdown signal set by the SIGTERM/SIGINT handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting whisper-jobs-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // Uploads and result artifacts need somewhere to live before anything
    // else starts.
    std::fs::create_dir_all(&config.jobs.temp_input_dir)?;
    std::fs::create_dir_all(&config.jobs.temp_output_dir)?;

    let app_state = build_state(&config);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    // The sweep runs for the life of the process and deletes finished job
    // records once they age out of the retention window.
    let _sweep = app_state
        .registry
        .spawn_retention_sweep(config.sweep_interval(), config.retention());

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server_state = app_state.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/transcribe", web::post().to(handlers::submit_transcription))
                    .route("/status/{job_id}", web::get().to(handlers::get_job_status))
                    .route("/cancel/{job_id}", web::post().to(handlers::cancel_job))
                    .route("/models", web::get().to(handlers::list_models))
                    .route("/model/status", web::get().to(handlers::model_status))
                    .route("/model/unload", web::post().to(handlers::unload_model))
                    .route("/health", web::get().to(health::health_check)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    // Free accelerator memory on the way out; a no-op if jobs are still
    // draining or nothing is loaded.
    app_state.model_manager.unload().await;

    info!("Server stopped gracefully");
    Ok(())
}

/// Wire the job pipeline together from the loaded configuration.
fn build_state(config: &AppConfig) -> AppState {
    let device = device::resolve_device(config.device_preference()).to_string();

    let loader = Arc::new(ProcessModelLoader::new(
        ProcessWorkerSettings {
            command: config.worker.command.clone(),
            grace_period: config.grace_period(),
        },
        device.clone(),
    ));

    let sibling = config
        .model
        .sibling_url
        .clone()
        .map(SiblingCoordinator::new);

    let model_manager = Arc::new(ModelResourceManager::new(
        loader,
        config.idle_timeout(),
        device,
        sibling,
    ));

    let registry = Arc::new(JobRegistry::new());
    let metrics = Arc::new(RwLock::new(JobMetrics::default()));

    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::clone(&registry),
        ConcurrencyGate::new(config.jobs.max_concurrent),
        Arc::clone(&model_manager),
        Arc::new(audio::probe::FfprobeDurationProbe),
        Arc::clone(&metrics),
        config.jobs.temp_output_dir.clone(),
        config.progress_interval(),
    ));

    AppState::new(
        config.clone(),
        registry,
        orchestrator,
        model_manager,
        metrics,
    )
}

/// Initialize the tracing (logging) system for the application.
///
/// `RUST_LOG` controls what gets logged; without it the service logs its own
/// debug output and actix at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_jobs_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Resolve once the shutdown flag has been set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
