use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use corral::cli::Args;
use corral::config::{load_config_file, ServerConfig};
use corral::server::{create_router, AppState};
use corral::task::spawn_task_scheduler;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    // Load and validate config; an absent file means defaults
    let mut config = match args.config {
        Some(ref path) => match load_config_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config file {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(bind_addr) = args.bind_addr {
        config.host = bind_addr;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    // Validate after CLI overrides, not just at file load
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(1);
    }

    let state = AppState::new(&config);
    let addr = format!("{}:{}", config.host, config.port);

    // Background timeout sweep for attempts stuck with workers
    let _scheduler_shutdown =
        spawn_task_scheduler(state.scheduler.clone(), config.task.scheduler_config());

    info!("Starting corral on {}", addr);

    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            process::exit(1);
        }
    };

    info!("Server listening on {}", addr);
    info!("Endpoints:");
    info!("  GET  /health                  - Health check");
    info!("  GET  /v1/status               - Entity and queue counts");
    info!("  POST /v1/corral/clusters      - Create and solve a cluster");
    info!("  POST /v1/corral/tasks/take    - Worker claims a task");
    info!("  POST /v1/corral/tasks/finish  - Worker reports a result");

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
