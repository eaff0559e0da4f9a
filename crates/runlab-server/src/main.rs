//! runlab-server binary
//!
//! HTTP server that executes submitted Python snippets and returns their
//! captured output, traceback and matplotlib figures.

use clap::Parser;
use runlab_core::{EngineConfig, ExecutionEngine};
use runlab_server::{shutdown_signal, RunlabServer, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments for the runlab server.
#[derive(Parser, Debug)]
#[command(name = "runlab-server")]
#[command(about = "HTTP server executing Python snippets with output and figure capture")]
#[command(version)]
struct Args {
    /// Server bind address
    #[arg(short, long, default_value = "127.0.0.1:5005")]
    bind: String,

    /// Enable CORS
    #[arg(long, default_value = "true")]
    cors: bool,

    /// CORS allowed origins (comma-separated)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Execution deadline in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Maximum request body size in bytes
    #[arg(long, default_value = "1048576")] // 1MB
    max_body_size: usize,

    /// Enable request logging
    #[arg(long, default_value = "true")]
    logging: bool,

    /// Interpreter used to run snippets
    #[arg(long, default_value = "python3")]
    python: String,

    /// Workspace directory for figure files (defaults to a runlab
    /// subdirectory of the system temp dir)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    // Parse bind address
    let bind_addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| format!("Invalid bind address '{}': {}", args.bind, e))?;

    // Parse CORS origins
    let cors_origins = args
        .cors_origins
        .map(|origins| origins.split(',').map(|s| s.trim().to_string()).collect());

    // Create the execution engine
    let mut engine_config = EngineConfig {
        python_bin: args.python,
        timeout: Duration::from_secs(args.timeout),
        ..EngineConfig::default()
    };
    if let Some(workspace) = args.workspace {
        engine_config.workspace_dir = workspace;
    }
    let engine = Arc::new(ExecutionEngine::new(engine_config)?);
    let workspace = engine.workspace().clone();

    // Create server configuration. Without an explicit origin list CORS
    // stays permissive; an empty list would allow no origin at all.
    let mut config = ServerConfig::new()
        .with_bind_addr(bind_addr)
        .with_cors(args.cors)
        .with_max_body_size(args.max_body_size)
        .with_logging(args.logging);
    if let Some(origins) = cors_origins {
        config = config.with_cors_origins(origins);
    }

    let server = RunlabServer::with_config(engine, workspace, config);

    log::info!("Starting runlab server...");
    log::info!("Configuration:");
    log::info!("  Bind address: {}", bind_addr);
    log::info!("  CORS enabled: {}", args.cors);
    log::info!("  Execution deadline: {}s", args.timeout);
    log::info!("  Max body size: {} bytes", args.max_body_size);
    log::info!("  Logging enabled: {}", args.logging);

    // Start server with graceful shutdown
    server.serve_with_shutdown(shutdown_signal()).await?;

    Ok(())
}
