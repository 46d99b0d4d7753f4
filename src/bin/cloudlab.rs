//! cloudlab - container environment server
//!
//! ## Usage
//!
//! ```sh
//! cloudlab serve [--engine docker|memory] [--port <port>]
//! cloudlab version
//! cloudlab help
//! ```
//!
//! Everything else is configured through `CLOUDLAB_*` environment variables
//! (an optional `.env` file is loaded first).

use anyhow::{Context, Result, anyhow};
use cloudlab::{
    AppConfig, AppState, JwtVerifier, LifecycleManager, build_router, engines::EngineKind,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Serve {
        engine: Option<EngineKind>,
        port: Option<u16>,
    },
    Version,
    Help,
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Serve {
            engine: None,
            port: None,
        });
    }

    match args[1].as_str() {
        "serve" => {
            let mut engine = None;
            let mut port = None;
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--engine" | "-e" => {
                        let value = args.get(i + 1).ok_or("--engine requires a value")?;
                        engine = Some(
                            EngineKind::from_name(value)
                                .ok_or_else(|| format!("unknown engine: {}", value))?,
                        );
                        i += 2;
                    }
                    "--port" | "-p" => {
                        let value = args.get(i + 1).ok_or("--port requires a value")?;
                        port = Some(
                            value
                                .parse::<u16>()
                                .map_err(|_| format!("invalid port: {}", value))?,
                        );
                        i += 2;
                    }
                    other => return Err(format!("unknown option: {}", other)),
                }
            }
            Ok(Command::Serve { engine, port })
        }
        "version" | "--version" | "-v" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        unknown => Err(format!("unknown command: {}", unknown)),
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cloudlab=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn cmd_serve(engine: Option<EngineKind>, port: Option<u16>) -> Result<()> {
    init_tracing();

    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    if let Some(engine) = engine {
        config.engine = engine;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let engine = config
        .engine
        .open()
        .map_err(|e| anyhow!("failed to open {} engine: {}", config.engine, e))?;
    let manager = LifecycleManager::new(engine, config.manager_settings())
        .map_err(|e| anyhow!("failed to initialize lifecycle manager: {}", e))?;
    let verifier = JwtVerifier::new(config.jwt_secret.as_bytes());

    let app = build_router(AppState::new(Arc::new(manager), Arc::new(verifier)));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("cloudlab listening on {} ({} engine)", addr, config.engine);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("cloudlab stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("unable to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("unable to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}

fn cmd_version() {
    println!("cloudlab version {}", env!("CARGO_PKG_VERSION"));
}

fn cmd_help() {
    println!(
        r#"cloudlab - short-lived container environments over HTTP

USAGE:
    cloudlab <command> [options]

COMMANDS:
    serve                  Run the HTTP server (default)
    version                Show version info
    help                   Show this help

OPTIONS:
    --engine, -e <name>    Engine backend: docker, memory
    --port, -p <port>      Listen port (overrides CLOUDLAB_PORT)

ENVIRONMENT:
    CLOUDLAB_JWT_SECRET         HS256 secret for bearer tokens (required)
    CLOUDLAB_HOST               Bind host (default: 0.0.0.0)
    CLOUDLAB_PORT               Bind port (default: 8000)
    CLOUDLAB_BUILD_DIR          Build context root (default: ~/.cloudlab/generated)
    CLOUDLAB_ENGINE             docker or memory (default: docker)
    CLOUDLAB_BUILD_WORKERS      Concurrent builds (default: 4)
    CLOUDLAB_STOP_TIMEOUT_SECS  Graceful stop timeout (default: 10)
    RUST_LOG                    Log filter (default: cloudlab=info,tower_http=info)
"#
    );
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    let result = match parse_args() {
        Ok(Command::Serve { engine, port }) => run_server(engine, port),
        Ok(Command::Version) => {
            cmd_version();
            Ok(())
        }
        Ok(Command::Help) => {
            cmd_help();
            Ok(())
        }
        Err(e) => {
            eprintln!("error: {}", e);
            cmd_help();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_server(engine: Option<EngineKind>, port: Option<u16>) -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(cmd_serve(engine, port))
}
