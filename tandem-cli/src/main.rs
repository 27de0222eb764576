//! Tandem server CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tandem_config::{Config, ConfigSource};
use tandem_core::InMemoryDirectory;
use tandem_runtime::{ConfigWatcher, RunOptions, Server, ServerHandle, ServerRun};
use tandem_storage::{FilesystemAccountStorage, FilesystemStorage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tandemd")]
#[command(about = "Tandem collaborative editing server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Configuration files, later files override earlier ones
        #[arg(short, long, env = "TANDEM_CONFIG", default_value = "tandem.yaml")]
        config: Vec<PathBuf>,

        /// Log level (trace, debug, info, warn, error), overrides the configuration
        #[arg(short, long)]
        log_level: Option<String>,

        /// Refuse to start when a configured plugin fails to load
        #[arg(long)]
        strict_plugins: bool,

        /// Reload when a configuration file changes
        #[arg(long)]
        watch: bool,
    },

    /// Validate configuration files
    Validate {
        /// Configuration files, later files override earlier ones
        #[arg(short, long, env = "TANDEM_CONFIG", default_value = "tandem.yaml")]
        config: Vec<PathBuf>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            log_level,
            strict_plugins,
            watch,
        } => {
            let source = config_source(config);
            let cfg = source.load().context("Failed to load configuration")?;

            let logging = &cfg.observability.logging;
            init_tracing(log_level.as_deref().unwrap_or(&logging.level), &logging.format)?;

            tracing::info!(files = ?source.paths(), "Starting Tandem server");
            serve(source, cfg, strict_plugins, watch).await
        }

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            let source = config_source(config);
            tracing::info!("Validating configuration: {:?}", source.paths());

            match source.load() {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Port: {}", cfg.server.port);
                    tracing::info!("  Storage: {}", cfg.storage.root_directory.display());
                    tracing::info!("  Security policy: {}", cfg.security.policy);
                    tracing::info!("  Plugins: {}", cfg.plugins.load.join(", "));
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Tandem server");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

async fn serve(source: ConfigSource, config: Config, strict_plugins: bool, watch: bool) -> Result<()> {
    let directory = InMemoryDirectory::new(
        FilesystemStorage::new(&config.storage.root_directory),
        FilesystemAccountStorage::new(),
    );
    let options = RunOptions::new().strict_plugins(strict_plugins);

    let watch = watch || config.server.watch_config;
    let debounce = config.server.watch_debounce;

    let run = ServerRun::with_config(config, directory, options)?;
    let server = Server::new(run, source.clone());
    let handle = server.handle();

    let _watcher = if watch {
        Some(ConfigWatcher::spawn(source.paths(), debounce, handle.clone())?)
    } else {
        None
    };

    tokio::spawn(shutdown_on_signal(handle));

    server.run().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// One file is read as is, several are merged in order
fn config_source(mut paths: Vec<PathBuf>) -> ConfigSource {
    if paths.len() == 1 {
        ConfigSource::File(paths.remove(0))
    } else {
        ConfigSource::Layered(paths)
    }
}

async fn shutdown_on_signal(handle: ServerHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Received SIGINT");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C"),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
        }
    }

    handle.shutdown().await;
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {level}"))?;

    let registry = tracing_subscriber::registry().with(filter);

    if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true),
            )
            .try_init()?;
    }

    Ok(())
}
