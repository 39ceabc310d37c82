use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logline::config::Config;
use logline::server::LoglineServer;

#[derive(Parser)]
#[command(
    name = "logline",
    version,
    about = "Real-time collaborative text buffer server",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the synchronization server
    Serve {
        /// Listening port
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Redis connection string for cross-instance fanout
        #[arg(long)]
        redis_url: Option<String>,

        /// Pub/sub channel name
        #[arg(long)]
        channel: Option<String>,
    },

    /// Print the resolved configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    match cli.command {
        Commands::Serve {
            port,
            host,
            redis_url,
            channel,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(url) = redis_url {
                config.redis.url = url;
            }
            if let Some(channel) = channel {
                config.redis.channel = channel;
            }
            config.validate().context("Invalid configuration")?;

            setup_tracing(&config.logging.level, &config.logging.format, cli.verbose)?;
            serve(config).await?;
        }

        Commands::Config => {
            let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{text}");
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    if let Err(e) = logline::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let server = LoglineServer::connect(config)
        .await
        .context("Failed to create server")?;

    println!("{}", server.info().display());

    server
        .start_with_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received, shutting down gracefully"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down gracefully"),
    }
}

fn setup_tracing(level: &str, format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("logline=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("logline={level},warn")))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
