use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use borrow_limiter::api::{LimiterResponse, LimiterService};
use borrow_limiter::config::{LoggingConfig, ServiceConfig};
use borrow_limiter::ratelimit::PolicySet;
use borrow_limiter::store::{Identifier, MemoryStore};

#[derive(Debug, Parser)]
#[command(name = "borrow-limiter", version, about = "Rate limiting engine")]
struct Cli {
    /// Service configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Named limiter policies (YAML)
    #[arg(long, global = true)]
    policies: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer newline-delimited JSON requests from stdin
    Serve,

    /// Evaluate a named policy against the in-process store
    Check {
        #[arg(long)]
        policy: String,

        #[arg(long)]
        user_id: Option<String>,

        #[arg(long)]
        key: Option<String>,

        #[arg(long, default_value_t = 1)]
        times: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ServiceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Starting Borrow Limiter");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        execution = ?config.limiter.execution,
        secret_required = config.limiter.invoke_secret.is_some(),
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let service = LimiterService::from_config(&config, store);

    match cli.command {
        Command::Serve => serve(&service).await?,
        Command::Check {
            policy,
            user_id,
            key,
            times,
        } => {
            let path = cli
                .policies
                .context("--policies is required for the check command")?;
            let policies = PolicySet::from_file(&path)?;
            check(&service, &policies, &policy, Identifier::new(user_id, key), times).await?;
        }
    }

    info!("Borrow Limiter stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Answer one request per stdin line until EOF or a shutdown signal.
async fn serve(service: &LimiterService) -> anyhow::Result<()> {
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut stdout = tokio::io::stdout();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Reading requests from stdin");
    loop {
        let line = tokio::select! {
            line = lines.next() => line,
            _ = &mut shutdown => break,
        };
        let Some(line) = line else {
            info!("Input closed");
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let body = match service.handle_json(&line).await {
            Ok(response) => serde_json::to_string(&response)?,
            Err(e) => {
                error!(error = %e, "Request failed");
                serde_json::json!({
                    "result": "error",
                    "status": e.status(),
                    "message": e.to_string(),
                    "timeLeft": null,
                })
                .to_string()
            }
        };
        stdout.write_all(body.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn check(
    service: &LimiterService,
    policies: &PolicySet,
    policy: &str,
    identifier: Identifier,
    times: u32,
) -> anyhow::Result<()> {
    let batch = policies.batch(policy)?;
    info!(policy, limiters = batch.len(), "Evaluating policy");

    for _ in 0..times {
        let outcome = service.limiter().check(&identifier, &batch).await?;
        let response = LimiterResponse::from_outcome(&outcome);
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
