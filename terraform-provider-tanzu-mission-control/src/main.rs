//! Terraform Provider for VMware Tanzu Mission Control

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use terraform_provider_tmc::TmcProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Terraform Provider for Tanzu Mission Control
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-tanzu-mission-control")]
#[command(about = "Terraform provider for VMware Tanzu Mission Control")]
struct Args {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, env = "TMC_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(args: &Args) {
    // RUST_LOG wins, then Terraform's TF_LOG level
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("TF_LOG")
                .map_err(anyhow::Error::from)
                .and_then(|level| Ok(tracing_subscriber::EnvFilter::try_new(level.to_lowercase())?))
        })
        .unwrap_or_else(|_| default_level.into());

    // stdout carries the protocol, logs go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    tracing::info!("Starting Terraform Provider for Tanzu Mission Control");

    let provider = TmcProvider::new().context("failed to start async runtime")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        let input = line.context("failed to read request")?;
        if input.trim().is_empty() {
            continue;
        }

        let response = provider.handle_request(&input);
        writeln!(stdout_lock, "{}", response).context("failed to write response")?;
        stdout_lock.flush().context("failed to flush stdout")?;
    }

    tracing::info!("Terraform Provider shutting down");
    Ok(())
}
