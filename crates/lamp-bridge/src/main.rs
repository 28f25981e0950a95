mod bridge;
mod cli;
mod error;
mod rpc;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lamp_api::WsConnector;
use lamp_config::Config;

use crate::bridge::Bridge;
use crate::cli::{Cli, Command, ConfigCommand, GlobalOpts, ServeArgs};
use crate::error::CliError;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Serve(args) => serve(args, &cli.global).await,
        Command::Config(args) => config_command(args.command, &cli.global),
    }
}

fn config_file(global: &GlobalOpts) -> std::path::PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(lamp_config::config_path)
}

// ── Config subcommands ──────────────────────────────────────────────

fn config_command(command: ConfigCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config_file(global);
    match command {
        ConfigCommand::Path => {
            println!("{}", path.display());
        }
        ConfigCommand::Show => {
            let cfg = lamp_config::load_config(Some(&path))?;
            print!("{}", cfg.redacted().to_toml()?);
        }
        ConfigCommand::Init { force } => init_config(&path, force)?,
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::ConfigExists {
            path: path.display().to_string(),
        });
    }
    lamp_config::save_config(&Config::default(), path)?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

// ── Serve ───────────────────────────────────────────────────────────

async fn serve(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = lamp_config::load_config(global.config.as_deref())?;
    let addr = match args.listen {
        Some(addr) => addr,
        None => cfg.listen_addr()?,
    };

    // rustls refuses to pick a provider when more than one is linked in.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let timing = cfg.timing();
    let tls = cfg.tls_mode();
    let http = reqwest::Client::builder()
        .timeout(WEBHOOK_TIMEOUT)
        .build()
        .map_err(CliError::HttpClient)?;
    let connector = Arc::new(WsConnector::new(tls.clone(), timing.connect_timeout));
    let bridge = Arc::new(Bridge::new(connector, http, tls, timing));

    if let Some(startup) = cfg.bridge_config()? {
        let host = startup.credentials.host.clone();
        match bridge.setup(startup).await {
            Ok(()) => info!(%host, "gateway set up from config"),
            Err(e) => warn!(%host, error = %e, "startup setup failed; will retry on Connect or schedule"),
        }
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| CliError::Bind { addr, source })?;
    info!(%addr, "JSON-RPC endpoint listening");

    axum::serve(listener, rpc::router(Arc::clone(&bridge)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bridge.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
