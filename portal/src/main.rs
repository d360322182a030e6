use anyhow::Result;
use clap::Parser;
use portal_core::config::{SenderConfig, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, SendOpts, ServeOpts};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(opts) => serve(opts).await,
        Command::Send(opts) => send(opts).await,
    }
}

/// `RUST_LOG` wins; otherwise `debug` with `--debug`, else `info`
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn serve(opts: ServeOpts) -> Result<()> {
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = opts.port {
        config.port = port;
    }
    if let Some(path) = opts.path {
        config.root = path;
    }
    config.debug |= opts.debug;
    init_logging(config.debug);

    let cancel_token = CancellationToken::new();
    let ct = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            ct.cancel();
        }
    });

    portal_core::http_share::start_server(&config, Some(cancel_token)).await
}

async fn send(opts: SendOpts) -> Result<()> {
    init_logging(opts.debug);

    let sent = portal_client::upload(&opts.url, &opts.paths, SenderConfig::default()).await?;
    println!("Sent {} file(s)", sent);
    Ok(())
}
