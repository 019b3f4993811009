use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use correlator::testing::EchoDispatcher;
use correlator::{Channel, CorrelatorConfig};
use eyre::WrapErr;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use wire::{Framing, Message};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one request and print the response.
    Call {
        method: String,

        /// Request params as JSON.
        params: Option<String>,

        /// Request id as JSON; bare words are sent as strings.
        #[arg(long)]
        id: Option<String>,

        #[arg(long, default_value = "127.0.0.1:7000")]
        addr: String,

        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        framing: Option<Framing>,
    },
    /// Answer every request with its own params.
    Echo {
        #[arg(long, default_value_t = 7000)]
        port: u16,

        #[arg(long, default_value = "content-length")]
        framing: Framing,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!(?args, "parsed command line arguments");

    match args.command {
        Command::Call {
            method,
            params,
            id,
            addr,
            timeout_ms,
            config,
            framing,
        } => {
            let mut config = match config {
                Some(path) => CorrelatorConfig::load(&path)
                    .wrap_err_with(|| format!("loading config from {}", path.display()))?,
                None => CorrelatorConfig::load_or_default().wrap_err("loading default config")?,
            };
            if let Some(timeout_ms) = timeout_ms {
                config.request_timeout_ms = Some(timeout_ms);
            }
            if let Some(framing) = framing {
                config.framing = framing;
            }

            let params = params
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()
                .wrap_err("parsing params as JSON")?;
            let request = match id {
                Some(raw) => Message::request(parse_id(&raw), method, params),
                None => Message::notification(method, params),
            };

            call(&addr, config, request).await
        }
        Command::Echo { port, framing } => echo(port, framing).await,
    }
}

async fn call(addr: &str, config: CorrelatorConfig, request: Message) -> eyre::Result<()> {
    let channel = Channel::connect(addr, config)
        .await
        .wrap_err_with(|| format!("connecting to {addr}"))?;

    let response = channel.call(request).await.wrap_err("waiting for response")?;
    let serialized = serde_json::to_string_pretty(&response).wrap_err("serialising response")?;
    println!("{serialized}");

    channel.shutdown().await?;

    response.into_result().wrap_err("remote returned an error")?;
    Ok(())
}

async fn echo(port: u16, framing: Framing) -> eyre::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    tracing::info!(%addr, ?framing, "echo dispatcher listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted.wrap_err("accepting connection")?;
                tracing::debug!(%peer, "accepted connection");

                let dispatcher = EchoDispatcher::spawn(stream, framing);
                tokio::spawn(async move {
                    dispatcher.join().await;
                    tracing::debug!(%peer, "connection closed");
                });
            }
        }
    }
}

fn parse_id(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
