//! Peerchat node: TCP listener, outbound dispatcher and interactive console.

mod cli;
mod config;
mod console;
mod local_addr;
mod node;
mod transport;

use anyhow::Context;
use peerchat_core::{Identity, PeerDirectory, ProtocolEngine};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::console::Console;
use crate::node::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    // Logs go to stderr so they do not interleave with menu prompts.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut cfg = config::load(cli.config.as_deref());
    cli.apply(&mut cfg);

    let mut console = Console::stdin();
    let name = match cfg.name.take() {
        Some(name) => name,
        None => match console.prompt_name().await? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let listener = transport::bind(cfg.port)
        .await
        .with_context(|| format!("cannot listen on port {}", cfg.port))?;
    let port = listener.local_addr()?.port();
    let host = cfg
        .advertise_host
        .clone()
        .unwrap_or_else(|| local_addr::advertised_host().to_string());
    let identity = Identity::new(name, host, port).context("invalid identity")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %identity.address(),
        name = identity.name(),
        policy = ?cfg.policy,
        wire_format = ?cfg.wire_format,
        "peerchat started"
    );

    let engine = ProtocolEngine::new(identity, PeerDirectory::new())
        .with_policy(cfg.policy)
        .with_wire_format(cfg.wire_format);
    let (node, events) = Node::new(engine, cfg.max_message_bytes);

    let server = tokio::spawn(transport::run_listener(listener, node.clone()));

    tokio::select! {
        r = console.run(&node, events) => r?,
        r = shutdown_signal() => r?,
    }

    node.leave().await;
    server.abort();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    tracing::info!("shutdown signal received");
    Ok(())
}
