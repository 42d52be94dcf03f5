//! TCP transport: listener that reads exactly one message per inbound connection, and
//! short-lived outbound connections that write one message and close.

use std::io;
use std::net::SocketAddr;

use peerchat_core::{DecodeError, PeerAddress};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::node::Node;

pub async fn bind(port: u16) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Accept connections forever, one handler task per connection. A stuck handler never blocks
/// the accept loop or other handlers.
pub async fn run_listener(listener: TcpListener, node: Node) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                let node = node.clone();
                tokio::spawn(async move {
                    handle_connection(stream, remote, node).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Read to end-of-stream, hand the bytes to the engine, drop the socket.
async fn handle_connection(mut stream: TcpStream, remote: SocketAddr, node: Node) {
    match read_message(&mut stream, node.max_message_bytes()).await {
        Ok(bytes) => node.on_inbound(&bytes, remote),
        Err(InboundError::Io(e)) if e.kind() == io::ErrorKind::ConnectionReset => {
            tracing::info!(%remote, "peer reset the connection");
        }
        Err(e) => tracing::warn!(%remote, error = %e, "dropping inbound message"),
    }
}

async fn read_message(stream: &mut TcpStream, limit: usize) -> Result<Vec<u8>, InboundError> {
    let mut buf = Vec::new();
    stream
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > limit {
        return Err(DecodeError::TooLarge { limit }.into());
    }
    Ok(buf)
}

#[derive(Debug, thiserror::Error)]
enum InboundError {
    #[error("read error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Connect, write the frame, close. No retry, no reply expected.
pub async fn send_message(to: &PeerAddress, frame: &[u8]) -> io::Result<()> {
    let mut stream = TcpStream::connect((to.host(), to.port())).await?;
    stream.write_all(frame).await?;
    stream.shutdown().await?;
    Ok(())
}
