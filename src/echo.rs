use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::model::CodecKind;
use crate::protocol::{Connection, ProtoError};

/// Accepts connections and echoes every decoded payload back until the peer
/// closes. Each connection runs in its own task; an error kills that
/// connection only.
pub async fn serve(listener: TcpListener, codec: CodecKind) -> Result<()> {
    info!("listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("accepted {}", peer);
        tokio::spawn(async move {
            if let Err(e) = echo(stream, codec).await {
                warn!("connection {}: {:#}", peer, e);
            }
        });
    }
}

async fn echo(stream: TcpStream, codec: CodecKind) -> Result<()> {
    let mut conn = Connection::from_stream(stream, codec);
    loop {
        let payload = match conn.recv().await {
            Ok(payload) => payload,
            Err(ProtoError::Closed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        conn.send(&payload).await?;
    }
}
