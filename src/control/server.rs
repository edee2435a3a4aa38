//! Server side of the control channel.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::codec::{decode_frame, encode_frame};
use super::{ControlResult, Request, Response};

/// Node-side handling of control requests. The master and worker
/// roles answer different subsets.
#[async_trait]
pub trait ControlHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Response;
}

/// Control-channel listener: one task per connection, each
/// connection serving any number of request/response exchanges.
pub struct ControlServer {
    listener: TcpListener,
}

impl ControlServer {
    /// Bind the control endpoint. Port 0 binds an ephemeral port.
    pub async fn bind(addr: &str) -> ControlResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "control server listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> ControlResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is aborted.
    pub async fn serve(self, handler: Arc<dyn ControlHandler>) -> ControlResult<()> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            debug!(%peer, "control connection accepted");

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, handler).await {
                    error!(%peer, "control connection failed: {e}");
                }
            });
        }
    }

    /// Spawn `serve` on the runtime and return its handle.
    pub fn spawn(self, handler: Arc<dyn ControlHandler>) -> JoinHandle<ControlResult<()>> {
        tokio::spawn(self.serve(handler))
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    handler: Arc<dyn ControlHandler>,
) -> ControlResult<()> {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        let n = socket.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        while let Some(request) = decode_frame::<Request>(&mut buf)? {
            let response = handler.handle(request).await;
            let mut out = BytesMut::new();
            encode_frame(&response, &mut out)?;
            socket.write_all(&out).await?;
        }
    }
}
