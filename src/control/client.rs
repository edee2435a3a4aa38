//! Client side of the control channel.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::codec::{decode_frame, encode_frame};
use super::{ControlError, ControlResult, Request, Response};

/// One-shot control-channel client. Every call opens a connection,
/// performs a single request/response exchange under the deadline,
/// and closes.
pub struct PeerClient {
    endpoint: String,
    deadline: Duration,
}

impl PeerClient {
    pub fn new(endpoint: impl Into<String>, deadline: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            deadline,
        }
    }

    /// Perform one request/response exchange. The deadline covers
    /// connect, send and receive together.
    pub async fn call(&self, request: &Request) -> ControlResult<Response> {
        timeout(self.deadline, self.exchange(request))
            .await
            .map_err(|_| ControlError::Deadline(self.deadline))?
    }

    async fn exchange(&self, request: &Request) -> ControlResult<Response> {
        debug!(endpoint = %self.endpoint, "control call");
        let mut socket = TcpStream::connect(&self.endpoint).await?;

        let mut out = BytesMut::new();
        encode_frame(request, &mut out)?;
        socket.write_all(&out).await?;

        let mut incoming = BytesMut::with_capacity(4096);
        loop {
            if let Some(response) = decode_frame::<Response>(&mut incoming)? {
                return Ok(response);
            }
            let n = socket.read_buf(&mut incoming).await?;
            if n == 0 {
                return Err(ControlError::Closed);
            }
        }
    }
}
