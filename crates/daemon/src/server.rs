//! TCP server - the daemon's client-facing listener
//!
//! Accepts connections from clients (or, on a leader, from daemons),
//! reads length-prefixed frames, feeds them to the service, and writes
//! back whatever reply the service produced. Each connection runs in
//! its own task; a slow client never blocks the accept loop.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use beacon_pipeline::{read_frame_bytes, write_frame_bytes, PipelineError};
use beacon_protocol::{Frame, MsgType};

use crate::service::DaemonService;
use crate::Result;

/// Read buffer capacity per connection
const CONNECTION_BUFFER_SIZE: usize = 64 * 1024;

/// Accept loop wrapper around a `DaemonService`
pub struct DaemonServer {
    service: Arc<DaemonService>,
    token: CancellationToken,
}

impl DaemonServer {
    /// Create a server for the service
    pub fn new(service: Arc<DaemonService>, token: CancellationToken) -> Self {
        Self { service, token }
    }

    /// Bind the configured address
    pub async fn bind(addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(listener)
    }

    /// Accept connections until cancelled
    pub async fn run(self, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    info!("listener stopping");
                    return;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(%addr, "connection accepted");
                            let service = Arc::clone(&self.service);
                            let token = self.token.clone();
                            tokio::spawn(async move {
                                handle_connection(service, stream, token).await;
                                debug!(%addr, "connection closed");
                            });
                        }
                        Err(err) => {
                            warn!(%err, "accept failed");
                        }
                    }
                }
            }
        }
    }
}

/// Per-connection frame loop
async fn handle_connection(
    service: Arc<DaemonService>,
    stream: TcpStream,
    token: CancellationToken,
) {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(CONNECTION_BUFFER_SIZE);

    loop {
        let bytes = tokio::select! {
            _ = token.cancelled() => return,
            read = read_frame_bytes(&mut reader, &mut buf) => match read {
                Ok(bytes) => bytes,
                Err(PipelineError::ConnectionClosed) => return,
                Err(err) => {
                    warn!(%err, "read failed");
                    return;
                }
            }
        };

        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "undecodable frame, dropping connection");
                return;
            }
        };
        let is_shutdown = frame.header.msg_type == MsgType::Shutdown;

        match service.handle_frame(frame) {
            Ok(Some(reply)) => {
                if let Err(err) = write_frame_bytes(&mut writer, &reply.encode()).await {
                    warn!(%err, "reply failed");
                    return;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%err, "frame rejected");
            }
        }

        if is_shutdown {
            return;
        }
    }
}
