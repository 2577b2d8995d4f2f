//! TCP RPC server
//!
//! Length-prefixed protobuf frames in both directions. Requests on one
//! connection run concurrently; responses are written as they complete and
//! carry the request id.

use super::service::{rejection, ActionService};
use anyhow::Result;
use drone_action_shared::codec::{self, FrameDecoder};
use drone_action_shared::{ActionResult, RpcRequest, RpcResponse};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails
    pub async fn run(self, service: ActionService) -> Result<()> {
        info!("[RPC] Listening on {}", self.local_addr()?);

        loop {
            let (socket, addr) = self.listener.accept().await?;
            info!("[RPC] Client connected: {}", addr);

            let service = service.clone();
            tokio::spawn(async move {
                match handle_client(socket, service).await {
                    Ok(()) => info!("[RPC] Client disconnected: {}", addr),
                    Err(e) => warn!("[RPC] Client {} dropped: {}", addr, e),
                }
            });
        }
    }
}

async fn handle_client(socket: TcpStream, service: ActionService) -> Result<()> {
    let (mut reader, writer) = tokio::io::split(socket);
    let (response_tx, response_rx) = mpsc::channel::<RpcResponse>(64);

    let writer_task = tokio::spawn(write_responses(writer, response_rx));

    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 4096];

    let result = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => decoder.extend(&buf[..n]),
            Err(e) => break Err(e.into()),
        }

        // A malformed frame leaves the stream unsynchronized
        let mut failed = None;
        loop {
            match decoder.decode_next::<RpcRequest>() {
                Ok(Some(request)) => spawn_request(request, &service, &response_tx),
                Ok(None) => break,
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failed {
            break Err(e.into());
        }
    };

    // In-flight requests keep the writer alive until they answer
    drop(response_tx);
    if let Err(e) = writer_task.await {
        error!("[RPC] Writer task failed: {}", e);
    }
    result
}

fn spawn_request(
    request: RpcRequest,
    service: &ActionService,
    response_tx: &mpsc::Sender<RpcResponse>,
) {
    let service = service.clone();
    let response_tx = response_tx.clone();

    tokio::spawn(async move {
        let request_id = request.request_id;
        let handled = tokio::spawn(async move { service.handle(request).await }).await;

        let response = handled.unwrap_or_else(|e| {
            error!("[RPC] Request {} handler failed: {}", request_id, e);
            rejection(request_id, ActionResult::Unknown)
        });

        if response_tx.send(response).await.is_err() {
            debug!("[RPC] Connection gone, dropping response {}", request_id);
        }
    });
}

async fn write_responses(
    mut writer: WriteHalf<TcpStream>,
    mut response_rx: mpsc::Receiver<RpcResponse>,
) {
    while let Some(response) = response_rx.recv().await {
        let encoded = match codec::encode(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("[RPC] Failed to encode response {}: {}", response.request_id, e);
                continue;
            }
        };

        if let Err(e) = writer.write_all(&encoded).await {
            warn!("[RPC] Write failed: {}", e);
            return;
        }
    }
}
