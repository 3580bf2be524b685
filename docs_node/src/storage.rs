//! Name server side of a storage server connection.
//!
//! After SS_INIT the connection a storage server opened is handed to a link
//! task. The coordinator talks to it through a [`StorageLink`], one request
//! and one response at a time.

use std::fmt::Debug;

use docs_core::protocol::{FrameError, Request, Response, recv_response, send_request};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::ConnId;

#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("storage server disconnected")]
    Disconnected,
    #[error("storage server did not answer in time")]
    Timeout,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Synchronous request/response channel to one storage server.
#[async_trait::async_trait]
pub trait StorageLink: Send + Sync + Debug {
    async fn call(&self, req: Request) -> Result<Response, LinkError>;
}

#[derive(Debug)]
pub(crate) struct LinkCall {
    req: Request,
    responder: oneshot::Sender<Result<Response, LinkError>>,
}

#[derive(Debug, Clone)]
pub struct TcpStorageLink {
    sender: mpsc::Sender<LinkCall>,
}

impl TcpStorageLink {
    pub(crate) fn channel() -> (Self, mpsc::Receiver<LinkCall>) {
        let (sender, receiver) = mpsc::channel(16);
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl StorageLink for TcpStorageLink {
    async fn call(&self, req: Request) -> Result<Response, LinkError> {
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(LinkCall { req, responder })
            .await
            .map_err(|_| LinkError::Disconnected)?;
        receiver.await.map_err(|_| LinkError::Disconnected)?
    }
}

/// Owns the socket until the storage server goes away. While idle it
/// watches for the peer closing the connection.
pub(crate) async fn run_link(
    mut stream: TcpStream,
    mut calls: mpsc::Receiver<LinkCall>,
    node: ConnId,
) {
    let mut peek_buf = [0u8; 1];
    loop {
        tokio::select! {
            call = calls.recv() => {
                let Some(LinkCall { req, responder }) = call else {
                    break;
                };
                debug!("-> storage {node}: {} {}", req.command, req.args);
                let result = exchange(&mut stream, &req).await;
                let failed = result.is_err();
                let _ = responder.send(result);
                if failed {
                    break;
                }
            }
            peeked = stream.peek(&mut peek_buf) => {
                match peeked {
                    Ok(0) => info!("storage server {node} closed its connection"),
                    Ok(_) => warn!("storage server {node} sent an unsolicited frame, dropping it"),
                    Err(err) => warn!("storage server {node} connection failed: {err}"),
                }
                break;
            }
        }
    }
    calls.close();
    while let Ok(LinkCall { responder, .. }) = calls.try_recv() {
        let _ = responder.send(Err(LinkError::Disconnected));
    }
}

async fn exchange(stream: &mut TcpStream, req: &Request) -> Result<Response, LinkError> {
    send_request(stream, req).await?;
    match recv_response(stream).await {
        Err(FrameError::Closed) => Err(LinkError::Disconnected),
        other => Ok(other?),
    }
}
