//! Accept loop and per-connection tasks of the name server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use docs_core::protocol::{
    Command, FrameError, Response, Status, recv_request, send_response,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::ConnId;
use crate::coordinator::{CoordinatorHandle, parse_ss_init};
use crate::storage::{self, TcpStorageLink};

pub(crate) async fn accept_loop(listener: TcpListener, coordinator: CoordinatorHandle) {
    let next_conn = AtomicU64::new(1);
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let conn = next_conn.fetch_add(1, Ordering::Relaxed);
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, peer, conn, &coordinator).await {
                        warn!("connection {conn} from {peer}: {err}");
                    }
                    let _ = coordinator.disconnected(conn).await;
                });
            }
            Err(err) => warn!("accept failed: {err}"),
        }
    }
}

/// Serves one connection. It belongs to a client until its first SS_INIT,
/// after which it becomes the link to that storage server.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    conn: ConnId,
    coordinator: &CoordinatorHandle,
) -> anyhow::Result<()> {
    debug!("connection {conn} from {peer}");
    let mut is_client = false;
    loop {
        let req = match recv_request(&mut stream).await {
            Ok(req) => req,
            Err(FrameError::Closed) => return Ok(()),
            Err(FrameError::UnknownCommand(code)) => {
                let resp = Response::new(
                    Status::InvalidOperation,
                    format!("Unknown command: {code}"),
                );
                send_response(&mut stream, &resp).await?;
                continue;
            }
            Err(err @ FrameError::Corrupt { .. }) => {
                warn!("corrupt frame on connection {conn}: {err}");
                send_response(&mut stream, &Response::error(Status::InvalidFormat)).await?;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if matches!(req.command, Command::SsInit | Command::RegisterSs) && !is_client {
            let (link, calls) = TcpStorageLink::channel();
            let resp = coordinator
                .register_storage(conn, req.args.clone(), Arc::new(link))
                .await?;
            send_response(&mut stream, &resp).await?;
            if !resp.is_ok() {
                continue;
            }
            let files = parse_ss_init(&req.args)
                .map(|(_, _, files)| files)
                .unwrap_or_default();
            coordinator.adopt_files(conn, files).await?;
            storage::run_link(stream, calls, conn).await;
            return Ok(());
        }

        is_client = true;
        let resp = coordinator
            .client_request(conn, peer.to_string(), req)
            .await?;
        send_response(&mut stream, &resp).await?;
    }
}
