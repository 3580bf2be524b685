//! Client-facing side of a storage server: READ, STREAM and WRITE sessions.

use std::net::SocketAddr;
use std::sync::Arc;

use docs_core::protocol::{
    self, Command, FrameError, MAX_CHUNK, Request, Response, Status, recv_request, send_response,
};
use docs_core::text;
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::Shared;
use crate::session::WriteSession;

pub(crate) async fn serve_clients(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, peer, shared).await {
                        warn!("client {peer}: {err}");
                    }
                });
            }
            Err(err) => warn!("accept failed: {err}"),
        }
    }
}

async fn handle_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
) -> Result<(), FrameError> {
    debug!("client connected from {peer}");
    let mut session = WriteSession::new(Arc::clone(&shared.store), Arc::clone(&shared.locks));

    loop {
        let req = match recv_request(&mut stream).await {
            Ok(req) => req,
            Err(FrameError::Closed) => break,
            Err(FrameError::UnknownCommand(code)) => {
                let resp = Response::new(
                    Status::InvalidOperation,
                    format!("Unknown command: {code}"),
                );
                send_response(&mut stream, &resp).await?;
                continue;
            }
            Err(err @ FrameError::Corrupt { .. }) => {
                warn!("dropping corrupt frame from {peer}: {err}");
                send_response(&mut stream, &Response::error(Status::InvalidFormat)).await?;
                continue;
            }
            Err(err) => return Err(err),
        };

        match req.command {
            Command::Read => send_file(&mut stream, &shared, &req).await?,
            Command::Stream => stream_words(&mut stream, &shared, &req).await?,
            Command::Write => {
                let resp = session.write(&req.username, &req.args).await;
                send_response(&mut stream, &resp).await?;
            }
            Command::Etirw => {
                let resp = session.finish(&req.username).await;
                send_response(&mut stream, &resp).await?;
                // One write session per connection.
                if resp.is_ok() {
                    break;
                }
            }
            Command::Heartbeat => send_response(&mut stream, &Response::ok("alive")).await?,
            other => {
                let resp = Response::new(
                    Status::InvalidOperation,
                    format!("{other} is not served to clients by a storage server"),
                );
                send_response(&mut stream, &resp).await?;
            }
        }
    }

    if session.is_open() {
        info!("client {peer} left with an open write session, releasing its lock");
    }
    debug!("client {peer} disconnected");
    Ok(())
}

/// Loads the file after checking read access and records the access.
async fn readable_content(shared: &Shared, req: &Request) -> Result<String, Response> {
    let name = req.args.trim();
    let meta = shared
        .store
        .meta(name)
        .await
        .map_err(|err| Response::new(err.status(), err.to_string()))?;
    if !meta.access(&req.username).can_read() {
        return Err(Response::error(Status::ReadPermission));
    }
    let content = shared
        .store
        .read(name)
        .await
        .map_err(|err| Response::new(err.status(), err.to_string()))?;
    if let Err(err) = shared
        .store
        .update_meta(name, |meta| meta.touch(&req.username))
        .await
    {
        warn!("could not record access to {name}: {err}");
    }
    Ok(content)
}

/// READ: consecutive chunks of the file, then an empty OK frame.
async fn send_file<W>(out: &mut W, shared: &Shared, req: &Request) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let content = match readable_content(shared, req).await {
        Ok(content) => content,
        Err(resp) => return send_response(out, &resp).await,
    };
    for chunk in protocol::chunk_text(&content, MAX_CHUNK) {
        send_response(out, &Response::ok(chunk)).await?;
    }
    send_response(out, &Response::ok("")).await
}

/// STREAM: one word per frame with a pause after each, then an empty OK
/// frame.
async fn stream_words<W>(out: &mut W, shared: &Shared, req: &Request) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let content = match readable_content(shared, req).await {
        Ok(content) => content,
        Err(resp) => return send_response(out, &resp).await,
    };
    for word in text::words(&content) {
        let word = protocol::chunk_text(word, MAX_CHUNK)
            .into_iter()
            .next()
            .unwrap_or_default();
        send_response(out, &Response::ok(word)).await?;
        tokio::time::sleep(shared.word_delay).await;
    }
    send_response(out, &Response::ok("")).await
}
