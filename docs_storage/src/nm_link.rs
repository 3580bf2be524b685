//! Connection from a storage server to the name server.
//!
//! The storage server dials the name server, announces itself with SS_INIT
//! and then serves the name server's requests on that same connection.

use anyhow::{Context, bail};
use docs_core::acl::Acl;
use docs_core::protocol::{
    Command, FrameError, MAX_CHUNK, Request, Response, Status, recv_request, recv_response,
    send_request, send_response,
};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::Shared;

/// Username stamped on frames the storage server originates.
const SS_USER: &str = "storage";

pub(crate) async fn register(
    name_server: &str,
    advertise: &str,
    files: &[String],
) -> anyhow::Result<TcpStream> {
    let mut stream = TcpStream::connect(name_server)
        .await
        .with_context(|| format!("connecting to name server at {name_server}"))?;
    let args = format!("{advertise}:{}", files.join(","));
    send_request(&mut stream, &Request::new(Command::SsInit, SS_USER, args)).await?;
    let resp = recv_response(&mut stream).await?;
    if !resp.is_ok() {
        bail!("name server refused registration: {} ({})", resp.data, resp.status);
    }
    info!("{}", resp.data);
    Ok(stream)
}

pub(crate) async fn serve_name_server(mut stream: TcpStream, shared: &Shared) -> anyhow::Result<()> {
    loop {
        let req = match recv_request(&mut stream).await {
            Ok(req) => req,
            Err(FrameError::Closed) => {
                info!("name server closed the connection");
                return Ok(());
            }
            Err(FrameError::UnknownCommand(code)) => {
                warn!("unknown command from name server: {code}");
                let resp = Response::new(
                    Status::InvalidOperation,
                    format!("Unknown command: {code}"),
                );
                send_response(&mut stream, &resp).await?;
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        debug!("name server: {} {} by {}", req.command, req.args, req.username);
        let resp = handle(shared, &req).await;
        send_response(&mut stream, &resp).await?;
    }
}

pub(crate) async fn handle(shared: &Shared, req: &Request) -> Response {
    let store = &shared.store;
    let name = req.args.trim();
    let result = match req.command {
        Command::Create => store
            .create(name, &req.username)
            .await
            .map(|_| Response::ok("File created on storage")),
        Command::Delete => store
            .delete(name, &req.username)
            .await
            .map(|_| Response::ok("File deleted from storage")),
        Command::Undo => store
            .undo(name)
            .await
            .map(|_| Response::ok("Undo successful")),
        Command::GetAcl => store.meta_text(name).await.map(|text| {
            if text.len() > MAX_CHUNK {
                Response::new(
                    Status::InvalidFormat,
                    format!("Metadata of '{name}' too large to send ({} bytes)", text.len()),
                )
            } else {
                Response::ok(text)
            }
        }),
        Command::Exec => store.read(name).await.map(|content| {
            if content.len() > MAX_CHUNK {
                Response::new(
                    Status::InvalidOperation,
                    format!("File too large to execute ({} bytes)", content.len()),
                )
            } else {
                Response::ok(content)
            }
        }),
        Command::UpdateAcl => return update_acl(shared, &req.args).await,
        Command::Heartbeat => return Response::ok("alive"),
        other => {
            return Response::new(
                Status::InvalidOperation,
                format!("Unknown command: {}", other.code()),
            );
        }
    };
    result.unwrap_or_else(|err| Response::new(err.status(), err.to_string()))
}

/// UPDATE_ACL `<file> <user:PERM,...>`; the ACL part may be empty.
async fn update_acl(shared: &Shared, args: &str) -> Response {
    let (name, acl) = args.trim().split_once(' ').unwrap_or((args.trim(), ""));
    let acl = match Acl::parse(acl.trim()) {
        Ok(acl) => acl,
        Err(err) => return Response::new(Status::InvalidFormat, err.to_string()),
    };
    match shared.store.set_acl(name, acl).await {
        Ok(meta) => {
            debug!("acl of {name} is now '{}'", meta.acl);
            Response::ok("ACL updated")
        }
        Err(err) => Response::new(err.status(), err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::SentenceLocks;
    use crate::store::DocStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn shared(dir: &tempfile::TempDir) -> Shared {
        Shared {
            store: Arc::new(DocStore::new(dir.path())),
            locks: SentenceLocks::new(),
            word_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn create_acl_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared(&dir);

        let resp = handle(&shared, &Request::new(Command::Create, "alice", "r.txt")).await;
        assert_eq!(resp.data, "File created on storage");
        let resp = handle(&shared, &Request::new(Command::Create, "alice", "r.txt")).await;
        assert_eq!(resp.status, Status::FileExists);

        let resp = handle(
            &shared,
            &Request::new(Command::UpdateAcl, "alice", "r.txt bob:R"),
        )
        .await;
        assert!(resp.is_ok());
        let resp = handle(&shared, &Request::new(Command::GetAcl, "alice", "r.txt")).await;
        assert!(resp.data.contains("owner=alice"));
        assert!(resp.data.contains("access_0=bob:R"));

        let resp = handle(&shared, &Request::new(Command::UpdateAcl, "alice", "r.txt")).await;
        assert!(resp.is_ok());
        assert!(shared.store.meta("r.txt").await.unwrap().acl.is_empty());

        let resp = handle(&shared, &Request::new(Command::Delete, "bob", "r.txt")).await;
        assert_eq!(resp.status, Status::OwnerRequired);
        assert_eq!(resp.data, "Only the owner can delete this file");
        let resp = handle(&shared, &Request::new(Command::Delete, "alice", "r.txt")).await;
        assert_eq!(resp.data, "File deleted from storage");
    }

    #[tokio::test]
    async fn undo_without_backup_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared(&dir);
        handle(&shared, &Request::new(Command::Create, "alice", "r.txt")).await;
        let resp = handle(&shared, &Request::new(Command::Undo, "alice", "r.txt")).await;
        assert_eq!(resp.status, Status::NotFound);
    }

    #[tokio::test]
    async fn oversize_sidecar_is_refused_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared(&dir);
        handle(&shared, &Request::new(Command::Create, "alice", "r.txt")).await;
        let acl = (0..100)
            .map(|i| format!("user{i:03}{}:R", "x".repeat(40)))
            .collect::<Vec<_>>()
            .join(",");
        shared
            .store
            .set_acl("r.txt", Acl::parse(&acl).unwrap())
            .await
            .unwrap();

        let resp = handle(&shared, &Request::new(Command::GetAcl, "alice", "r.txt")).await;
        assert_eq!(resp.status, Status::InvalidFormat);
        assert!(!resp.data.contains("access_"));
    }

    #[tokio::test]
    async fn malformed_acl_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared(&dir);
        handle(&shared, &Request::new(Command::Create, "alice", "r.txt")).await;
        let resp = handle(
            &shared,
            &Request::new(Command::UpdateAcl, "alice", "r.txt bob:Z"),
        )
        .await;
        assert_eq!(resp.status, Status::InvalidFormat);
    }
}
