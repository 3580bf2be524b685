//! The coordinator actor owns every piece of name server state.
//!
//! Connection tasks forward frames to it over a channel and it handles them
//! one at a time, including any request it makes to a storage server on
//! their behalf. Directory and ACL changes are therefore totally ordered.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use docs_core::acl::Permission;
use docs_core::meta::{self, FileMeta};
use docs_core::names;
use docs_core::protocol::{ARGS_LEN, Command, Request, Response, Status};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::ConnId;
use crate::directory::{FileDirectory, FileRecord};
use crate::exec::Executor;
use crate::registry::{ClientRegistry, StorageNode, StorageRegistry};
use crate::storage::{LinkError, StorageLink};

mod listing;

#[derive(Debug)]
pub(crate) enum ActorMessage {
    /// A frame from a client connection.
    Client {
        conn: ConnId,
        peer: String,
        request: Request,
        responder: oneshot::Sender<Response>,
    },
    /// SS_INIT from a storage server connection.
    RegisterStorage {
        conn: ConnId,
        args: String,
        link: Arc<dyn StorageLink>,
        responder: oneshot::Sender<Response>,
    },
    /// Pulls the sidecars of the files a storage server announced. Sent
    /// once the SS_INIT answer is on the wire so the link can serve it.
    AdoptFiles { node: ConnId, files: Vec<String> },
    Disconnected { conn: ConnId },
}

#[derive(Debug, Clone)]
pub(crate) struct CoordinatorHandle {
    sender: mpsc::Sender<ActorMessage>,
}

impl CoordinatorHandle {
    pub(crate) fn spawn(coordinator: Coordinator) -> Self {
        let (sender, receiver) = mpsc::channel(1024);
        tokio::spawn(coordinator.run(receiver));
        Self { sender }
    }

    async fn send_msg(&self, msg: ActorMessage) -> anyhow::Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| anyhow!("Coordinator task has been closed."))
    }

    pub(crate) async fn client_request(
        &self,
        conn: ConnId,
        peer: String,
        request: Request,
    ) -> anyhow::Result<Response> {
        let (responder, receiver) = oneshot::channel();
        self.send_msg(ActorMessage::Client {
            conn,
            peer,
            request,
            responder,
        })
        .await?;
        Ok(receiver.await?)
    }

    pub(crate) async fn register_storage(
        &self,
        conn: ConnId,
        args: String,
        link: Arc<dyn StorageLink>,
    ) -> anyhow::Result<Response> {
        let (responder, receiver) = oneshot::channel();
        self.send_msg(ActorMessage::RegisterStorage {
            conn,
            args,
            link,
            responder,
        })
        .await?;
        Ok(receiver.await?)
    }

    pub(crate) async fn adopt_files(&self, node: ConnId, files: Vec<String>) -> anyhow::Result<()> {
        self.send_msg(ActorMessage::AdoptFiles { node, files }).await
    }

    pub(crate) async fn disconnected(&self, conn: ConnId) -> anyhow::Result<()> {
        self.send_msg(ActorMessage::Disconnected { conn }).await
    }
}

/// Parsed SS_INIT arguments: `IP:PORT:file1,file2,...`.
pub(crate) fn parse_ss_init(args: &str) -> Option<(String, u16, Vec<String>)> {
    let (addr, files) = args.trim().rsplit_once(':')?;
    let (ip, port) = addr.rsplit_once(':')?;
    if ip.is_empty() {
        return None;
    }
    let port = port.parse().ok()?;
    let files = files
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    Some((ip.to_string(), port, files))
}

#[derive(Debug)]
pub(crate) struct Coordinator {
    pub(crate) directory: FileDirectory,
    pub(crate) clients: ClientRegistry,
    pub(crate) nodes: StorageRegistry,
    executor: Arc<dyn Executor>,
    rpc_timeout: Option<Duration>,
}

impl Coordinator {
    pub(crate) fn new(
        clients: ClientRegistry,
        executor: Arc<dyn Executor>,
        rpc_timeout: Option<Duration>,
    ) -> Self {
        Self {
            directory: FileDirectory::new(),
            clients,
            nodes: StorageRegistry::new(),
            executor,
            rpc_timeout,
        }
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<ActorMessage>) {
        while let Some(msg) = receiver.recv().await {
            match msg {
                ActorMessage::Client {
                    conn,
                    peer,
                    request,
                    responder,
                } => {
                    let resp = self.handle_client(conn, &peer, request).await;
                    let _ = responder.send(resp);
                }
                ActorMessage::RegisterStorage {
                    conn,
                    args,
                    link,
                    responder,
                } => {
                    let _ = responder.send(self.register_storage(conn, &args, link));
                }
                ActorMessage::AdoptFiles { node, files } => self.adopt_files(node, files).await,
                ActorMessage::Disconnected { conn } => self.disconnected(conn),
            }
        }
        debug!("coordinator stopped");
    }

    pub(crate) async fn handle_client(
        &mut self,
        conn: ConnId,
        peer: &str,
        req: Request,
    ) -> Response {
        if matches!(req.command, Command::ClientInit | Command::RegisterClient) {
            return self.client_init(conn, peer, &req.username);
        }
        let Some(user) = self.clients.user_of(conn).map(str::to_string) else {
            return Response::new(
                Status::NotConnected,
                "Not connected: send CLIENT_INIT first",
            );
        };
        self.clients.touch(conn);
        debug!("{user}: {} {}", req.command, req.args);

        let args = req.args.trim();
        match req.command {
            Command::View => Response::ok(listing::view(&self.directory, &user, args)),
            Command::List => Response::ok(listing::users(&self.clients)),
            Command::Info => self.info(&user, args).await,
            Command::Create => self.create(&user, args).await,
            Command::Delete => self.delete(&user, args).await,
            Command::Read | Command::Stream => self.locate(&user, args, Permission::READ),
            Command::Write => {
                let file = args.split_whitespace().next().unwrap_or("");
                self.locate(&user, file, Permission::WRITE)
            }
            Command::Undo => self.undo(&user, args).await,
            Command::Exec => self.exec(&user, args).await,
            Command::AddAccess => self.add_access(&user, args).await,
            Command::RemAccess => self.rem_access(&user, args).await,
            Command::Heartbeat => Response::ok("alive"),
            other => Response::new(
                Status::InvalidOperation,
                format!("Unknown command: {}", other.code()),
            ),
        }
    }

    fn client_init(&mut self, conn: ConnId, peer: &str, username: &str) -> Response {
        if names::validate_username(username).is_err() {
            return Response::error(Status::InvalidUsername);
        }
        match self.clients.register(username, conn, peer) {
            Ok(_) => {
                info!("client {username} connected from {peer}");
                Response::ok(format!("Welcome {username}! Connected to Docs++"))
            }
            Err(status) => Response::new(
                status,
                format!("User '{username}' is already connected"),
            ),
        }
    }

    fn register_storage(
        &mut self,
        conn: ConnId,
        args: &str,
        link: Arc<dyn StorageLink>,
    ) -> Response {
        let Some((ip, client_port, files)) = parse_ss_init(args) else {
            return Response::new(Status::InvalidFormat, "Expected IP:PORT:file1,file2,...");
        };
        info!(
            "storage server {conn} registered at {ip}:{client_port} with {} files",
            files.len()
        );
        self.nodes.add(StorageNode {
            id: conn,
            ip,
            client_port,
            link,
            last_seen: meta::now(),
        });
        Response::ok(format!("SS registered: {} files", files.len()))
    }

    pub(crate) async fn adopt_files(&mut self, node: ConnId, files: Vec<String>) {
        for name in files {
            if names::validate_filename(&name).is_err() {
                warn!("storage server {node} announced invalid filename {name:?}");
                continue;
            }
            if let Some(existing) = self.directory.lookup(&name)
                && existing.node != node
                && self.nodes.contains(existing.node)
            {
                warn!(
                    "{name} is already served by storage server {}, ignoring copy on {node}",
                    existing.node
                );
                continue;
            }
            let meta = match self
                .storage_call(node, Request::new(Command::GetAcl, "", name.as_str()))
                .await
            {
                Ok(resp) if resp.is_ok() => match FileMeta::parse(&resp.data) {
                    Ok(meta) => meta,
                    Err(err) => {
                        warn!("unreadable metadata for {name} on {node}: {err}");
                        FileMeta::new("")
                    }
                },
                Ok(resp) | Err(resp) => {
                    warn!("GET_ACL for {name} on {node} failed: {}", resp.data);
                    FileMeta::new("")
                }
            };
            self.directory.insert(FileRecord { name, node, meta });
        }
        debug!("directory now holds {} files", self.directory.len());
    }

    pub(crate) fn disconnected(&mut self, conn: ConnId) {
        if let Some(user) = self.clients.disconnect(conn) {
            info!("client {user} disconnected");
        }
        if self.nodes.remove(conn).is_some() {
            warn!(
                "storage server {conn} disconnected, {} files unavailable",
                self.directory.records_on(conn)
            );
        }
    }

    /// Sends `req` to a storage server. The error side is the response to
    /// give the client when the storage server could not be asked at all.
    async fn storage_call(&mut self, node: ConnId, req: Request) -> Result<Response, Response> {
        let Some(link) = self.nodes.get(node).map(|n| Arc::clone(&n.link)) else {
            return Err(Response::new(
                Status::ServerUnavailable,
                "Storage server for this file is unavailable",
            ));
        };
        let command = req.command;
        let result = match self.rpc_timeout {
            Some(limit) => tokio::time::timeout(limit, link.call(req))
                .await
                .unwrap_or(Err(LinkError::Timeout)),
            None => link.call(req).await,
        };
        match result {
            Ok(resp) => {
                self.nodes.touch(node);
                Ok(resp)
            }
            Err(LinkError::Timeout) => {
                warn!("{command} to storage server {node} timed out");
                Err(Response::error(Status::Timeout))
            }
            Err(err) => {
                warn!("{command} to storage server {node} failed: {err}");
                Err(Response::new(
                    Status::Network,
                    format!("Storage server error: {err}"),
                ))
            }
        }
    }

    fn find(&mut self, name: &str) -> Result<Arc<FileRecord>, Response> {
        self.directory
            .find(name)
            .ok_or_else(|| Response::new(Status::NotFound, format!("File '{name}' not found")))
    }

    fn require(&mut self, user: &str, name: &str, need: Permission) -> Result<Arc<FileRecord>, Response> {
        let record = self.find(name)?;
        if !record.meta.access(user).contains(need) {
            let status = if need.can_write() {
                Status::WritePermission
            } else {
                Status::ReadPermission
            };
            return Err(Response::error(status));
        }
        Ok(record)
    }

    async fn create(&mut self, user: &str, name: &str) -> Response {
        if let Err(status) = names::check_filename(name) {
            return Response::error(status);
        }
        if self.directory.contains(name) {
            return Response::new(Status::FileExists, format!("File '{name}' already exists"));
        }
        let Some(node) = self.nodes.next().map(|n| n.id) else {
            return Response::new(Status::ServerUnavailable, "No storage servers available");
        };
        match self
            .storage_call(node, Request::new(Command::Create, user, name))
            .await
        {
            Ok(resp) if resp.is_ok() => {
                self.directory.insert(FileRecord {
                    name: name.to_string(),
                    node,
                    meta: FileMeta::new(user),
                });
                info!("{user} created {name} on storage server {node}");
                Response::ok("File created successfully")
            }
            Ok(resp) | Err(resp) => resp,
        }
    }

    async fn delete(&mut self, user: &str, name: &str) -> Response {
        let record = match self.find(name) {
            Ok(record) => record,
            Err(resp) => return resp,
        };
        match self
            .storage_call(record.node, Request::new(Command::Delete, user, name))
            .await
        {
            Ok(resp) if resp.is_ok() => {
                self.directory.remove(name);
                info!("{user} deleted {name}");
                Response::ok("File deleted successfully")
            }
            Ok(resp) | Err(resp) => resp,
        }
    }

    /// READ, STREAM and WRITE are served by the storage server itself; the
    /// client gets its address.
    fn locate(&mut self, user: &str, name: &str, need: Permission) -> Response {
        let record = match self.require(user, name, need) {
            Ok(record) => record,
            Err(resp) => return resp,
        };
        match self.nodes.get(record.node) {
            Some(node) => Response::ok(node.client_addr()),
            None => Response::new(
                Status::ServerUnavailable,
                format!("Storage server for '{name}' is unavailable"),
            ),
        }
    }

    /// Pulls fresh size and timestamps from the storage server. The ACL
    /// kept here stays authoritative.
    async fn refresh(&mut self, record: &FileRecord) {
        let req = Request::new(Command::GetAcl, "", record.name.as_str());
        let Ok(resp) = self.storage_call(record.node, req).await else {
            return;
        };
        if !resp.is_ok() {
            return;
        }
        match FileMeta::parse(&resp.data) {
            Ok(mut fresh) => {
                fresh.owner = record.meta.owner.clone();
                fresh.acl = record.meta.acl.clone();
                let mut updated = record.clone();
                updated.meta = fresh;
                self.directory.insert(updated);
            }
            Err(err) => warn!("unreadable metadata for {}: {err}", record.name),
        }
    }

    async fn info(&mut self, user: &str, name: &str) -> Response {
        let record = match self.require(user, name, Permission::READ) {
            Ok(record) => record,
            Err(resp) => return resp,
        };
        self.refresh(&record).await;
        let record = self.directory.lookup(name).unwrap_or(record);
        Response::ok(listing::info(&record))
    }

    async fn undo(&mut self, user: &str, name: &str) -> Response {
        let record = match self.require(user, name, Permission::WRITE) {
            Ok(record) => record,
            Err(resp) => return resp,
        };
        match self
            .storage_call(record.node, Request::new(Command::Undo, user, name))
            .await
        {
            Ok(resp) => {
                if resp.is_ok() {
                    self.refresh(&record).await;
                }
                resp
            }
            Err(resp) => resp,
        }
    }

    async fn exec(&mut self, user: &str, name: &str) -> Response {
        let record = match self.require(user, name, Permission::READ) {
            Ok(record) => record,
            Err(resp) => return resp,
        };
        let script = match self
            .storage_call(record.node, Request::new(Command::Exec, user, name))
            .await
        {
            Ok(resp) if resp.is_ok() => resp.data,
            Ok(resp) | Err(resp) => return resp,
        };
        info!("{user} executes {name}");
        let run = self.executor.run(&script);
        let result = match self.rpc_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("EXEC of {name} ran longer than {limit:?}, stopped");
                    return Response::error(Status::Timeout);
                }
            },
            None => run.await,
        };
        match result {
            Ok(out) if out.success => Response::ok(out.output),
            Ok(out) => Response::new(Status::ExecutionFailed, out.output),
            Err(err) => Response::new(Status::ExecutionFailed, err.to_string()),
        }
    }

    async fn add_access(&mut self, user: &str, args: &str) -> Response {
        let parts: Vec<&str> = args.split_whitespace().collect();
        let [flag, name, target] = parts.as_slice() else {
            return Response::new(
                Status::InvalidArgs,
                "Usage: ADDACCESS -R|-W <filename> <username>",
            );
        };
        let perm = match *flag {
            "-R" => Permission::READ,
            "-W" => Permission::WRITE | Permission::READ,
            _ => {
                return Response::new(
                    Status::InvalidArgs,
                    "Invalid permission flag. Use -R or -W",
                );
            }
        };
        if names::validate_username(target).is_err() {
            return Response::error(Status::InvalidUsername);
        }
        let snapshot = match self.owned(user, name) {
            Ok(record) => record,
            Err(resp) => return resp,
        };
        if snapshot.meta.owner == *target {
            return Response::new(
                Status::InvalidOperation,
                "Cannot change the owner's access",
            );
        }

        let mut updated = (*snapshot).clone();
        updated.meta.acl.grant(target, perm);
        self.apply_acl(user, snapshot, updated, "Access granted successfully")
            .await
    }

    async fn rem_access(&mut self, user: &str, args: &str) -> Response {
        let parts: Vec<&str> = args.split_whitespace().collect();
        let [name, target] = parts.as_slice() else {
            return Response::new(Status::InvalidArgs, "Usage: REMACCESS <filename> <username>");
        };
        let snapshot = match self.owned(user, name) {
            Ok(record) => record,
            Err(resp) => return resp,
        };
        if snapshot.meta.owner == *target {
            return Response::new(Status::InvalidOperation, "Cannot remove owner's access");
        }
        if snapshot.meta.acl.get(target).is_none() {
            return Response::new(
                Status::NotFound,
                format!("User '{target}' does not have access to this file"),
            );
        }

        let mut updated = (*snapshot).clone();
        updated.meta.acl.revoke(target);
        self.apply_acl(user, snapshot, updated, "Access revoked successfully")
            .await
    }

    fn owned(&mut self, user: &str, name: &str) -> Result<Arc<FileRecord>, Response> {
        let record = self.find(name)?;
        if !record.meta.is_owner(user) {
            return Err(Response::new(
                Status::OwnerRequired,
                "Only the owner can modify access control",
            ));
        }
        Ok(record)
    }

    /// Installs `updated` and persists its ACL on the owning storage
    /// server. If that fails for any reason `snapshot` is put back, so the
    /// directory never reports an ACL the storage server does not have.
    /// An ACL that does not fit in one UPDATE_ACL frame is refused up front.
    async fn apply_acl(
        &mut self,
        user: &str,
        snapshot: Arc<FileRecord>,
        updated: FileRecord,
        success: &str,
    ) -> Response {
        let args = format!("{} {}", updated.name, updated.meta.acl);
        if args.len() >= ARGS_LEN {
            return Response::new(
                Status::InvalidArgs,
                format!(
                    "Access list of '{}' would be too long to store ({} bytes)",
                    updated.name,
                    args.len()
                ),
            );
        }
        let node = updated.node;
        self.directory.insert(updated);

        let result = self
            .storage_call(node, Request::new(Command::UpdateAcl, user, args))
            .await;
        match result {
            Ok(resp) if resp.is_ok() => {
                info!("{user} changed access to {}", snapshot.name);
                Response::ok(success)
            }
            Ok(resp) | Err(resp) => {
                warn!(
                    "ACL update of {} failed ({}), rolling back",
                    snapshot.name, resp.status
                );
                self.directory.insert((*snapshot).clone());
                resp
            }
        }
    }
}
