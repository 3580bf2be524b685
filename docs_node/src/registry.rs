//! Connected clients and storage servers.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use docs_core::meta;
use docs_core::protocol::Status;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ConnId;
use crate::storage::StorageLink;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRecord {
    pub username: String,
    pub address: String,
    pub first_seen: i64,
    pub connected_at: i64,
    pub last_seen: i64,
    /// Connection currently used by this user, if any.
    #[serde(skip)]
    pub conn: Option<ConnId>,
}

impl ClientRecord {
    pub fn is_active(&self) -> bool {
        self.conn.is_some()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserRegistryFile {
    #[serde(default)]
    users: Vec<ClientRecord>,
}

/// Every user seen since start (or loaded from the registry file). Records
/// outlive connections; a returning user gets their old record back.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<String, ClientRecord>,
    by_conn: HashMap<ConnId, String>,
    path: Option<PathBuf>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads known users from `path`. A missing file starts an empty
    /// registry that will be written there.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let file: UserRegistryFile = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => UserRegistryFile::default(),
            Err(err) => return Err(err.into()),
        };
        let clients = file
            .users
            .into_iter()
            .map(|c| (c.username.clone(), c))
            .collect();
        Ok(Self {
            clients,
            by_conn: HashMap::new(),
            path: Some(path),
        })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = UserRegistryFile {
            users: self.clients.values().cloned().collect(),
        };
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, toml::to_string_pretty(&file)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(err) = self.save() {
            warn!("failed to save user registry: {err}");
        }
    }

    /// Binds `username` to `conn`. Fails if the user is active on another
    /// connection or this connection already belongs to someone else.
    pub fn register(
        &mut self,
        username: &str,
        conn: ConnId,
        address: &str,
    ) -> Result<&ClientRecord, Status> {
        if let Some(existing) = self.by_conn.get(&conn)
            && existing != username
        {
            return Err(Status::AlreadyConnected);
        }
        let now = meta::now();
        let record = self
            .clients
            .entry(username.to_string())
            .or_insert_with(|| ClientRecord {
                username: username.to_string(),
                address: address.to_string(),
                first_seen: now,
                connected_at: now,
                last_seen: now,
                conn: None,
            });
        if let Some(active) = record.conn
            && active != conn
        {
            return Err(Status::AlreadyConnected);
        }
        if record.conn.is_none() {
            record.connected_at = now;
        }
        record.conn = Some(conn);
        record.address = address.to_string();
        record.last_seen = now;
        self.by_conn.insert(conn, username.to_string());
        debug!("{username} registered on connection {conn}");
        self.persist();
        Ok(&self.clients[username])
    }

    pub fn user_of(&self, conn: ConnId) -> Option<&str> {
        self.by_conn.get(&conn).map(String::as_str)
    }

    pub fn get(&self, username: &str) -> Option<&ClientRecord> {
        self.clients.get(username)
    }

    pub fn touch(&mut self, conn: ConnId) {
        if let Some(name) = self.by_conn.get(&conn)
            && let Some(record) = self.clients.get_mut(name)
        {
            record.last_seen = meta::now();
        }
    }

    /// Marks the user on `conn` inactive, keeping their record.
    pub fn disconnect(&mut self, conn: ConnId) -> Option<String> {
        let name = self.by_conn.remove(&conn)?;
        if let Some(record) = self.clients.get_mut(&name) {
            record.conn = None;
            record.last_seen = meta::now();
        }
        self.persist();
        Some(name)
    }

    /// Active users in connection order.
    pub fn active(&self) -> Vec<&ClientRecord> {
        let mut active: Vec<_> = self.clients.values().filter(|c| c.is_active()).collect();
        active.sort_by_key(|c| (c.connected_at, c.conn));
        active
    }
}

#[derive(Debug, Clone)]
pub struct StorageNode {
    pub id: ConnId,
    pub ip: String,
    pub client_port: u16,
    pub link: Arc<dyn StorageLink>,
    pub last_seen: i64,
}

impl StorageNode {
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.ip, self.client_port)
    }
}

/// Registered storage servers with a round-robin placement cursor.
#[derive(Debug, Default)]
pub struct StorageRegistry {
    nodes: Vec<StorageNode>,
    cursor: usize,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: StorageNode) {
        self.nodes.retain(|n| n.id != node.id);
        self.nodes.push(node);
    }

    pub fn get(&self, id: ConnId) -> Option<&StorageNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: ConnId) -> Option<StorageNode> {
        let pos = self.nodes.iter().position(|n| n.id == id)?;
        Some(self.nodes.remove(pos))
    }

    pub fn touch(&mut self, id: ConnId) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.last_seen = meta::now();
        }
    }

    /// Advances the cursor by one and returns the node it lands on.
    pub fn next(&mut self) -> Option<&StorageNode> {
        if self.nodes.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.nodes.len();
        self.nodes.get(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LinkError;
    use docs_core::{Request, Response};

    #[derive(Debug)]
    struct NullLink;

    #[async_trait::async_trait]
    impl StorageLink for NullLink {
        async fn call(&self, _req: Request) -> Result<Response, LinkError> {
            Err(LinkError::Disconnected)
        }
    }

    fn node(id: ConnId) -> StorageNode {
        StorageNode {
            id,
            ip: "127.0.0.1".into(),
            client_port: 9000 + id as u16,
            link: Arc::new(NullLink),
            last_seen: 0,
        }
    }

    #[test]
    fn round_robin_cycles() {
        let mut nodes = StorageRegistry::new();
        assert!(nodes.next().is_none());
        nodes.add(node(1));
        nodes.add(node(2));
        nodes.add(node(3));
        let picks: Vec<_> = (0..6).map(|_| nodes.next().unwrap().id).collect();
        assert_eq!(picks, vec![2, 3, 1, 2, 3, 1]);
        nodes.remove(3);
        assert!(nodes.next().is_some());
    }

    #[test]
    fn rejoin_reuses_record() {
        let mut clients = ClientRegistry::new();
        let first_seen = clients.register("alice", 1, "a:1").unwrap().first_seen;
        assert_eq!(
            clients.register("alice", 2, "a:2").unwrap_err(),
            Status::AlreadyConnected
        );
        assert_eq!(clients.disconnect(1).as_deref(), Some("alice"));
        assert!(clients.active().is_empty());
        let record = clients.register("alice", 2, "a:2").unwrap();
        assert_eq!(record.first_seen, first_seen);
        assert_eq!(record.address, "a:2");
        assert_eq!(clients.user_of(2), Some("alice"));
        assert_eq!(clients.user_of(1), None);
    }

    #[test]
    fn connection_cannot_switch_user() {
        let mut clients = ClientRegistry::new();
        clients.register("alice", 1, "a:1").unwrap();
        assert!(clients.register("alice", 1, "a:1").is_ok());
        assert_eq!(
            clients.register("bob", 1, "a:1").unwrap_err(),
            Status::AlreadyConnected
        );
    }

    #[test]
    fn registry_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        let mut clients = ClientRegistry::load(&path).unwrap();
        clients.register("alice", 1, "127.0.0.1:5000").unwrap();
        clients.register("bob", 2, "127.0.0.1:5001").unwrap();
        clients.disconnect(2);

        let loaded = ClientRegistry::load(&path).unwrap();
        assert!(loaded.active().is_empty());
        assert_eq!(loaded.get("bob").unwrap().address, "127.0.0.1:5001");
        assert!(loaded.get("alice").is_some());
    }
}
