//! Docs++ storage server.
//!
//! A storage server keeps file bytes on local disk, registers its files with
//! the name server, answers the name server's CREATE / DELETE / UNDO /
//! UPDATE_ACL / GET_ACL / EXEC requests and serves READ, STREAM and WRITE
//! sessions to clients that connect to it directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

pub mod config;
pub mod locks;
mod nm_link;
mod server;
pub mod session;
pub mod store;

pub use config::StorageServerConfig;
pub use locks::SentenceLocks;
pub use store::DocStore;

/// State shared by the name server link and every client connection.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) store: Arc<DocStore>,
    pub(crate) locks: Arc<SentenceLocks>,
    pub(crate) word_delay: Duration,
}

pub struct StorageServer {
    shared: Arc<Shared>,
    listener: TcpListener,
    name_server: String,
    advertise_ip: String,
}

impl StorageServer {
    /// Prepares the storage directory and binds the client listener.
    pub async fn bind(config: &StorageServerConfig) -> anyhow::Result<Self> {
        let store = DocStore::new(&config.base_path);
        store
            .init()
            .await
            .with_context(|| format!("creating storage directory {}", config.base_path))?;
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("binding client listener on {}", config.listen))?;
        let advertise_ip = match &config.advertise_ip {
            Some(ip) => ip.clone(),
            None => {
                let ip = listener.local_addr()?.ip();
                if ip.is_unspecified() {
                    "127.0.0.1".to_string()
                } else {
                    ip.to_string()
                }
            }
        };
        Ok(Self {
            shared: Arc::new(Shared {
                store: Arc::new(store),
                locks: SentenceLocks::new(),
                word_delay: Duration::from_millis(config.stream_word_delay_ms),
            }),
            listener,
            name_server: config.name_server.clone(),
            advertise_ip,
        })
    }

    pub fn client_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Registers with the name server and serves until the name server
    /// connection ends.
    pub async fn run(self) -> anyhow::Result<()> {
        let port = self.listener.local_addr()?.port();
        let advertise = format!("{}:{port}", self.advertise_ip);
        let files = self.shared.store.scan().await?;
        info!(
            "storage at {} holds {} files, clients connect to {advertise}",
            self.shared.store.base_path().display(),
            files.len()
        );

        let link = nm_link::register(&self.name_server, &advertise, &files).await?;
        let clients = tokio::spawn(server::serve_clients(
            self.listener,
            Arc::clone(&self.shared),
        ));
        let result = nm_link::serve_name_server(link, &self.shared).await;
        clients.abort();
        result
    }
}

/// Runs a storage server until it is interrupted or the name server goes
/// away.
pub async fn run_storage_server(config: StorageServerConfig) -> anyhow::Result<()> {
    let server = StorageServer::bind(&config).await?;
    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Shutting down.");
            Ok(())
        }
    }
}
