//! Docs++ name server.
//!
//! The name server keeps the file directory, the per-file ACLs and the set of
//! connected users and storage servers. Metadata requests are answered here;
//! content operations are either forwarded to the storage server holding the
//! file or answered with its address so the client can connect directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

pub mod config;
mod coordinator;
pub mod directory;
pub mod exec;
pub mod registry;
mod server;
pub mod storage;

pub use config::NameServerConfig;
pub use exec::{ExecOutput, Executor, ShellExecutor};

/// Identifies one accepted connection. Storage servers are known by the id
/// of the connection they registered on.
pub type ConnId = u64;

pub struct NameServer {
    listener: TcpListener,
    coordinator: coordinator::CoordinatorHandle,
}

impl NameServer {
    pub async fn bind(config: &NameServerConfig) -> anyhow::Result<Self> {
        Self::bind_with_executor(config, Arc::new(ShellExecutor)).await
    }

    pub async fn bind_with_executor(
        config: &NameServerConfig,
        executor: Arc<dyn Executor>,
    ) -> anyhow::Result<Self> {
        let clients = match &config.user_registry_file {
            Some(path) => registry::ClientRegistry::load(path)
                .with_context(|| format!("loading user registry {path}"))?,
            None => registry::ClientRegistry::new(),
        };
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("binding {}", config.listen))?;
        let coordinator = coordinator::Coordinator::new(
            clients,
            executor,
            config.rpc_timeout_secs.map(Duration::from_secs),
        );
        Ok(Self {
            listener,
            coordinator: coordinator::CoordinatorHandle::spawn(coordinator),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("name server listening on {addr}");
        }
        server::accept_loop(self.listener, self.coordinator).await;
    }
}

pub async fn run_name_server(config: NameServerConfig) -> anyhow::Result<()> {
    let server = NameServer::bind(&config).await?;
    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => println!("Shutting down."),
    }
    Ok(())
}
