use anyhow::{Context, Result};
use docs_storage::StorageServerConfig;

use crate::helpers::{ConfigPaths, load_name_server_config, load_storage_config};

mod client;

pub use client::run_client;

pub async fn run_command(paths: &ConfigPaths, cmd: crate::Commands) -> Result<()> {
    match cmd {
        crate::Commands::Config { cmd } => cmd.run(paths),
        crate::Commands::NameServer {
            listen,
            rpc_timeout_secs,
        } => {
            let mut config = load_name_server_config(&paths.name_server_file)?;
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if rpc_timeout_secs.is_some() {
                config.rpc_timeout_secs = rpc_timeout_secs;
            }
            docs_node::run_name_server(config).await
        }
        crate::Commands::StorageServer {
            name_server,
            listen,
            advertise_ip,
            base_path,
        } => {
            let mut config = match load_storage_config(&paths.storage_file)? {
                Some(config) => config,
                None => StorageServerConfig {
                    name_server: name_server.clone().context(
                        "no storage config found, run `docs config init` or pass --name-server",
                    )?,
                    listen: "0.0.0.0:0".to_owned(),
                    advertise_ip: None,
                    base_path: paths.storage_base_path().to_string_lossy().into_owned(),
                    stream_word_delay_ms: 100,
                },
            };
            if let Some(name_server) = name_server {
                config.name_server = name_server;
            }
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if advertise_ip.is_some() {
                config.advertise_ip = advertise_ip;
            }
            if let Some(base_path) = base_path {
                config.base_path = base_path.to_string_lossy().into_owned();
            }
            docs_storage::run_storage_server(config).await
        }
        crate::Commands::Client { addr, user, cmd } => run_client(&addr, &user, cmd).await,
    }
}
