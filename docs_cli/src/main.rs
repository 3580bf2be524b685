use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod helpers;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which storage server config `storage-server` and `config` work on
    #[arg(short, long, value_name = "NAME", default_value = "local")]
    storage: String,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the name server and storage server configs
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Run the name server
    NameServer {
        /// Address to listen on, overrides the config file
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
        /// Give up on a storage server request after this many seconds
        #[arg(long, value_name = "SECS")]
        rpc_timeout_secs: Option<u64>,
    },
    /// Run a storage server and register it with the name server
    StorageServer {
        /// Name server address, overrides the config file
        #[arg(long, value_name = "ADDR")]
        name_server: Option<String>,
        /// Address for client connections, overrides the config file
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
        /// IP announced to clients
        #[arg(long, value_name = "IP")]
        advertise_ip: Option<String>,
        /// Directory holding the files, overrides the config file
        #[arg(long, value_name = "PATH")]
        base_path: Option<PathBuf>,
    },
    /// Run one request against a name server as USER
    Client {
        /// Name server address
        #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
        addr: String,
        #[arg(short, long, value_name = "USER")]
        user: String,
        #[command(subcommand)]
        cmd: ClientCmd,
    },
}

#[derive(Subcommand)]
enum ClientCmd {
    /// Create an empty file owned by you
    Create { file: String },
    /// Print a file
    Read { file: String },
    /// Print a file word by word as the storage server sends it
    Stream { file: String },
    /// Edit one sentence and write it back
    Write {
        file: String,
        /// Sentence to lock; one past the last sentence starts a new one
        sentence: usize,
        /// Word edits applied in order, e.g. `0=Hello 1=world.`
        #[arg(value_name = "INDEX=WORD", required = true)]
        edits: Vec<String>,
    },
    /// Delete a file you own
    Delete { file: String },
    /// Show size, times and access list of a file
    Info { file: String },
    /// List files
    View {
        /// include files you cannot read
        #[arg(short, long, action = ArgAction::SetTrue)]
        all: bool,
        /// show owner, counts and last access
        #[arg(short, long, action = ArgAction::SetTrue)]
        long: bool,
    },
    /// List connected users
    List,
    /// Restore the file as it was before the last write
    Undo { file: String },
    /// Run the file's content as a shell command on the name server host
    Exec { file: String },
    /// Grant USER read access, or read and write with --write
    AddAccess {
        file: String,
        user: String,
        #[arg(short = 'W', long, action = ArgAction::SetTrue)]
        write: bool,
    },
    /// Remove every permission USER has on a file
    RemAccess { file: String, user: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Configs under ~/.config/docs/:
    // - name_server.toml
    // - storage/<name>.toml
    // Data under ~/.local/share/docs/
    let dirs =
        ProjectDirs::from("", "", "docs").context("failed to determine config directory path")?;
    let paths = helpers::ConfigPaths::new(&dirs, &cli.storage);

    cmd::run_command(&paths, cli.cmd).await
}
