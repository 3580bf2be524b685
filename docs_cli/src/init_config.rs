use std::{fs, io::Write, path::Path};

use anyhow::Context;
use clap::Subcommand;
use toml_edit::{DocumentMut, value};
use tracing::info;

use crate::helpers::{ConfigPaths, load_name_server_config, load_storage_config};

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the name server and storage server config files, keeping
    /// values that are already set
    Init {
        /// Name server address the storage server registers with
        #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
        name_server: String,
    },
    /// Prints the configs as the servers would load them
    Show,
}

impl CmdConfig {
    pub fn run(self, paths: &ConfigPaths) -> anyhow::Result<()> {
        match self {
            Self::Init { name_server } => {
                let mut doc = open_doc(&paths.name_server_file)?;
                doc.entry("listen").or_insert(value("0.0.0.0:8080"));
                doc.entry("user_registry_file").or_insert(value(
                    paths.user_registry_file().to_string_lossy().into_owned(),
                ));
                write_doc(&paths.name_server_file, &doc)?;

                let base_path = paths.storage_base_path();
                let mut doc = open_doc(&paths.storage_file)?;
                doc["name_server"] = value(name_server);
                doc.entry("listen").or_insert(value("0.0.0.0:0"));
                doc.entry("base_path")
                    .or_insert(value(base_path.to_string_lossy().into_owned()));
                write_doc(&paths.storage_file, &doc)?;

                if !base_path.exists() {
                    info!("creating storage directory {base_path:?}");
                    fs::create_dir_all(&base_path)?;
                }
            }
            Self::Show => {
                let config = load_name_server_config(&paths.name_server_file)?;
                println!("# {}", paths.name_server_file.display());
                println!("{}", toml::to_string(&config)?);
                match load_storage_config(&paths.storage_file)? {
                    Some(config) => {
                        println!("# {}", paths.storage_file.display());
                        println!("{}", toml::to_string(&config)?);
                    }
                    None => println!("# no storage config at {}", paths.storage_file.display()),
                }
            }
        }
        Ok(())
    }
}

fn open_doc(path: &Path) -> anyhow::Result<DocumentMut> {
    let text = if path.exists() {
        fs::read_to_string(path)?
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        String::new()
    };
    text.parse::<DocumentMut>()
        .with_context(|| format!("could not parse config file {}", path.display()))
}

fn write_doc(path: &Path, doc: &DocumentMut) -> anyhow::Result<()> {
    info!("writing to config file {path:?}");

    let tmp_path = path.with_extension("tmp");
    let mut tmp = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    tmp.write_all(doc.to_string().as_bytes())?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
