use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use docs_node::NameServerConfig;
use docs_storage::StorageServerConfig;
use std::path::{Path, PathBuf};

/// Where config files and default data directories live.
pub struct ConfigPaths {
    pub name_server_file: PathBuf,
    pub storage_file: PathBuf,
    pub storage_name: String,
    pub data_dir: PathBuf,
}

impl ConfigPaths {
    pub fn new(dirs: &ProjectDirs, storage_name: &str) -> Self {
        let config_root = dirs.config_dir();
        Self {
            name_server_file: config_root.join("name_server.toml"),
            storage_file: config_root
                .join("storage")
                .join(storage_name)
                .with_extension("toml"),
            storage_name: storage_name.to_owned(),
            data_dir: dirs.data_dir().to_path_buf(),
        }
    }

    pub fn user_registry_file(&self) -> PathBuf {
        self.data_dir.join("users.toml")
    }

    pub fn storage_base_path(&self) -> PathBuf {
        self.data_dir.join("storage").join(&self.storage_name)
    }
}

/// Reads the name server config, or the defaults when there is no file yet.
pub fn load_name_server_config(path: &Path) -> Result<NameServerConfig> {
    if !path.exists() {
        return Ok(NameServerConfig::default());
    }
    NameServerConfig::load(path).with_context(|| format!("reading {}", path.display()))
}

pub fn load_storage_config(path: &Path) -> Result<Option<StorageServerConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    StorageServerConfig::load(path)
        .with_context(|| format!("reading {}", path.display()))
        .map(Some)
}

/// Parses one `INDEX=WORD` edit of `docs client write`.
pub fn parse_edit(s: &str) -> Result<(usize, &str)> {
    let (index, word) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected INDEX=WORD, got '{s}'"))?;
    let index = index
        .trim()
        .parse()
        .with_context(|| format!("invalid word index in '{s}'"))?;
    if word.is_empty() || word.contains(char::is_whitespace) {
        return Err(anyhow!("'{s}' must replace exactly one word"));
    }
    Ok((index, word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_split_on_first_equals() {
        assert_eq!(parse_edit("0=Hello").unwrap(), (0, "Hello"));
        assert_eq!(parse_edit("3=a=b").unwrap(), (3, "a=b"));
    }

    #[test]
    fn bad_edits_are_rejected() {
        assert!(parse_edit("Hello").is_err());
        assert!(parse_edit("x=Hello").is_err());
        assert!(parse_edit("1=").is_err());
        assert!(parse_edit("1=two words").is_err());
    }
}
