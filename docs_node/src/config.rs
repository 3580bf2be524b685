use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct NameServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Upper bound for a single request to a storage server. Without it a
    /// stalled storage server holds up every other request.
    #[serde(default)]
    pub rpc_timeout_secs: Option<u64>,
    /// Where known users are remembered across restarts.
    #[serde(default)]
    pub user_registry_file: Option<String>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            rpc_timeout_secs: None,
            user_registry_file: None,
        }
    }
}

impl NameServerConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        Ok(toml::from_str(&std::fs::read_to_string(path)?)?)
    }
}
