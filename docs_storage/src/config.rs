use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageServerConfig {
    /// Address of the name server, e.g. `127.0.0.1:8080`.
    pub name_server: String,
    /// Address the client-facing listener binds to. Port 0 picks a free one.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// IP announced to the name server; clients connect to it directly.
    #[serde(default)]
    pub advertise_ip: Option<String>,
    pub base_path: String,
    #[serde(default = "default_stream_word_delay_ms")]
    pub stream_word_delay_ms: u64,
}

fn default_listen() -> String {
    "0.0.0.0:0".to_string()
}

fn default_stream_word_delay_ms() -> u64 {
    100
}

impl StorageServerConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        Ok(toml::from_str(&std::fs::read_to_string(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_keys() {
        let config: StorageServerConfig = toml::from_str(
            r#"
            name_server = "127.0.0.1:8080"
            base_path = "/tmp/docs"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen, "0.0.0.0:0");
        assert_eq!(config.stream_word_delay_ms, 100);
        assert_eq!(config.advertise_ip, None);
    }
}
