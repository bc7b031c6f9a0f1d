//! CLI + TOML configuration loading. CLI flags take priority, falling back to a TOML
//! file named with `--config`, falling back to type defaults. This is a thin
//! collaborator — it does not gate the engine's own test coverage.
use super::*;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}", path.display()))]
    ReadFile { source: io::Error, path: PathBuf },
    #[snafu(display("failed to parse config file {}", path.display()))]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub stratum_endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub mode: Option<String>,
    pub cpu_cores: Option<usize>,
    pub throttle: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub address: Option<String>,
    pub chain: Option<Chain>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

/// Layered configuration for every session kind. CLI subcommands read their slice and
/// override individual fields with flags before session startup; nothing here is
/// required until a subcommand actually needs it, so a partially-filled file is fine
/// for e.g. `mine`-only deployments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mining: MiningConfig,
    pub node: NodeConfig,
    pub trade: TradeConfig,
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path).context(ReadFileSnafu { path })?;

        toml::from_str(&contents).context(ParseSnafu { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_yields_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert!(config.mining.stratum_endpoint.is_none());
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(
            &path,
            "[mining]\nstratum_endpoint = \"pool.example.com:3333\"\nusername = \"alice\"\n",
        )
        .unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(
            config.mining.stratum_endpoint.as_deref(),
            Some("pool.example.com:3333")
        );
        assert_eq!(config.mining.username.as_deref(), Some("alice"));
        assert!(config.node.address.is_none());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = EngineConfig::load(Some(Path::new("/nonexistent/engine.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
