use config::{builder::DefaultState, Config as ConfigLoader, ConfigBuilder, ConfigError, Environment, File};
use opencode_client::{normalize_base_url, ClientConfig, Preferences};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub logging: LoggingConfig,

    /// Where preferences are stored; defaults to the user config directory
    pub preferences_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json`, `pretty` or `compact`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables prefixed `OPENCODE_`, nested with `__`
    ///    (e.g. `OPENCODE_CLIENT__REQUEST_TIMEOUT_SECS=10`)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false));

        Self::finish(builder)
    }

    /// Load config from a specific file, still honouring environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));
        Self::finish(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .add_source(
                Environment::with_prefix("OPENCODE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.preferences_path
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join("opencode-cli").join("preferences.toml")))
            .unwrap_or_else(|| PathBuf::from(".opencode-cli.toml"))
    }

    /// Settle the server address: the `--url` flag, then config/environment,
    /// then the address saved by `connect`
    pub fn resolve_base_url(&mut self, flag: Option<&str>, preferences: &Preferences) -> Option<&str> {
        let resolved = flag
            .and_then(normalize_base_url)
            .or_else(|| normalize_base_url(&self.client.base_url))
            .or_else(|| normalize_base_url(&preferences.base_url));

        self.client.base_url = resolved.unwrap_or_default();
        Some(self.client.base_url.as_str()).filter(|url| !url.is_empty())
    }
}
