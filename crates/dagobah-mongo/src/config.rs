use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dagobah_core::app::DEFAULT_MAX_ID_ATTEMPTS;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// MongoConfig (root)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub collections: CollectionNames,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_id_attempts")]
    pub max_id_attempts: u32,
    /// Run the Dagobah cascade delete inside a transaction (replica sets only).
    #[serde(default)]
    pub use_transactions: bool,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            collections: CollectionNames::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_id_attempts: default_max_id_attempts(),
            use_transactions: false,
        }
    }
}

impl MongoConfig {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(ConfigError::Toml)
    }

    /// Apply `DAGOBAH_MONGO_HOST`, `DAGOBAH_MONGO_PORT` and
    /// `DAGOBAH_MONGO_DATABASE` overrides from the process environment.
    pub fn apply_process_env(self) -> Result<Self, ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_PORT,
                value: port,
            })?;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = database;
        }
        Ok(self)
    }

    /// `host:port`, used in log fields and connection errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uri(&self) -> String {
        format!(
            "mongodb://{}/?connectTimeoutMS={ms}&serverSelectionTimeoutMS={ms}",
            self.address(),
            ms = self.connect_timeout_ms
        )
    }
}

const ENV_HOST: &str = "DAGOBAH_MONGO_HOST";
const ENV_PORT: &str = "DAGOBAH_MONGO_PORT";
const ENV_DATABASE: &str = "DAGOBAH_MONGO_DATABASE";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_database() -> String {
    "dagobah".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_max_id_attempts() -> u32 {
    DEFAULT_MAX_ID_ATTEMPTS
}

// -----------------------------------------------------------------------------
// CollectionNames
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNames {
    #[serde(default = "default_dagobah_collection")]
    pub dagobah: String,
    #[serde(default = "default_job_collection")]
    pub job: String,
    #[serde(default = "default_log_collection")]
    pub log: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            dagobah: default_dagobah_collection(),
            job: default_job_collection(),
            log: default_log_collection(),
        }
    }
}

fn default_dagobah_collection() -> String {
    "dagobah".to_string()
}

fn default_job_collection() -> String {
    "dagobah_job".to_string()
}

fn default_log_collection() -> String {
    "dagobah_log".to_string()
}

// -----------------------------------------------------------------------------
// ConfigError
// -----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[source] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}
