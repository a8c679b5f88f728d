//! Node configuration, loaded from YAML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dcache_fragment::AssemblerConfig;
use dcache_timestamp::Timestamp;
use dcache_trace::errors::TracingError;
use dcache_trace::Output;
use serde::{Deserialize, Serialize};

use crate::repo::RebroadcastParams;

/// The default trust epoch: claims starting before 2024-01-01T00:00:00Z are
/// ignored. Bumping it invalidates caches from older deployments.
pub const DEFAULT_IGNORE_BEFORE: Timestamp = Timestamp::from_secs(1_704_067_200);

/// Config result
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Loading the config failed
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No file at the given path
    #[error("No dcache config found at this path: {0}")]
    ConfigMissing(PathBuf),

    /// The file is not valid config YAML
    #[error("Config deserialization error: {0}")]
    SerializationError(#[from] serde_yaml::Error),

    /// Could not read the file
    #[error("Error while reading the config: {0}")]
    IoError(#[from] std::io::Error),
}

/// Everything a node needs to know at startup. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcacheConfig {
    /// This node's address, used as the envelope sender
    pub node_id: String,
    /// Claims starting before this are discarded
    pub ignore_before: Timestamp,
    /// Create buckets on first claim rather than refusing the claim
    pub auto_create_buckets: bool,
    /// Directory for the snapshot; no persistence if unset
    pub cache_dir: Option<PathBuf>,
    /// Anti-entropy throttling
    pub rebroadcast: RebroadcastConfig,
    /// Fragmentation of oversized lines
    pub fragments: FragmentConfig,
    /// Tracing filter directives overriding `RUST_LOG`
    pub tracing_override: Option<String>,
}

impl Default for DcacheConfig {
    fn default() -> Self {
        Self {
            node_id: "anonymous-node".to_string(),
            ignore_before: DEFAULT_IGNORE_BEFORE,
            auto_create_buckets: true,
            cache_dir: None,
            rebroadcast: RebroadcastConfig::default(),
            fragments: FragmentConfig::default(),
            tracing_override: None,
        }
    }
}

/// Rebroadcast tunables, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebroadcastConfig {
    /// Minimum time between sends of one fact to one channel
    pub min_delta_s: u64,
    /// Minimum quiet time on a channel before we speak on it
    pub min_silence_s: u64,
    /// Maximum facts sent per pass
    pub max_n: usize,
}

impl Default for RebroadcastConfig {
    fn default() -> Self {
        Self {
            min_delta_s: 60,
            min_silence_s: 5,
            max_n: 10,
        }
    }
}

impl From<RebroadcastConfig> for RebroadcastParams {
    fn from(c: RebroadcastConfig) -> Self {
        Self {
            min_delta: Duration::from_secs(c.min_delta_s),
            min_silence: Duration::from_secs(c.min_silence_s),
            max_n: c.max_n,
        }
    }
}

/// Fragmentation tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentConfig {
    /// Payload bytes per fragment
    pub max_chunk_length: usize,
    /// Seconds a partial payload may wait for its missing fragments
    pub pending_ttl_s: u64,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: 256,
            pending_ttl_s: dcache_fragment::DEFAULT_PENDING_TTL.as_secs(),
        }
    }
}

impl From<FragmentConfig> for AssemblerConfig {
    fn from(c: FragmentConfig) -> Self {
        Self {
            pending_ttl: Duration::from_secs(c.pending_ttl_s),
        }
    }
}

impl DcacheConfig {
    /// Create a config using a testing-friendly node id and no trust epoch,
    /// so claims with small timestamps are kept.
    pub fn testing() -> Self {
        Self {
            node_id: "test-node".to_string(),
            ignore_before: Timestamp::MIN,
            ..Default::default()
        }
    }

    /// Load from a YAML file
    pub fn load_yaml(path: &Path) -> ConfigResult<DcacheConfig> {
        let config_yaml = std::fs::read_to_string(path).map_err(|err| match err {
            e if e.kind() == std::io::ErrorKind::NotFound => ConfigError::ConfigMissing(path.into()),
            e => e.into(),
        })?;
        Self::from_yaml(&config_yaml)
    }

    /// Parse YAML text
    pub fn from_yaml(yaml: &str) -> ConfigResult<DcacheConfig> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Install the global tracing subscriber, with `tracing_override` taking
    /// precedence over the environment.
    pub fn init_tracing(&self, output: Output) -> Result<(), TracingError> {
        match &self.tracing_override {
            Some(directives) => {
                dcache_trace::init_fmt_with_filter(output, dcache_trace::filter_from_directives(directives)?)
            }
            None => dcache_trace::init_fmt(output),
        }
    }
}
