//! Configuration types for media-dumper

use crate::error::{Error, Result};
use crate::retry::BackoffSchedule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persist worker pool and dispatch limits
///
/// These are fixed for the lifetime of a [`Pipeline`](crate::pipeline::Pipeline);
/// nothing adapts them at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of long-lived persist workers (default: 20)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the shared request queue (None = same as `workers`)
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Maximum conversations enumerated concurrently by one dispatch (default: 5)
    #[serde(default = "default_conversation_concurrency")]
    pub conversation_concurrency: usize,

    /// How long shutdown waits for queued requests before stopping workers (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl PipelineConfig {
    /// Effective queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers).max(1)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
            conversation_concurrency: default_conversation_concurrency(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Retry configuration for network fetches and dedup polling
///
/// The same schedule bounds fetch retries (one attempt per step, terminal after the
/// last) and paces dedup polling (cycled, restarting after the last step).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Wait durations between attempts (default: 2s, 4s, 8s, 16s, 32s)
    #[serde(default = "default_schedule", with = "duration_list_serde")]
    pub schedule: Vec<Duration>,
}

impl RetryConfig {
    /// Build the backoff schedule described by this config
    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::new(self.schedule.clone())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
        }
    }
}

/// Deduplication cache policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Time without a holder refresh after which a waiter may take over an in-progress claim (default: 10 minutes, None = never)
    #[serde(
        default = "default_claim_timeout",
        with = "optional_duration_serde"
    )]
    pub claim_timeout: Option<Duration>,

    /// How long a completed URL stays remembered (default: None = for the pipeline's lifetime)
    #[serde(default, with = "optional_duration_serde")]
    pub done_ttl: Option<Duration>,

    /// Upper bound on remembered completed URLs (default: None = unbounded)
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            claim_timeout: default_claim_timeout(),
            done_ttl: None,
            max_entries: None,
        }
    }
}

/// Shared HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Idle connections kept per host (default: 100)
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout (default: None = no limit, large videos take a while)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// User-Agent header sent with every fetch
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: default_max_connections_per_host(),
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Metadata embedding settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Embed description/capture time/GPS into downloaded files (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to the exiftool executable (auto-detected if None)
    #[serde(default)]
    pub exiftool_path: Option<PathBuf>,

    /// Whether to search PATH for exiftool if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exiftool_path: None,
            search_path: true,
        }
    }
}

/// Main configuration for a media-dumper pipeline
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool and dispatch limits
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Backoff schedule
    #[serde(default)]
    pub retry: RetryConfig,

    /// Deduplication policy
    #[serde(default)]
    pub dedup: DedupConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Metadata embedding
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl Config {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_slice(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            return Err(Error::Config {
                message: "at least one persist worker is required".to_string(),
                key: Some("pipeline.workers".to_string()),
            });
        }
        if self.pipeline.conversation_concurrency == 0 {
            return Err(Error::Config {
                message: "conversation concurrency must be positive".to_string(),
                key: Some("pipeline.conversation_concurrency".to_string()),
            });
        }
        if self.retry.schedule.is_empty() {
            return Err(Error::Config {
                message: "retry schedule must contain at least one step".to_string(),
                key: Some("retry.schedule".to_string()),
            });
        }
        if self.http.max_connections_per_host == 0 {
            return Err(Error::Config {
                message: "connection pool must allow at least one connection".to_string(),
                key: Some("http.max_connections_per_host".to_string()),
            });
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    20
}

fn default_conversation_concurrency() -> usize {
    5
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_schedule() -> Vec<Duration> {
    [2, 4, 8, 16, 32]
        .into_iter()
        .map(Duration::from_secs)
        .collect()
}

fn default_claim_timeout() -> Option<Duration> {
    Some(Duration::from_secs(600))
}

fn default_max_connections_per_host() -> usize {
    100
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("media-dumper/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

// Backoff steps are fractional seconds so sub-second schedules survive a round trip
mod duration_list_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(durations.iter().map(Duration::as_secs_f64))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Vec::<f64>::deserialize(deserializer)?;
        secs.into_iter()
            .map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .collect()
    }
}
