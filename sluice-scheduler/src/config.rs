//! Scheduler configuration
//!
//! Defines all configurable parameters for the scheduler including the
//! watched namespace, cluster connection, storage and backoff settings.

use std::path::PathBuf;
use std::time::Duration;

/// Which queue store backs the pending queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// JSON records on local disk, survives restarts
    File,
    /// Process memory only
    Memory,
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            "memory" => Ok(StoreKind::Memory),
            other => anyhow::bail!("unknown store kind '{}' (expected file or memory)", other),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace whose queue this instance reconciles
    pub namespace: String,

    /// Cluster API base URL (e.g., "http://localhost:8001")
    pub cluster_url: String,

    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// Root directory of the file queue store
    pub data_dir: PathBuf,

    /// Queue store implementation
    pub store: StoreKind,

    /// Fallback interval between passes when no trigger arrives
    pub poll_interval: Duration,

    /// Delay after the first quota denial
    pub backoff_base: Duration,

    /// Upper bound for the backoff delay
    pub backoff_max: Duration,

    /// Timeout for a single probe or submit call
    pub call_timeout: Duration,

    /// Drop a job's record once the cluster accepted it
    pub prune_scheduled: bool,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(namespace: String, cluster_url: String) -> Self {
        Self {
            namespace,
            cluster_url,
            bind_addr: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("./data"),
            store: StoreKind::File,
            poll_interval: Duration::from_secs(10),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300), // 5 minutes
            call_timeout: Duration::from_secs(10),
            prune_scheduled: false,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SLUICE_NAMESPACE (required)
    /// - SLUICE_CLUSTER_URL (required)
    /// - SLUICE_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - SLUICE_DATA_DIR (optional, default: ./data)
    /// - SLUICE_STORE (optional, file|memory, default: file)
    /// - SLUICE_POLL_INTERVAL (optional, seconds, default: 10)
    /// - SLUICE_BACKOFF_BASE (optional, seconds, default: 5)
    /// - SLUICE_BACKOFF_MAX (optional, seconds, default: 300)
    /// - SLUICE_CALL_TIMEOUT (optional, seconds, default: 10)
    /// - SLUICE_PRUNE_SCHEDULED (optional, true|false, default: false)
    pub fn from_env() -> anyhow::Result<Self> {
        let namespace = std::env::var("SLUICE_NAMESPACE")
            .map_err(|_| anyhow::anyhow!("SLUICE_NAMESPACE environment variable not set"))?;

        let cluster_url = std::env::var("SLUICE_CLUSTER_URL")
            .map_err(|_| anyhow::anyhow!("SLUICE_CLUSTER_URL environment variable not set"))?;

        let mut config = Self::new(namespace, cluster_url);

        if let Ok(addr) = std::env::var("SLUICE_BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Ok(dir) = std::env::var("SLUICE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(kind) = std::env::var("SLUICE_STORE") {
            config.store = kind.parse()?;
        }

        if let Some(interval) = env_secs("SLUICE_POLL_INTERVAL") {
            config.poll_interval = interval;
        }

        if let Some(base) = env_secs("SLUICE_BACKOFF_BASE") {
            config.backoff_base = base;
        }

        if let Some(max) = env_secs("SLUICE_BACKOFF_MAX") {
            config.backoff_max = max;
        }

        if let Some(timeout) = env_secs("SLUICE_CALL_TIMEOUT") {
            config.call_timeout = timeout;
        }

        if let Ok(value) = std::env::var("SLUICE_PRUNE_SCHEDULED") {
            config.prune_scheduled = parse_flag(&value)?;
        }

        Ok(config)
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if self.cluster_url.is_empty() {
            anyhow::bail!("cluster_url cannot be empty");
        }

        if !self.cluster_url.starts_with("http://") && !self.cluster_url.starts_with("https://") {
            anyhow::bail!("cluster_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.backoff_base.is_zero() {
            anyhow::bail!("backoff_base must be greater than 0");
        }

        if self.backoff_max < self.backoff_base {
            anyhow::bail!("backoff_max must not be smaller than backoff_base");
        }

        if self.call_timeout.is_zero() {
            anyhow::bail!("call_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("default".to_string(), "http://localhost:8001".to_string())
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => anyhow::bail!("expected true or false, got '{}'", other),
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
