use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{BqPipeError, Result};

const DEFAULT_TEMP_PREFIX: &str = "tmp";
const DEFAULT_JOB_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_STREAM_BUFFER: usize = 16;

/// Defaults shared by every operation: which project and dataset to address,
/// the billing tier cap for queries, and where temporary exports land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset: String,
    #[serde(default)]
    pub maximum_billing_tier: Option<u32>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,
    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

fn default_temp_prefix() -> String {
    DEFAULT_TEMP_PREFIX.to_string()
}

fn default_job_poll_interval_ms() -> u64 {
    DEFAULT_JOB_POLL_INTERVAL_MS
}

fn default_stream_buffer() -> usize {
    DEFAULT_STREAM_BUFFER
}

impl WarehouseConfig {
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            maximum_billing_tier: None,
            bucket: None,
            temp_prefix: default_temp_prefix(),
            job_poll_interval_ms: DEFAULT_JOB_POLL_INTERVAL_MS,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| BqPipeError::Config(format!("Config file not found: {}", path.display())))?;

        let config: WarehouseConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_maximum_billing_tier(mut self, tier: u32) -> Self {
        self.maximum_billing_tier = Some(tier);
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = prefix.into();
        self
    }

    pub fn with_job_poll_interval(mut self, interval: Duration) -> Self {
        self.job_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity;
        self
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(BqPipeError::Config("project_id must not be empty".into()));
        }
        if self.dataset.trim().is_empty() {
            return Err(BqPipeError::Config("dataset must not be empty".into()));
        }
        if self.stream_buffer == 0 {
            return Err(BqPipeError::Config("stream_buffer must be at least 1".into()));
        }
        Ok(())
    }

    pub fn require_bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .ok_or_else(|| BqPipeError::Config("No storage bucket configured".into()))
    }
}
