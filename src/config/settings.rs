//! Configuration settings and validation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Deserializer};

use crate::walker::path_depth;
use crate::{Error, Result};

/// Day name that matches every weekday.
pub const EVERY_DAY: &str = "Everyday";

/// Number of documents per bulk request unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 255;

/// Main configuration, read from the YAML job file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Cluster name stamped into every document.
    #[serde(default)]
    pub cluster_name: String,

    /// Mount point every job location is relative to.
    pub mount_dir: PathBuf,

    /// Directory for duc database files.
    pub output_dir: PathBuf,

    /// Weekdays on which nothing runs.
    #[serde(default)]
    pub skip_days: Vec<String>,

    /// What to do when a job finishes indexing with errors.
    #[serde(default)]
    pub on_index_error: FailurePolicy,

    /// External measurement tool settings.
    #[serde(default)]
    pub duc: DucConfig,

    /// Index store settings.
    #[serde(rename = "elasticSearch")]
    pub elasticsearch: ElasticsearchConfig,

    /// Per-day job lists.
    #[serde(default)]
    pub jobs: Vec<DayConfig>,
}

/// Jobs scheduled for one day (or every day).
#[derive(Debug, Clone, Deserialize)]
pub struct DayConfig {
    /// Weekday name, or `Everyday`.
    pub day: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// One measurement job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(rename = "type")]
    pub volume_type: VolumeType,

    /// Location relative to the mount directory.
    pub location: PathBuf,

    pub job_type: JobType,

    /// Subtrees to leave out, relative to `location`.
    #[serde(default)]
    pub skip_dirs: Vec<PathBuf>,

    /// Overrides the volume type's default depth.
    #[serde(default)]
    pub depth: Option<usize>,
}

/// Kind of volume a job measures; decides depth and document shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    Global,
    Project,
    Personal,
}

/// Whether a job measures its location or the directories below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    SingleDir,
    SubDirs,
}

/// Caller policy for a job whose indexing finished with errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and exit non-zero.
    #[default]
    Abort,
    /// Log, carry on with the next job, exit non-zero at the end.
    Continue,
}

/// Settings for the `duc` disk usage tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DucConfig {
    #[serde(default = "default_duc_binary")]
    pub binary: String,

    /// Run indexing under `nice -n 19 ionice -c 3`.
    #[serde(default = "default_true")]
    pub low_priority: bool,
}

/// Elasticsearch connection and bulk settings.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,

    pub host: String,

    #[serde(deserialize_with = "port_from_str_or_int")]
    pub port: u16,

    /// Basic auth user. The password is read from `ES_PASSWORD`.
    #[serde(default)]
    pub id: String,

    pub index_name: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Create the index with the built-in mapping when it is missing.
    #[serde(default)]
    pub create_index: bool,
}

fn default_duc_binary() -> String {
    "duc".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_scheme() -> String {
    "http".to_string()
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

const fn default_timeout_secs() -> u64 {
    30
}

fn port_from_str_or_int<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Int(u16),
        Str(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Int(port) => Ok(port),
        Port::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl Default for DucConfig {
    fn default() -> Self {
        Self {
            binary: default_duc_binary(),
            low_priority: true,
        }
    }
}

impl fmt::Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field("url", &self.base_url())
            .field("id", &self.id)
            .field("index_name", &self.index_name)
            .field("batch_size", &self.batch_size)
            .field("timeout_secs", &self.timeout_secs)
            .field("create_index", &self.create_index)
            .finish()
    }
}

impl ElasticsearchConfig {
    /// Base URL of the cluster, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host.trim(), self.port)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl VolumeType {
    /// Depth below the mount directory at which volumes of this type live.
    #[must_use]
    pub const fn default_depth(self) -> usize {
        match self {
            Self::Global | Self::Personal => 2,
            Self::Project => 5,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Project => "project",
            Self::Personal => "personal",
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SingleDir => "singleDir",
            Self::SubDirs => "subDirs",
        })
    }
}

impl Target {
    /// Target depth for the walk, counted in segments below the mount directory.
    #[must_use]
    pub fn target_depth(&self) -> usize {
        self.depth.unwrap_or_else(|| self.volume_type.default_depth())
    }

    /// Skip directories rewritten relative to the mount directory.
    #[must_use]
    pub fn exclusions(&self) -> Vec<PathBuf> {
        self.skip_dirs
            .iter()
            .map(|dir| self.location.join(dir))
            .collect()
    }
}

impl Config {
    /// Load and validate a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read '{}': {e}", path.display()))
        })?;
        let config = Self::from_yaml(&contents)?;
        tracing::debug!(path = %path.display(), jobs = config.jobs.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or the configuration is invalid.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)
            .map_err(|e| Error::config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.mount_dir.as_os_str().is_empty() {
            return Err(Error::config("mountDir cannot be empty"));
        }

        let es = &self.elasticsearch;
        if es.host.trim().is_empty() {
            return Err(Error::config("elasticSearch.host cannot be empty"));
        }
        if es.index_name.is_empty() {
            return Err(Error::config("elasticSearch.indexName cannot be empty"));
        }
        if es.batch_size == 0 {
            return Err(Error::config("elasticSearch.batchSize must be at least 1"));
        }
        if !matches!(es.scheme.as_str(), "http" | "https") {
            return Err(Error::config(format!(
                "invalid scheme '{}', must be http or https",
                es.scheme
            )));
        }

        for day in &self.skip_days {
            parse_weekday(day)
                .ok_or_else(|| Error::config(format!("invalid skip day '{day}'")))?;
        }

        for day in &self.jobs {
            if !day.matches_every_day() && parse_weekday(&day.day).is_none() {
                return Err(Error::config(format!(
                    "invalid day '{}', must be a weekday name or {EVERY_DAY}",
                    day.day
                )));
            }
            for target in &day.targets {
                target.validate()?;
            }
        }

        Ok(())
    }
}

impl Target {
    fn validate(&self) -> Result<()> {
        if self.location.is_absolute() {
            return Err(Error::config(format!(
                "location '{}' must be relative to mountDir",
                self.location.display()
            )));
        }
        if let Some(dir) = self.skip_dirs.iter().find(|dir| dir.is_absolute()) {
            return Err(Error::config(format!(
                "skipDir '{}' must be relative to location '{}'",
                dir.display(),
                self.location.display()
            )));
        }
        if self.job_type == JobType::SubDirs && self.target_depth() < path_depth(&self.location) {
            return Err(Error::config(format!(
                "depth {} is above location '{}'",
                self.target_depth(),
                self.location.display()
            )));
        }
        Ok(())
    }
}

impl DayConfig {
    /// Whether this entry applies to every weekday.
    #[must_use]
    pub fn matches_every_day(&self) -> bool {
        self.day.eq_ignore_ascii_case(EVERY_DAY)
    }

    /// Whether this entry applies to the given weekday.
    #[must_use]
    pub fn matches(&self, weekday: Weekday) -> bool {
        self.matches_every_day() || parse_weekday(&self.day) == Some(weekday)
    }
}

/// Parse a full or abbreviated weekday name, case-insensitively.
#[must_use]
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    name.trim().parse().ok()
}
