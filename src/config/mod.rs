//! Configuration management for nfscheck.
//!
//! Supports configuration from:
//! - Command-line arguments (log level, weekday override, dry run)
//! - Environment variables (`ES_PASSWORD`, `NFSCHECK_*`)
//! - YAML configuration file (jobs, mount point, index store)

mod settings;

pub use settings::{
    parse_weekday, Config, DayConfig, DucConfig, ElasticsearchConfig, FailurePolicy, JobType,
    Target, VolumeType, DEFAULT_BATCH_SIZE, EVERY_DAY,
};
