//! Runs the day's jobs: walk, measure, shape and index.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc, Weekday};

use super::schedule::{plan, DayPlan};
use crate::config::{Config, FailurePolicy, JobType, Target};
use crate::error::{IndexError, Severity};
use crate::index::{encode_batch, usage_mapping, BulkIndexer, IndexStore, IndexingStats};
use crate::measure::Measure;
use crate::records::{strip_mount, UsageRecord};
use crate::walker::{DepthWalker, ExclusionSet, WalkTarget};
use crate::{Error, Result};

/// Counters for the collection half of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Directories handed to the measurer.
    pub visited: u64,
    /// Documents produced.
    pub measured: u64,
    /// Files at the target depth, and directories the measurer had nothing for.
    pub skipped: u64,
    pub walk_errors: u64,
    pub measure_errors: u64,
    /// Measured paths too short to name a volume, project or user.
    pub unshaped: u64,
}

impl CollectStats {
    fn merge(&mut self, other: &Self) {
        self.visited += other.visited;
        self.measured += other.measured;
        self.skipped += other.skipped;
        self.walk_errors += other.walk_errors;
        self.measure_errors += other.measure_errors;
        self.unshaped += other.unshaped;
    }
}

/// Outcome of one scheduled run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// The weekday was a skip day.
    pub skipped_day: bool,
    pub jobs_run: u64,
    /// Jobs whose indexing finished with errors.
    pub jobs_failed: u64,
    pub collected: CollectStats,
    pub indexed: u64,
    pub errored: u64,
}

impl RunSummary {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.jobs_failed == 0
    }

    /// Turn a run with failed jobs into [`IndexError::Incomplete`].
    ///
    /// # Errors
    ///
    /// Returns an error if any job finished with indexing errors.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(IndexError::Incomplete {
                indexed: self.indexed,
                errored: self.errored,
            }
            .into())
        }
    }
}

/// Walk and measure one target, shaping each measurement into a document.
///
/// Walk and measurement failures are logged and counted; they never stop
/// the job.
pub fn collect_records<M: Measure + ?Sized>(
    config: &Config,
    measurer: &M,
    target: &Target,
    now: DateTime<Utc>,
) -> (Vec<UsageRecord>, CollectStats) {
    let mut collector = Collector {
        config,
        measurer,
        target,
        now,
        records: Vec::new(),
        stats: CollectStats::default(),
    };

    match target.job_type {
        JobType::SingleDir => {
            let dir = config.mount_dir.join(&target.location);
            collector.measure(&dir);
        }
        JobType::SubDirs => {
            let exclusions: ExclusionSet = target.exclusions().into_iter().collect();
            let walker = DepthWalker::new(
                WalkTarget::new(
                    config.mount_dir.clone(),
                    target.location.clone(),
                    target.target_depth(),
                )
                .with_exclusions(exclusions),
            );

            for entry in &walker {
                match entry {
                    Ok(entry) if entry.is_dir => collector.measure(&entry.path),
                    Ok(entry) => {
                        tracing::debug!(path = %entry.path.display(), "Not a directory, skipping");
                        collector.stats.skipped += 1;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Walk error");
                        collector.stats.walk_errors += 1;
                    }
                }
            }
        }
    }

    (collector.records, collector.stats)
}

struct Collector<'a, M: ?Sized> {
    config: &'a Config,
    measurer: &'a M,
    target: &'a Target,
    now: DateTime<Utc>,
    records: Vec<UsageRecord>,
    stats: CollectStats,
}

impl<M: Measure + ?Sized> Collector<'_, M> {
    fn measure(&mut self, dir: &Path) {
        self.stats.visited += 1;
        let measurement = match self.measurer.measure(dir) {
            Ok(Some(measurement)) => measurement,
            Ok(None) => {
                self.stats.skipped += 1;
                return;
            }
            Err(e) => {
                tracing::error!(path = %dir.display(), error = %e, "Measurement failed");
                self.stats.measure_errors += 1;
                return;
            }
        };

        let full_path = strip_mount(&measurement.root, &self.config.mount_dir);
        match UsageRecord::build(
            self.target.volume_type,
            &self.config.cluster_name,
            &full_path,
            &measurement.size,
            self.now,
        ) {
            Some(record) => {
                self.records.push(record);
                self.stats.measured += 1;
            }
            None => {
                tracing::warn!(
                    path = %full_path,
                    volume_type = %self.target.volume_type,
                    "Path too short to name a {} volume, skipping",
                    self.target.volume_type
                );
                self.stats.unshaped += 1;
            }
        }
    }
}

/// Runs the jobs scheduled for a weekday.
pub struct JobRunner<M, S> {
    config: Arc<Config>,
    measurer: Arc<M>,
    indexer: BulkIndexer<S>,
    dry_run: bool,
}

impl<M: Measure + 'static, S: IndexStore> JobRunner<M, S> {
    /// Create a runner writing to the configured index.
    pub fn new(config: Arc<Config>, measurer: M, store: S) -> Self {
        let indexer = BulkIndexer::new(store, config.elasticsearch.index_name.clone())
            .with_batch_size(config.elasticsearch.batch_size);
        Self {
            config,
            measurer: Arc::new(measurer),
            indexer,
            dry_run: false,
        }
    }

    /// Print bulk payloads to stdout instead of indexing them.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every job scheduled for `weekday`.
    ///
    /// A job whose indexing ends with errors stops the run under
    /// [`FailurePolicy::Abort`] and is counted under
    /// [`FailurePolicy::Continue`].
    ///
    /// # Errors
    ///
    /// Returns an error on a fatal failure, or on the first failed job when
    /// the policy is to abort.
    pub async fn run(&self, weekday: Weekday) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let targets = match plan(&self.config, weekday) {
            DayPlan::Skipped => {
                tracing::info!(%weekday, "Skip day, nothing to do");
                summary.skipped_day = true;
                return Ok(summary);
            }
            DayPlan::NoJobs => {
                tracing::info!(%weekday, "No jobs scheduled");
                return Ok(summary);
            }
            DayPlan::Run(targets) => targets,
        };

        tracing::info!(%weekday, jobs = targets.len(), dry_run = self.dry_run, "Starting run");
        if !self.dry_run {
            self.prepare_index().await;
        }

        for target in targets {
            summary.jobs_run += 1;
            match self.run_job(target, &mut summary).await {
                Ok(()) => {}
                Err(e)
                    if e.severity() == Severity::Partial
                        && self.config.on_index_error == FailurePolicy::Continue =>
                {
                    summary.jobs_failed += 1;
                    tracing::warn!(
                        location = %target.location.display(),
                        error = %e,
                        "Job finished with errors, continuing"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        location = %target.location.display(),
                        error = %e,
                        "Job failed, stopping run"
                    );
                    return Err(e);
                }
            }
        }

        tracing::info!(
            jobs = summary.jobs_run,
            failed = summary.jobs_failed,
            indexed = summary.indexed,
            errored = summary.errored,
            "Run complete"
        );
        Ok(summary)
    }

    async fn run_job(&self, target: &Target, summary: &mut RunSummary) -> Result<()> {
        tracing::info!(
            volume_type = %target.volume_type,
            location = %target.location.display(),
            job_type = %target.job_type,
            depth = target.target_depth(),
            "Starting job"
        );

        let config = Arc::clone(&self.config);
        let measurer = Arc::clone(&self.measurer);
        let owned = target.clone();
        let now = Utc::now();
        let (records, collected) = tokio::task::spawn_blocking(move || {
            collect_records(&config, measurer.as_ref(), &owned, now)
        })
        .await
        .map_err(|e| Error::internal(format!("collection task failed: {e}")))?;

        tracing::info!(
            location = %target.location.display(),
            visited = collected.visited,
            documents = collected.measured,
            skipped = collected.skipped,
            walk_errors = collected.walk_errors,
            measure_errors = collected.measure_errors,
            "Collection finished"
        );
        summary.collected.merge(&collected);

        if self.dry_run {
            return print_records(&records);
        }

        let stats = self.indexer.submit(&records).await?;
        stats.log_summary();
        summary.indexed += stats.indexed;
        summary.errored += stats.errored;
        stats.into_result().map(|_: IndexingStats| ())
    }

    /// Create the index with the usage mapping when asked to and missing.
    async fn prepare_index(&self) {
        if !self.config.elasticsearch.create_index {
            return;
        }

        let store = self.indexer.store();
        let index = self.indexer.index();
        match store.index_exists(index).await {
            Ok(true) => tracing::debug!(index, "Index exists"),
            Ok(false) => {
                if let Err(e) = store.create_index(index, &usage_mapping()).await {
                    tracing::warn!(index, error = %e, "Failed to create index");
                }
            }
            Err(e) => tracing::warn!(index, error = %e, "Failed to check index"),
        }
    }
}

fn print_records(records: &[UsageRecord]) -> Result<()> {
    let payload = encode_batch(records, 0)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&payload)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeasureError;
    use crate::index::{MemoryStore, ScriptedReply};
    use crate::measure::Measurement;
    use parking_lot::Mutex;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Reports a fixed size for every existing directory.
    #[derive(Default)]
    struct FixedMeasurer {
        seen: Mutex<Vec<PathBuf>>,
        fail_on: Option<String>,
    }

    impl Measure for FixedMeasurer {
        fn measure(&self, dir: &Path) -> std::result::Result<Option<Measurement>, MeasureError> {
            self.seen.lock().push(dir.to_path_buf());
            if self
                .fail_on
                .as_deref()
                .is_some_and(|name| dir.ends_with(name))
            {
                return Err(MeasureError::Parse("broken".to_string()));
            }
            if !dir.is_dir() {
                return Ok(None);
            }
            Ok(Some(Measurement {
                root: dir.to_string_lossy().into_owned(),
                size: "4096".to_string(),
            }))
        }
    }

    fn config(mount: &Path, extra: &str) -> Config {
        let yaml = format!(
            "clusterName: nfs01\nmountDir: {}\noutputDir: /tmp\n{extra}\
             elasticSearch:\n  host: localhost\n  port: 9200\n  indexName: usage\n  batchSize: 2\n\
             jobs:\n  - day: Everyday\n    targets:\n\
             \x20     - {{ type: global, location: global, jobType: subDirs, skipDirs: [scratch] }}\n\
             \x20     - {{ type: personal, location: home/alice, jobType: singleDir }}\n",
            mount.display()
        );
        Config::from_yaml(&yaml).unwrap()
    }

    fn mount() -> TempDir {
        let dir = TempDir::new().unwrap();
        for sub in ["global/vol1", "global/vol2", "global/scratch", "home/alice"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        fs::write(dir.path().join("global/readme.txt"), "x").unwrap();
        dir
    }

    #[test]
    fn test_collect_subdirs() {
        let mount = mount();
        let config = config(mount.path(), "");
        let measurer = FixedMeasurer::default();
        let target = &config.jobs[0].targets[0];

        let (records, stats) = collect_records(&config, &measurer, target, Utc::now());

        let paths: Vec<&str> = records.iter().map(|r| r.base().full_path.as_str()).collect();
        assert_eq!(paths, vec!["/global/vol1", "/global/vol2"]);
        assert_eq!(stats.visited, 2);
        assert_eq!(stats.measured, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(records[0].base().cluster, "nfs01");
    }

    #[test]
    fn test_collect_single_dir() {
        let mount = mount();
        let config = config(mount.path(), "");
        let measurer = FixedMeasurer::default();
        let target = &config.jobs[0].targets[1];

        let (records, stats) = collect_records(&config, &measurer, target, Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(stats.visited, 1);
        let value = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(value["user_name"], "alice");
        assert_eq!(value["full_path"], "/home/alice");
    }

    #[test]
    fn test_missing_single_dir_is_skipped() {
        let mount = TempDir::new().unwrap();
        let config = config(mount.path(), "");
        let measurer = FixedMeasurer::default();
        let target = &config.jobs[0].targets[1];

        let (records, stats) = collect_records(&config, &measurer, target, Utc::now());
        assert!(records.is_empty());
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_measure_error_is_counted() {
        let mount = mount();
        let config = config(mount.path(), "");
        let measurer = FixedMeasurer {
            fail_on: Some("vol1".to_string()),
            ..FixedMeasurer::default()
        };
        let target = &config.jobs[0].targets[0];

        let (records, stats) = collect_records(&config, &measurer, target, Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(stats.measure_errors, 1);
    }

    #[tokio::test]
    async fn test_run_indexes_every_job() {
        let mount = mount();
        let store = MemoryStore::new();
        let runner = JobRunner::new(
            Arc::new(config(mount.path(), "")),
            FixedMeasurer::default(),
            store.clone(),
        );

        let summary = runner.run(Weekday::Tue).await.unwrap();
        assert_eq!(summary.jobs_run, 2);
        assert_eq!(summary.indexed, 3);
        assert!(summary.is_success());
        assert_eq!(store.documents("usage").len(), 3);
        assert_eq!(store.batch_sizes(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_skip_day() {
        let mount = mount();
        let store = MemoryStore::new();
        let runner = JobRunner::new(
            Arc::new(config(mount.path(), "skipDays: [Tuesday]\n")),
            FixedMeasurer::default(),
            store.clone(),
        );

        let summary = runner.run(Weekday::Tue).await.unwrap();
        assert!(summary.skipped_day);
        assert_eq!(summary.jobs_run, 0);
        assert!(store.requests().is_empty());
    }

    #[tokio::test]
    async fn test_abort_on_index_errors() {
        let mount = mount();
        let store = MemoryStore::new();
        store.push_reply(ScriptedReply::Transport("refused".to_string()));
        let runner = JobRunner::new(
            Arc::new(config(mount.path(), "")),
            FixedMeasurer::default(),
            store.clone(),
        );

        let err = runner.run(Weekday::Tue).await.unwrap_err();
        assert_eq!(err.severity(), Severity::Partial);
        // The second job never ran.
        assert_eq!(store.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_continue_on_index_errors() {
        let mount = mount();
        let store = MemoryStore::new();
        store.push_reply(ScriptedReply::Transport("refused".to_string()));
        let runner = JobRunner::new(
            Arc::new(config(mount.path(), "onIndexError: continue\n")),
            FixedMeasurer::default(),
            store.clone(),
        );

        let summary = runner.run(Weekday::Tue).await.unwrap();
        assert_eq!(summary.jobs_run, 2);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(summary.errored, 2);
        assert_eq!(summary.indexed, 1);
        assert!(summary.into_result().is_err());
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let mount = mount();
        let store = MemoryStore::new();
        let runner = JobRunner::new(
            Arc::new(config(mount.path(), "")),
            FixedMeasurer::default(),
            store.clone(),
        )
        .with_dry_run(true);

        let summary = runner.run(Weekday::Tue).await.unwrap();
        assert_eq!(summary.collected.measured, 3);
        assert!(store.requests().is_empty());
    }

    #[tokio::test]
    async fn test_creates_missing_index() {
        let mount = mount();
        let store = MemoryStore::new();
        let mut config = config(mount.path(), "");
        config.elasticsearch.create_index = true;
        config.jobs.clear();
        config.jobs.push(crate::config::DayConfig {
            day: "Everyday".to_string(),
            targets: vec![],
        });
        let runner = JobRunner::new(Arc::new(config), FixedMeasurer::default(), store.clone());

        // No targets means no jobs, so nothing is touched.
        runner.run(Weekday::Tue).await.unwrap();
        assert!(!store.index_exists("usage").await.unwrap());

        runner.prepare_index().await;
        assert!(store.index_exists("usage").await.unwrap());
    }
}
