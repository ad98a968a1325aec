//! Usage documents sent to the index store.
//!
//! Every document carries the same base fields; the volume type tag decides
//! which naming fields are derived from the measured path.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::VolumeType;

/// Fields shared by every usage document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageBase {
    pub timestamp: DateTime<Utc>,
    pub cluster: String,
    /// Measured path with the mount directory removed.
    pub full_path: String,
    pub disk_size: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalVolumeRecord {
    #[serde(flatten)]
    pub base: UsageBase,
    pub volume_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    #[serde(flatten)]
    pub base: UsageBase,
    pub volume_name: String,
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonalRecord {
    #[serde(flatten)]
    pub base: UsageBase,
    pub user_name: String,
}

/// One usage document, tagged by `volume_type` when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "volume_type", rename_all = "lowercase")]
pub enum UsageRecord {
    Global(GlobalVolumeRecord),
    Project(ProjectRecord),
    Personal(PersonalRecord),
}

impl UsageRecord {
    /// Shape a document for `volume_type` from a measured path and size.
    ///
    /// `full_path` is split on `/`: global volumes are named by the last
    /// segment, projects by the last two (`.../<project>/<volume>`), personal
    /// directories by the last (the user name). Returns `None` when the path
    /// has too few segments.
    #[must_use]
    pub fn build(
        volume_type: VolumeType,
        cluster: &str,
        full_path: &str,
        disk_size: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let mut segments = full_path.rsplit('/').filter(|s| !s.is_empty());
        let last = segments.next()?.to_string();

        let base = UsageBase {
            timestamp,
            cluster: cluster.to_string(),
            full_path: full_path.to_string(),
            disk_size: disk_size.to_string(),
        };

        let record = match volume_type {
            VolumeType::Global => Self::Global(GlobalVolumeRecord {
                base,
                volume_name: last,
            }),
            VolumeType::Project => Self::Project(ProjectRecord {
                base,
                volume_name: last,
                project_name: segments.next()?.to_string(),
            }),
            VolumeType::Personal => Self::Personal(PersonalRecord {
                base,
                user_name: last,
            }),
        };
        Some(record)
    }

    #[must_use]
    pub const fn base(&self) -> &UsageBase {
        match self {
            Self::Global(r) => &r.base,
            Self::Project(r) => &r.base,
            Self::Personal(r) => &r.base,
        }
    }

    #[must_use]
    pub const fn volume_type(&self) -> VolumeType {
        match self {
            Self::Global(_) => VolumeType::Global,
            Self::Project(_) => VolumeType::Project,
            Self::Personal(_) => VolumeType::Personal,
        }
    }
}

/// Remove the mount directory from a path reported by the measuring tool.
///
/// Paths outside the mount directory are returned unchanged.
#[must_use]
pub fn strip_mount(root: &str, mount_dir: &Path) -> String {
    let mount = mount_dir.to_string_lossy();
    let mount = mount.trim_end_matches('/');
    match root.strip_prefix(mount) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.to_string(),
        _ => root.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    #[test]
    fn test_global_record() {
        let record =
            UsageRecord::build(VolumeType::Global, "nfs01", "/global/vol1", "4096", ts()).unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "volume_type": "global",
                "timestamp": "2024-05-06T07:08:09Z",
                "cluster": "nfs01",
                "full_path": "/global/vol1",
                "disk_size": "4096",
                "volume_name": "vol1",
            })
        );
    }

    #[test]
    fn test_project_record() {
        let record = UsageRecord::build(
            VolumeType::Project,
            "nfs01",
            "/project/a/b/projX/volY",
            "10",
            ts(),
        )
        .unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["volume_type"], "project");
        assert_eq!(value["volume_name"], "volY");
        assert_eq!(value["project_name"], "projX");
        assert_eq!(record.volume_type(), VolumeType::Project);
    }

    #[test]
    fn test_personal_record() {
        let record =
            UsageRecord::build(VolumeType::Personal, "nfs01", "/home/alice/", "1", ts()).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["volume_type"], "personal");
        assert_eq!(value["user_name"], "alice");
        assert_eq!(record.base().full_path, "/home/alice/");
    }

    #[test]
    fn test_too_few_segments() {
        assert!(UsageRecord::build(VolumeType::Global, "c", "/", "1", ts()).is_none());
        assert!(UsageRecord::build(VolumeType::Project, "c", "/only", "1", ts()).is_none());
    }

    #[test]
    fn test_strip_mount() {
        let mount = Path::new("/mnt/nfs");
        assert_eq!(strip_mount("/mnt/nfs/global/vol1", mount), "/global/vol1");
        assert_eq!(strip_mount("/mnt/nfs", mount), "");
        assert_eq!(strip_mount("/mnt/nfs2/x", mount), "/mnt/nfs2/x");
        assert_eq!(
            strip_mount("/mnt/nfs/global", Path::new("/mnt/nfs/")),
            "/global"
        );
    }
}
