//! Integration tests for the depth-bounded walker.

use std::fs;
use std::path::{Path, PathBuf};

use nfscheck::walker::{DepthWalker, ExclusionSet, WalkTarget};
use tempfile::TempDir;

/// Build a directory tree with `fanout` children per level, `levels` deep.
fn build_tree(root: &Path, fanout: usize, levels: usize) {
    fn fill(dir: &Path, fanout: usize, remaining: usize) {
        if remaining == 0 {
            return;
        }
        for i in 0..fanout {
            let child = dir.join(format!("d{i}"));
            fs::create_dir(&child).unwrap();
            fill(&child, fanout, remaining - 1);
        }
    }
    fill(root, fanout, levels);
}

fn walk(target: WalkTarget) -> Vec<PathBuf> {
    DepthWalker::new(target)
        .walk()
        .map(|entry| entry.unwrap().relative)
        .collect()
}

/// Entries exactly `depth` levels below `root`, the way walkdir sees them.
fn oracle(root: &Path, depth: usize) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    paths.sort();
    paths
}

#[test]
fn test_matches_walkdir_at_every_depth() {
    let tmp = TempDir::new().unwrap();
    build_tree(tmp.path(), 3, 4);

    for depth in 0..=4 {
        let mut found = walk(WalkTarget::new(tmp.path(), "", depth));
        found.sort();
        assert_eq!(found, oracle(tmp.path(), depth), "depth {depth}");
        assert_eq!(found.len(), 3_usize.pow(u32::try_from(depth).unwrap()));
    }
}

#[test]
fn test_yields_in_lexicographic_order() {
    let tmp = TempDir::new().unwrap();
    build_tree(tmp.path(), 3, 2);

    let found = walk(WalkTarget::new(tmp.path(), "", 2));
    let mut sorted = found.clone();
    sorted.sort();
    assert_eq!(found, sorted);
}

#[test]
fn test_nothing_reported_past_target_depth() {
    let tmp = TempDir::new().unwrap();
    build_tree(tmp.path(), 2, 5);

    for entry in DepthWalker::new(WalkTarget::new(tmp.path(), "d0", 3)).walk() {
        let entry = entry.unwrap();
        assert_eq!(entry.relative.components().count(), 3);
        assert!(entry.relative.starts_with("d0"));
        assert!(entry.is_dir);
    }
}

#[test]
fn test_project_layout_with_skip_dirs() {
    let tmp = TempDir::new().unwrap();
    for dir in [
        "project/a/team1/projX/vol1",
        "project/a/team1/projX/vol2",
        "project/a/team1/archive/old",
        "project/a/team2/projY/vol1",
        "project/b/team3/projZ/vol9",
    ] {
        fs::create_dir_all(tmp.path().join(dir)).unwrap();
    }

    let exclusions = ExclusionSet::new(["project/a/team1/archive", "project/b"]);
    let found = walk(WalkTarget::new(tmp.path(), "project", 5).with_exclusions(exclusions));

    assert_eq!(
        found,
        vec![
            PathBuf::from("project/a/team1/projX/vol1"),
            PathBuf::from("project/a/team1/projX/vol2"),
            PathBuf::from("project/a/team2/projY/vol1"),
        ]
    );
}

#[test]
fn test_exclusion_is_component_prefix() {
    let tmp = TempDir::new().unwrap();
    for dir in ["global/vol1", "global/vol10", "global/vol2"] {
        fs::create_dir_all(tmp.path().join(dir)).unwrap();
    }

    let found = walk(
        WalkTarget::new(tmp.path(), "global", 2)
            .with_exclusions(ExclusionSet::new(["global/vol1"])),
    );
    assert_eq!(
        found,
        vec![PathBuf::from("global/vol10"), PathBuf::from("global/vol2")]
    );
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_reported_and_siblings_continue() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    build_tree(tmp.path(), 2, 2);
    let locked = tmp.path().join("d0");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root ignores permission bits; nothing to observe then.
    let readable = fs::read_dir(&locked).is_ok();

    let results: Vec<_> = DepthWalker::new(WalkTarget::new(tmp.path(), "", 2))
        .walk()
        .collect();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    if readable {
        assert_eq!(results.len(), 4);
        return;
    }
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    let ok: Vec<PathBuf> = results
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.relative)
        .collect();
    assert_eq!(ok, vec![PathBuf::from("d1/d0"), PathBuf::from("d1/d1")]);
}

#[test]
fn test_excluding_an_entry_removes_only_that_subtree() {
    let tmp = TempDir::new().unwrap();
    build_tree(tmp.path(), 3, 3);
    let full = walk(WalkTarget::new(tmp.path(), "", 3));

    for excluded in ["d1", "d0/d2", "d2/d2/d0"] {
        let found = walk(
            WalkTarget::new(tmp.path(), "", 3).with_exclusions(ExclusionSet::new([excluded])),
        );
        let expected: Vec<PathBuf> = full
            .iter()
            .filter(|p| !p.starts_with(excluded))
            .cloned()
            .collect();
        assert_eq!(found, expected, "excluding {excluded}");
    }
}

#[test]
fn test_children_of_location_minus_secret() {
    let tmp = TempDir::new().unwrap();
    for dir in [
        "projA/projB/inner",
        "projA/public",
        "projA/secret/deep",
        "projA/shared",
    ] {
        fs::create_dir_all(tmp.path().join(dir)).unwrap();
    }

    let found = walk(
        WalkTarget::new(tmp.path(), "projA", 2).with_exclusions(ExclusionSet::new(["projA/secret"])),
    );
    assert_eq!(
        found,
        vec![
            PathBuf::from("projA/projB"),
            PathBuf::from("projA/public"),
            PathBuf::from("projA/shared"),
        ]
    );
}
