//! Depth-first walk that yields entries at exactly one target depth.
//!
//! Depth is counted in path segments below the walk root, so a relative root
//! of `project/teamA` starts at depth 2. Nothing deeper than the target depth
//! is ever listed or stat'ed.

use std::fs::{self, FileType};
use std::io;
use std::iter::FusedIterator;
use std::path::{Component, Path, PathBuf};

use super::ExclusionSet;
use crate::error::WalkError;

/// Number of normal segments in a relative path.
///
/// `""` and `"."` have depth 0; `"a/b"` has depth 2.
#[must_use]
pub fn path_depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// What to walk and how deep.
#[derive(Debug, Clone)]
pub struct WalkTarget {
    /// Absolute root that depths and exclusions are relative to.
    pub root: PathBuf,
    /// Where the walk starts, relative to `root`.
    pub relative_root: PathBuf,
    /// Depth below `root` at which entries are reported.
    pub target_depth: usize,
    pub exclusions: ExclusionSet,
}

impl WalkTarget {
    /// Create a walk target with no exclusions.
    pub fn new(
        root: impl Into<PathBuf>,
        relative_root: impl Into<PathBuf>,
        target_depth: usize,
    ) -> Self {
        Self {
            root: root.into(),
            relative_root: relative_root.into(),
            target_depth,
            exclusions: ExclusionSet::default(),
        }
    }

    /// Set the excluded subtrees, relative to `root`.
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: ExclusionSet) -> Self {
        self.exclusions = exclusions;
        self
    }
}

/// An entry found at the target depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// `root` joined with `relative`.
    pub path: PathBuf,
    /// Path relative to the walk root.
    pub relative: PathBuf,
    pub is_dir: bool,
}

/// Walker over a fixed [`WalkTarget`].
///
/// Each call to [`DepthWalker::walk`] starts a fresh pass from the root.
#[derive(Debug, Clone)]
pub struct DepthWalker {
    target: WalkTarget,
}

impl DepthWalker {
    #[must_use]
    pub const fn new(target: WalkTarget) -> Self {
        Self { target }
    }

    #[must_use]
    pub const fn target(&self) -> &WalkTarget {
        &self.target
    }

    /// Start a lazy walk.
    ///
    /// The iterator yields every entry at the target depth, files included,
    /// in file name order. Errors describe one branch; iteration continues
    /// with its siblings. Drop the iterator to stop early.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(&self.target)
    }
}

impl<'a> IntoIterator for &'a DepthWalker {
    type Item = Result<DirEntry, WalkError>;
    type IntoIter = Walk<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.walk()
    }
}

/// A path waiting to be visited.
#[derive(Debug)]
struct Pending {
    relative: PathBuf,
    depth: usize,
    /// File type from the parent listing; symlinks still need a stat.
    file_type: Option<FileType>,
}

/// Iterator returned by [`DepthWalker::walk`].
#[derive(Debug)]
pub struct Walk<'a> {
    target: &'a WalkTarget,
    stack: Vec<Pending>,
}

impl<'a> Walk<'a> {
    fn new(target: &'a WalkTarget) -> Self {
        let depth = path_depth(&target.relative_root);
        let mut stack = Vec::new();

        if depth > target.target_depth {
            tracing::debug!(
                root = %target.root.display(),
                relative_root = %target.relative_root.display(),
                depth,
                target_depth = target.target_depth,
                "Walk root is below the target depth"
            );
        } else {
            stack.push(Pending {
                relative: target.relative_root.clone(),
                depth,
                file_type: None,
            });
        }

        Self { target, stack }
    }

    fn visit(&mut self, pending: Pending) -> Option<Result<DirEntry, WalkError>> {
        let target = self.target;

        if target.exclusions.is_excluded(&pending.relative) {
            tracing::debug!(path = %pending.relative.display(), "Skipping excluded subtree");
            return None;
        }

        let path = target.root.join(&pending.relative);
        let at_target = pending.depth == target.target_depth;

        let is_dir = match pending.file_type {
            Some(file_type) if !file_type.is_symlink() => file_type.is_dir(),
            _ => match fs::metadata(&path) {
                Ok(meta) => meta.is_dir(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return at_target.then_some(Err(WalkError::Missing { path }));
                }
                Err(source) => return Some(Err(WalkError::Stat { path, source })),
            },
        };

        if at_target {
            return Some(Ok(DirEntry {
                path,
                relative: pending.relative,
                is_dir,
            }));
        }

        if !is_dir {
            return None;
        }

        match read_children(&path) {
            Ok(children) => {
                let depth = pending.depth + 1;
                self.stack
                    .extend(children.into_iter().rev().map(|(name, file_type)| Pending {
                        relative: pending.relative.join(name),
                        depth,
                        file_type,
                    }));
                None
            }
            Err(source) => Some(Err(WalkError::ReadDir { path, source })),
        }
    }
}

impl Iterator for Walk<'_> {
    type Item = Result<DirEntry, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(pending) = self.stack.pop() {
            if let Some(item) = self.visit(pending) {
                return Some(item);
            }
        }
        None
    }
}

impl FusedIterator for Walk<'_> {}

/// List a directory's children sorted by file name.
fn read_children(path: &Path) -> io::Result<Vec<(std::ffi::OsString, Option<FileType>)>> {
    let mut children = fs::read_dir(path)?
        .map(|entry| entry.map(|e| (e.file_name(), e.file_type().ok())))
        .collect::<io::Result<Vec<_>>>()?;
    children.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(children)
}
