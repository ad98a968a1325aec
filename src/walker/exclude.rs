//! Subtree exclusion by relative path prefix.

use std::path::{Component, Path, PathBuf};

/// Relative path prefixes whose subtrees are never visited.
///
/// Matching is per path component: `projA/sec` excludes `projA/sec/x` but
/// not `projA/secret`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    prefixes: Vec<PathBuf>,
}

impl ExclusionSet {
    /// Create an exclusion set from relative paths.
    ///
    /// `.` components and trailing separators are dropped. Entries that are
    /// empty after that would exclude everything and are ignored.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut prefixes = Vec::new();
        for path in paths {
            let normalized = normalize(path.as_ref());
            if normalized.as_os_str().is_empty() {
                tracing::warn!(path = %path.as_ref().display(), "Ignoring empty exclusion");
                continue;
            }
            if !prefixes.contains(&normalized) {
                prefixes.push(normalized);
            }
        }
        Self { prefixes }
    }

    /// Check if a path relative to the walk root lies in an excluded subtree.
    #[must_use]
    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.prefixes.iter().any(|prefix| relative.starts_with(prefix))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl<P: AsRef<Path>> FromIterator<P> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::new(iter)
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir | Component::RootDir))
        .collect()
}
