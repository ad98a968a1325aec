//! Bounded-depth directory walking.
//!
//! This module provides:
//! - Depth-first enumeration of the entries at exactly one depth below a root
//! - Prefix-based subtree exclusion, applied before descending
//! - Per-branch error reporting that never ends the walk
//!
//! Symbolic links are followed like any other directory. A link cycle within
//! the depth bound still terminates, but the same physical subtree may be
//! reported more than once.

mod depth;
mod exclude;

pub use depth::{path_depth, DepthWalker, DirEntry, Walk, WalkTarget};
pub use exclude::ExclusionSet;
