//! Disk usage measurement for a single directory.
//!
//! The walker decides *which* directories to look at; a [`Measure`]
//! implementation turns one directory into a size. The production
//! implementation shells out to `duc`.

mod duc;

use std::path::Path;

pub use duc::{parse_duc_xml, DucMeasurer};

use crate::error::MeasureError;

/// Size of one directory tree as reported by the measuring tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    /// Canonical root path reported by the tool.
    pub root: String,
    /// Size in bytes, kept as the tool printed it.
    pub size: String,
}

/// Something that can measure a directory.
///
/// Implementations must be idempotent and only leave behind their own
/// snapshot files.
pub trait Measure: Send + Sync {
    /// Measure `dir`.
    ///
    /// Returns `Ok(None)` when there is nothing to measure (the directory is
    /// gone, or the tool produced no snapshot), so callers can tell "skip"
    /// from "failed".
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or its output cannot be read.
    fn measure(&self, dir: &Path) -> Result<Option<Measurement>, MeasureError>;
}
