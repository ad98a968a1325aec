//! Error types and Result aliases for nfscheck.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Recoverable conditions (a vanished directory, a rejected document, a
//! failed batch) are absorbed into counters by the component that sees them.
//! Only conditions that stop a run travel up as an [`Error`].

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using nfscheck's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nfscheck operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bulk indexing error.
    #[error("indexing error: {0}")]
    Index(#[from] IndexError),

    /// Index store transport error.
    #[error("index store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// How far an error should propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation ran to completion but lost some data.
    Partial,
    /// The operation could not continue.
    Fatal,
}

/// Directory walk errors.
///
/// These are yielded by the walker alongside regular entries; they describe
/// one branch and never end the walk, so they are counted by the job rather
/// than converted into [`Error`].
#[derive(Error, Debug)]
pub enum WalkError {
    /// The path at the target depth does not exist.
    #[error("path '{}' does not exist", path.display())]
    Missing { path: PathBuf },

    /// Failed to stat a path.
    #[error("failed to stat '{}': {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to list a directory below the target depth.
    #[error("failed to read directory '{}': {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Disk usage measurement errors.
///
/// Like [`WalkError`], these concern one directory and are counted by the job.
#[derive(Error, Debug)]
pub enum MeasureError {
    /// The directory exists but cannot be stat'ed.
    #[error("failed to stat '{}': {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to start the external command.
    #[error("failed to run '{command}': {reason}")]
    Spawn { command: String, reason: String },

    /// The external command exited unsuccessfully.
    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The command output could not be parsed.
    #[error("failed to parse duc output: {0}")]
    Parse(String),
}

/// Bulk indexing errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A record could not be serialized into the bulk payload.
    #[error("cannot encode document {position}: {source}")]
    Serialize {
        position: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The run finished but some documents were not indexed.
    #[error("indexed {indexed} documents with {errored} errors")]
    Incomplete { indexed: u64, errored: u64 },
}

/// Index store transport errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The HTTP client could not be built.
    #[error("failed to build client: {0}")]
    Setup(String),

    /// The request never produced a response.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The store answered with an error status.
    #[error("[{status}] {reason}")]
    Rejected { status: u16, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify the error for the caller's continue/stop decision.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Index(IndexError::Incomplete { .. }) => Severity::Partial,
            _ => Severity::Fatal,
        }
    }
}

impl StoreError {
    /// Create a transport error for a request URL.
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
